pub mod e2e;
pub mod env;

#[allow(unused_imports)]
pub use e2e::{can_connect, is_access_dsn, should_run_e2e_tests};
#[allow(unused_imports)]
pub use env::{build_access_conn_str, get_access_test_file, get_test_dsn};
