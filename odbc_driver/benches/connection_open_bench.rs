use criterion::{black_box, criterion_group, criterion_main, Criterion};
use odbc_driver::observability::redact_connection_string;
use odbc_driver::test_helpers::ScriptedApi;
use odbc_driver::{is_ms_access_connection_string, Driver, DriverConfig};
use std::sync::Arc;

const ACCESS_CONN_STR: &str = "Driver={Microsoft Access Driver (*.mdb, *.accdb)};DBQ=C:\\data\\orders.accdb;";
const SQLSERVER_CONN_STR: &str =
    "Driver={ODBC Driver 18 for SQL Server};Server=db.internal,1433;Database=orders;UID=app;PWD=secret;";

fn benchmark_dialect_detection(c: &mut Criterion) {
    c.bench_function("dialect_detection_access", |b| {
        b.iter(|| black_box(is_ms_access_connection_string(black_box(ACCESS_CONN_STR))));
    });
    c.bench_function("dialect_detection_other", |b| {
        b.iter(|| black_box(is_ms_access_connection_string(black_box(SQLSERVER_CONN_STR))));
    });
}

fn benchmark_redaction(c: &mut Criterion) {
    c.bench_function("redact_connection_string", |b| {
        b.iter(|| black_box(redact_connection_string(black_box(SQLSERVER_CONN_STR))));
    });
}

fn benchmark_open_disconnect(c: &mut Criterion) {
    let driver = Driver::with_api(Arc::new(ScriptedApi::new()), DriverConfig::default());
    driver.initialize().expect("init");
    c.bench_function("open_disconnect_scripted", |b| {
        b.iter(|| {
            let conn = driver
                .open(black_box(SQLSERVER_CONN_STR), None)
                .expect("open");
            conn.disconnect().expect("disconnect");
        });
    });
}

criterion_group!(
    benches,
    benchmark_dialect_detection,
    benchmark_redaction,
    benchmark_open_disconnect
);
criterion_main!(benches);
