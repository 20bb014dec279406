mod client;
mod devices;

use chrono::{DateTime, Duration, TimeZone, Utc};

pub use client::TestClient;
pub use devices::TestDevices;
pub use pomolog_engine::ManualClock;

pub const ALICE: &str = "alice@example.com";

/// Start of every test clock.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    epoch() + Duration::seconds(seconds)
}

/// Routes `tracing` output to the test writer, filtered by `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
