#![allow(dead_code)]

pub mod test_backend;
pub mod test_port;

use graylog_cache::{Endpoint, LogType};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn collector(log_type: LogType) -> Endpoint {
    Endpoint::new(log_type, "collector.example", 12201)
}
