use std::{fs::OpenOptions, io, sync::Mutex};

use tracing_subscriber::EnvFilter;

/// stdout belongs to the CNI result, so logs go to a file.
const LOG_FILE_NAME: &str = "/var/log/bridge-cni.log";

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);

    match OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE_NAME)
    {
        Ok(file) => subscriber.with_writer(Mutex::new(file)).init(),
        Err(_) => subscriber.with_writer(io::stderr).init(),
    }
}
