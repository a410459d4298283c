//! Reasons a probe came back empty
//!
//! None of these reach the caller of a scan. They are logged and then
//! collapsed to "this source found nothing".

use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("port {0} is not in the port table")]
    UnmappedPort(u16),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("connection refused")]
    ConnectRefused,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unreachable: {0}")]
    Unreachable(#[source] io::Error),
    #[error("socket error: {0}")]
    Socket(#[source] io::Error),
    #[error("multicast send failed: {0}")]
    MulticastSend(#[source] io::Error),
    #[error("no reply within {0:?}")]
    NoReply(Duration),
    #[error("scan cancelled")]
    Cancelled,
}

impl ProbeError {
    /// Classify a failed TCP connect
    pub fn from_connect(err: io::Error, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::ConnectRefused,
            io::ErrorKind::TimedOut => Self::Timeout(timeout),
            _ => Self::Unreachable(err),
        }
    }
}
