//! Shared send-then-listen loop for the multicast discovery protocols

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::trace;

use crate::cancel::CancelSignal;
use crate::error::ProbeError;

/// Silence that ends a listening window
pub const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(3);

/// Largest reply we read
const MAX_REPLY: usize = 4096;

/// Vendor tokens searched in reply payloads, in priority order
const VENDOR_TOKENS: &[(&str, &str)] = &[
    ("hikvision", "Hikvision"),
    ("dahua", "Dahua"),
    ("axis", "Axis"),
];

/// One multicast probe and the socket its unicast replies arrive on
pub struct MulticastProbe {
    socket: UdpSocket,
    listen_timeout: Duration,
    cancel: CancelSignal,
    buf: Vec<u8>,
}

impl MulticastProbe {
    /// Bind an ephemeral socket and send `payload` to `group`
    pub async fn send(
        payload: &[u8],
        group: SocketAddr,
        listen_timeout: Duration,
        cancel: CancelSignal,
    ) -> Result<Self, ProbeError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(ProbeError::Socket)?;
        socket
            .send_to(payload, group)
            .await
            .map_err(ProbeError::MulticastSend)?;

        trace!(group = %group, bytes = payload.len(), "Sent multicast probe");

        Ok(Self {
            socket,
            listen_timeout,
            cancel,
            buf: vec![0u8; MAX_REPLY],
        })
    }

    /// Wait for the next reply.
    ///
    /// The timeout restarts on every call, so listening stops after
    /// `listen_timeout` of silence rather than at a fixed deadline.
    pub async fn next_reply(&mut self) -> Result<(SocketAddr, Vec<u8>), ProbeError> {
        let Self {
            socket,
            listen_timeout,
            cancel,
            buf,
        } = self;
        let wait = *listen_timeout;

        let receive = async move {
            match timeout(wait, socket.recv_from(&mut buf[..])).await {
                Ok(Ok((len, from))) => Ok((from, buf[..len].to_vec())),
                Ok(Err(e)) => Err(ProbeError::Socket(e)),
                Err(_) => Err(ProbeError::NoReply(wait)),
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(ProbeError::Cancelled),
            received = receive => received,
        }
    }
}

/// Guess the vendor from a case-insensitive token search
pub fn infer_manufacturer(payload: &str) -> Option<&'static str> {
    let lower = payload.to_lowercase();
    VENDOR_TOKENS
        .iter()
        .find(|(token, _)| lower.contains(token))
        .map(|(_, vendor)| *vendor)
}
