//! Command channel
//!
//! Frames requests, exchanges them with the instrument one at a time and
//! classifies the outcome. The transport mutex is the session's exchange
//! lock: whoever holds it owns the wire until the response is read.

use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use i1d3_core::constants::timeouts;
use i1d3_core::{Packet, Response, Session, FRAME_SIZE};
use i1d3_transport::Transport;

use crate::error::{Error, Result};

/// Serialized request/response exchange over a [`Transport`]
pub struct CommandChannel {
    transport: Mutex<Box<dyn Transport>>,
    session: Session,
}

impl CommandChannel {
    pub fn new(transport: Box<dyn Transport>, session: Session) -> Self {
        Self {
            transport: Mutex::new(transport),
            session,
        }
    }

    /// Transport description for logs
    pub fn description(&self) -> String {
        self.transport.lock().description()
    }

    /// Send `packet` and wait up to `timeout` for its validated response
    ///
    /// A failed write is retried once after discarding whatever the device
    /// may still have queued; a second failure is a [`Error::CommsFailure`].
    /// Transfers of any length other than 64 bytes are
    /// [`i1d3_core::Error::BadLength`]. After a response fails validation
    /// a pending response is flushed so the next exchange starts clean.
    pub fn exchange(&self, packet: &Packet, timeout: Duration) -> Result<Response> {
        let command = packet.command;
        let request = packet.encode();
        let quiet = self.session.is_quiet();

        let mut transport = self.transport.lock();

        if !quiet {
            trace!(%command, request = %hex::encode(&request), "sending");
        }

        let written = match transport.write(&request, timeout) {
            Ok(n) => n,
            Err(first) => {
                warn!(%command, error = %first, "write failed, resynchronizing");
                flush(&mut **transport);
                transport
                    .write(&request, timeout)
                    .map_err(|source| Error::CommsFailure { command, source })?
            }
        };

        if written != FRAME_SIZE {
            flush(&mut **transport);
            return Err(i1d3_core::Error::BadLength {
                expected: FRAME_SIZE,
                actual: written,
            }
            .into());
        }

        let mut buf = BytesMut::zeroed(FRAME_SIZE);
        let read = transport.read(&mut buf, timeout)?;
        if read != FRAME_SIZE {
            flush(&mut **transport);
            return Err(i1d3_core::Error::BadLength {
                expected: FRAME_SIZE,
                actual: read,
            }
            .into());
        }

        if !quiet {
            trace!(%command, response = %hex::encode(&buf), "received");
        }

        match Response::decode(command, buf) {
            Ok(response) => Ok(response),
            Err(e) => {
                debug!(%command, error = %e, "response rejected");
                flush(&mut **transport);
                Err(e.into())
            }
        }
    }
}

/// Read and discard one pending frame, if any
fn flush(transport: &mut dyn Transport) {
    let mut scratch = [0u8; FRAME_SIZE];
    match transport.read(&mut scratch, Duration::from_secs_f64(timeouts::FLUSH)) {
        Ok(n) => debug!(bytes = n, "discarded stale response"),
        Err(_) => trace!("nothing to flush"),
    }
}
