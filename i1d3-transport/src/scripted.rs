//! In-memory transport
//!
//! Answers from a queue of canned frames, or from a closure that plays the
//! instrument. Everything written is recorded. Faults (failed writes, short
//! transfers, read errors) can be injected to exercise recovery paths.
//! The [`ScriptHandle`] stays with the test after the transport itself has
//! been moved into a device.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crate::{error::*, PortKind, Transport};

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct ScriptState {
    queue: VecDeque<Result<Bytes>>,
    written: Vec<Bytes>,
    failing_writes: usize,
    short_write: Option<usize>,
    responder: Option<Responder>,
}

/// Scripted transport for tests and demos
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
    kind: PortKind,
}

/// Shared view of a [`ScriptedTransport`]
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    /// Create a HID-flavoured transport with an empty script
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState::default())),
            kind: PortKind::Hid,
        }
    }

    /// Report a different port kind
    pub fn with_port_kind(mut self, kind: PortKind) -> Self {
        self.kind = kind;
        self
    }

    /// Answer every write by calling `responder` with the request bytes
    ///
    /// Returning `None` queues nothing, so the following read times out.
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
        self
    }

    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptHandle {
    /// Queue a frame for the next read
    pub fn push_frame(&self, frame: impl Into<Bytes>) {
        self.state.lock().queue.push_back(Ok(frame.into()));
    }

    /// Queue a read error
    pub fn push_error(&self, error: Error) {
        self.state.lock().queue.push_back(Err(error));
    }

    /// Make the next `count` writes fail
    pub fn fail_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    /// Make the next write accept only `len` bytes
    pub fn short_write(&self, len: usize) {
        self.state.lock().short_write = Some(len);
    }

    /// Every request written so far
    pub fn written(&self) -> Vec<Bytes> {
        self.state.lock().written.clone()
    }

    /// Frames still waiting to be read
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.state.lock();

        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(Error::Device("scripted write failure".into()));
        }

        let accepted = state.short_write.take().unwrap_or(data.len()).min(data.len());
        state.written.push(Bytes::copy_from_slice(data));
        trace!("Scripted write of {} bytes: {:02X?}", data.len(), &data[..data.len().min(8)]);

        if let Some(responder) = state.responder.as_mut() {
            if let Some(reply) = responder(data) {
                state.queue.push_back(Ok(Bytes::from(reply)));
            }
        }

        Ok(accepted)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let next = self.state.lock().queue.pop_front();

        match next {
            Some(Ok(frame)) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(frame.len())
            }
            Some(Err(e)) => Err(e),
            None => Err(Error::Timeout(timeout)),
        }
    }

    fn port_kind(&self) -> PortKind {
        self.kind
    }

    fn description(&self) -> String {
        format!("scripted {} transport", self.kind)
    }
}
