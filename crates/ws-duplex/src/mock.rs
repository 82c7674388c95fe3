//! Scriptable in-memory transport for handshake and bridge tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::message::{CloseFrame, Message};
use crate::transport::{Transport, TransportEvent};

/// Test transport driven by a script of events. Records every send and
/// close, and echoes a `Closed` event when closed, like a peer acking the
/// close handshake.
pub(crate) struct MockTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    echo: mpsc::UnboundedSender<TransportEvent>,
    sent: mpsc::UnboundedSender<Message>,
    closes: mpsc::UnboundedSender<(u16, String)>,
    send_error: Arc<Mutex<Option<TransportError>>>,
    aborted: Arc<AtomicBool>,
}

/// The test's side of a [`MockTransport`].
pub(crate) struct MockHandle {
    events: mpsc::UnboundedSender<TransportEvent>,
    pub(crate) sent: mpsc::UnboundedReceiver<Message>,
    pub(crate) closes: mpsc::UnboundedReceiver<(u16, String)>,
    send_error: Arc<Mutex<Option<TransportError>>>,
    aborted: Arc<AtomicBool>,
}

impl MockTransport {
    pub(crate) fn new() -> (Self, MockHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (closes_tx, closes_rx) = mpsc::unbounded_channel();
        let send_error = Arc::new(Mutex::new(None));
        let aborted = Arc::new(AtomicBool::new(false));
        let transport = Self {
            events: events_rx,
            echo: events_tx.clone(),
            sent: sent_tx,
            closes: closes_tx,
            send_error: send_error.clone(),
            aborted: aborted.clone(),
        };
        let handle = MockHandle {
            events: events_tx,
            sent: sent_rx,
            closes: closes_rx,
            send_error,
            aborted,
        };
        (transport, handle)
    }
}

impl MockHandle {
    /// Script the next transport event.
    pub(crate) fn push(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Script a successful handshake.
    pub(crate) fn open(&self, protocol: &str, extensions: &str) {
        self.push(TransportEvent::Open {
            protocol: protocol.to_string(),
            extensions: extensions.to_string(),
        });
    }

    /// Make every subsequent `send` fail with `error`.
    pub(crate) fn fail_sends(&self, error: TransportError) {
        *self.send_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn was_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    async fn next_event(&mut self) -> TransportEvent {
        self.events.recv().await.unwrap_or(TransportEvent::Closed {
            code: CloseFrame::ABNORMAL_CODE,
            reason: String::new(),
        })
    }

    async fn send(&mut self, msg: Message) -> Result<(), TransportError> {
        if let Some(error) = self.send_error.lock().unwrap().clone() {
            return Err(error);
        }
        let _ = self.sent.send(msg);
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let _ = self.closes.send((code, reason.to_string()));
        let _ = self.echo.send(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}
