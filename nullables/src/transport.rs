//! Nullable command transport — scripted daemon responses for testing.

use oxpool_client::{ClientError, CommandTransport, LineStream};
use std::cell::RefCell;
use std::collections::HashMap;

/// A transport that answers commands from a programmed script and records
/// every command it is sent.
///
/// Unknown commands yield an empty line sequence, mirroring a daemon that
/// closes the channel without output.
pub struct NullTransport {
    responses: RefCell<HashMap<String, Vec<String>>>,
    sent: RefCell<Vec<String>>,
}

impl NullTransport {
    pub fn new() -> Self {
        Self {
            responses: RefCell::new(HashMap::new()),
            sent: RefCell::new(Vec::new()),
        }
    }

    /// Program the response lines for one command.
    pub fn respond(&self, command: &str, lines: &[&str]) {
        self.responses.borrow_mut().insert(
            command.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    /// Program the response as one text blob split on newlines.
    pub fn respond_text(&self, command: &str, text: &str) {
        self.responses.borrow_mut().insert(
            command.to_string(),
            text.lines().map(str::to_string).collect(),
        );
    }

    /// Program the node state so `is_ready` reports ready.
    pub fn node_ready(&self) {
        self.respond("state", &["Synchronized with the main network. Normal operation."]);
    }

    /// Program the node state so `is_ready` reports not ready.
    pub fn node_not_ready(&self) {
        self.respond("state", &["Loading blocks from the local storage."]);
    }

    /// Commands sent so far, in order.
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTransport for NullTransport {
    fn send(&self, command: &str) -> Result<LineStream, ClientError> {
        self.sent.borrow_mut().push(command.to_string());
        let lines = self
            .responses
            .borrow()
            .get(command)
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(lines.into_iter().map(Ok)))
    }
}
