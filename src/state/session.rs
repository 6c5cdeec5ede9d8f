#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Handshake sent, command frame not read yet
    AwaitingCommand,
    /// A command was identified and its sub-protocol is running
    Serving,
    /// Terminal state, always reached (success, violation or I/O error)
    Closed,
}

/// Ephemeral per-connection state. A session drives exactly one command to
/// completion on one connection; there is no pipelining and no retry.
#[derive(Debug)]
pub struct Session {
    // When is the session started/created
    pub session_started: std::time::Instant,

    /// Client identity (source IP, port ignored)
    identity: String,
    /// Current connection state
    state: ConnState,
    /// Negotiated file size for a transfer in progress
    transfer_size: Option<u64>,
}

impl Session {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            session_started: std::time::Instant::now(),
            identity: identity.into(),
            state: ConnState::AwaitingCommand,
            transfer_size: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn begin_serving(&mut self) {
        self.state = ConnState::Serving;
    }

    pub fn close(&mut self) {
        self.state = ConnState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Closed
    }

    pub fn set_transfer_size(&mut self, size: u64) {
        self.transfer_size = Some(size);
    }

    pub fn transfer_size(&self) -> Option<u64> {
        self.transfer_size
    }
}
