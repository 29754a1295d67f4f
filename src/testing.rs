//! Test doubles for the server and renderer collaborators
//!
//! [`FakeServer`] is an in-memory [`VarServer`] that records every call made
//! against it, and [`RecordingRenderer`] echoes its input while recording it.
//! Together they let registration and dispatch be exercised without a socket
//! or real templates.
//!
//! ```
//! use filevars::server::{VarHandle, VarServer};
//! use filevars::testing::FakeServer;
//!
//! let mut server = FakeServer::new().with_variable("/sys/test/info", 1);
//! assert_eq!(server.resolve("/sys/test/info"), VarHandle::new(1));
//!
//! let token = server.print_request(VarHandle::new(1));
//! let session = server.begin_print(token).unwrap();
//! server.end_print(token, session.sink).unwrap();
//! assert_eq!(server.released_tokens(), vec![token]);
//! ```

use std::collections::HashMap;
use std::io::{self, Read, Write};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::server::{
    Notification, NotifyKind, PrintSession, ServerError, Token, VarHandle, VarServer,
};
use crate::template::TemplateRenderer;

/// In-memory variable server
#[derive(Debug)]
pub struct FakeServer {
    names: HashMap<String, VarHandle>,
    subscriptions: Vec<(VarHandle, NotifyKind)>,
    /// Print requests that have been queued but not yet begun
    pending: HashMap<Token, VarHandle>,
    begun: Vec<Token>,
    released: Vec<(Token, Vec<u8>)>,
    tx: Option<Sender<Notification>>,
    rx: Receiver<Notification>,
    next_token: u64,
    close_count: usize,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            names: HashMap::new(),
            subscriptions: Vec::new(),
            pending: HashMap::new(),
            begun: Vec::new(),
            released: Vec::new(),
            tx: Some(tx),
            rx,
            next_token: 1,
            close_count: 0,
        }
    }

    /// Make `name` resolvable to the handle `raw`
    pub fn with_variable(mut self, name: impl Into<String>, raw: u32) -> Self {
        self.names.insert(name.into(), VarHandle::new(raw));
        self
    }

    /// Queue a print request for `handle`, as if a reader opened it
    pub fn print_request(&mut self, handle: VarHandle) -> Token {
        let token = self.next_token();
        self.pending.insert(token, handle);
        self.send(Notification::print(token));
        token
    }

    /// Queue a notification of another kind
    pub fn notify(&mut self, kind: NotifyKind) -> Token {
        let token = self.next_token();
        self.send(Notification { kind, token });
        token
    }

    /// Stop delivering notifications once the queue drains
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    pub fn subscriptions(&self) -> &[(VarHandle, NotifyKind)] {
        &self.subscriptions
    }

    /// Tokens whose print session was opened, in order
    pub fn begun(&self) -> &[Token] {
        &self.begun
    }

    /// Sinks handed back through `end_print`, with everything written to them
    pub fn released(&self) -> &[(Token, Vec<u8>)] {
        &self.released
    }

    pub fn released_tokens(&self) -> Vec<Token> {
        self.released.iter().map(|(token, _)| *token).collect()
    }

    /// Output written during the print session for `token`
    pub fn output(&self, token: Token) -> Option<&[u8]> {
        self.released
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, out)| out.as_slice())
    }

    pub fn close_count(&self) -> usize {
        self.close_count
    }

    fn next_token(&mut self) -> Token {
        let token = Token::new(self.next_token);
        self.next_token += 1;
        token
    }

    fn send(&self, notification: Notification) {
        if let Some(tx) = &self.tx {
            // the receiver lives in `self`, so this cannot disconnect
            let _ = tx.send(notification);
        }
    }
}

impl VarServer for FakeServer {
    type Sink = Vec<u8>;

    fn resolve(&self, name: &str) -> VarHandle {
        self.names.get(name).copied().unwrap_or(VarHandle::INVALID)
    }

    fn subscribe(&mut self, handle: VarHandle, kind: NotifyKind) -> Result<(), ServerError> {
        self.subscriptions.push((handle, kind));
        if handle.is_valid() {
            Ok(())
        } else {
            Err(ServerError::InvalidHandle)
        }
    }

    fn notifications(&self) -> Receiver<Notification> {
        self.rx.clone()
    }

    fn begin_print(&mut self, token: Token) -> Result<PrintSession<Vec<u8>>, ServerError> {
        let handle = self
            .pending
            .remove(&token)
            .ok_or(ServerError::UnknownToken(token))?;
        self.begun.push(token);
        Ok(PrintSession {
            handle,
            sink: Vec::new(),
        })
    }

    fn end_print(&mut self, token: Token, sink: Vec<u8>) -> Result<(), ServerError> {
        self.released.push((token, sink));
        Ok(())
    }

    fn close(&mut self) {
        self.close_count += 1;
        self.tx = None;
    }
}

/// Renderer that copies its input to the sink unchanged and records it
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inputs received so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl TemplateRenderer for RecordingRenderer {
    fn render(&self, input: &mut dyn Read, sink: &mut dyn Write) -> io::Result<()> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        sink.write_all(text.as_bytes())?;
        self.calls.lock().push(text);
        Ok(())
    }
}
