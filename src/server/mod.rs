//! Variable server contract
//!
//! filevars never talks to a variable server directly. Everything goes through
//! the [`VarServer`] trait: resolving names to handles, subscribing to
//! notifications, and opening/closing print sessions. The bundled
//! [`local::LocalServer`] is one implementation; tests use
//! [`crate::testing::FakeServer`].

pub mod local;

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use crossbeam_channel::Receiver;
use thiserror::Error;

pub use local::{LocalServer, VarStore};

/// Opaque identifier issued by a variable server for a named variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarHandle(u32);

impl VarHandle {
    /// Sentinel returned when a name cannot be resolved
    pub const INVALID: VarHandle = VarHandle(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for VarHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("<invalid>")
        }
    }
}

/// Token identifying one delivered notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of notification a variable server can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKind {
    /// A reader wants the rendered value of a variable
    Print,
    /// A variable's value changed
    Modified,
    /// A variable's value should be recalculated
    Calc,
    /// A proposed value needs validation
    Validate,
}

/// A notification delivered by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotifyKind,
    pub token: Token,
}

impl Notification {
    pub fn print(token: Token) -> Self {
        Self {
            kind: NotifyKind::Print,
            token,
        }
    }
}

/// The open half of a print session: which variable is being read and where
/// the rendered output goes
#[derive(Debug)]
pub struct PrintSession<W> {
    pub handle: VarHandle,
    pub sink: W,
}

/// Errors reported by a variable server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The connection has been closed
    #[error("variable server connection is closed")]
    Closed,

    /// No print request is pending for this token
    #[error("no pending print request for token {0}")]
    UnknownToken(Token),

    /// Operation attempted on the invalid handle sentinel
    #[error("invalid variable handle")]
    InvalidHandle,

    /// Something other than a socket already exists at the socket path
    #[error("{} exists and is not a socket", .0.display())]
    NotASocket(PathBuf),

    /// Transport failure
    #[error("variable server i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Connection to a variable server
pub trait VarServer {
    /// Output channel handed out for each print session
    type Sink: Write;

    /// Resolve a variable name. Unknown names yield [`VarHandle::INVALID`].
    fn resolve(&self, name: &str) -> VarHandle;

    /// Ask to be notified of `kind` events for `handle`
    fn subscribe(&mut self, handle: VarHandle, kind: NotifyKind) -> Result<(), ServerError>;

    /// Receiving end of the notification stream.
    ///
    /// The channel disconnects once the server can deliver no more
    /// notifications.
    fn notifications(&self) -> Receiver<Notification>;

    /// Open the print session identified by `token`
    fn begin_print(&mut self, token: Token) -> Result<PrintSession<Self::Sink>, ServerError>;

    /// Hand the sink of a print session back to the server
    fn end_print(&mut self, token: Token, sink: Self::Sink) -> Result<(), ServerError>;

    /// Release the connection. Calling it more than once has no effect.
    fn close(&mut self);
}
