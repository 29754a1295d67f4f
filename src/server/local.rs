//! Local variable server over a Unix domain socket
//!
//! Readers connect to the socket and send one line naming a variable. What
//! happens next depends on the variable:
//!
//! - unknown name: the reply is `unknown variable <name>`
//! - subscribed for print: the connection is parked as a print session and a
//!   [`Notification`] is queued for the dispatch loop, which renders straight
//!   into the connection
//! - anything else: the stored value is written back
//!
//! A listener thread accepts connections and hands each one to a short-lived
//! thread that reads its request line, so a slow reader cannot hold up the
//! others. Print requests reach the loop through one bounded channel in the
//! order their request lines complete.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{Notification, NotifyKind, PrintSession, ServerError, Token, VarHandle, VarServer};
use crate::config::ServerConfig;
use crate::template::VarSource;

/// How long a connecting reader has to send its request line
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest request line read from a reader, in bytes
const MAX_REQUEST_LEN: u64 = 4096;

/// Variables known to the local server
#[derive(Debug, Default)]
pub struct VarStore {
    handles: BTreeMap<String, VarHandle>,
    /// Indexed by `handle.raw() - 1`
    values: Vec<(String, String)>,
}

impl VarStore {
    /// Build a store, assigning handles `1..=n` in name order
    pub fn new(variables: &BTreeMap<String, String>) -> Self {
        let mut store = Self::default();
        for (name, value) in variables {
            let handle = VarHandle::new(store.values.len() as u32 + 1);
            store.handles.insert(name.clone(), handle);
            store.values.push((name.clone(), value.clone()));
        }
        store
    }

    pub fn handle(&self, name: &str) -> VarHandle {
        self.handles.get(name).copied().unwrap_or(VarHandle::INVALID)
    }

    pub fn name(&self, handle: VarHandle) -> Option<&str> {
        self.entry(handle).map(|(name, _)| name.as_str())
    }

    pub fn value_of(&self, handle: VarHandle) -> Option<&str> {
        self.entry(handle).map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn entry(&self, handle: VarHandle) -> Option<&(String, String)> {
        let index = (handle.raw() as usize).checked_sub(1)?;
        self.values.get(index)
    }
}

impl VarSource for VarStore {
    fn value(&self, name: &str) -> Option<String> {
        self.value_of(self.handle(name)).map(str::to_string)
    }
}

struct PendingPrint {
    handle: VarHandle,
    stream: UnixStream,
}

/// State shared between the server handle and its listener thread
struct Shared {
    store: Arc<VarStore>,
    subscriptions: Mutex<HashSet<(VarHandle, NotifyKind)>>,
    pending: Mutex<HashMap<Token, PendingPrint>>,
    next_token: AtomicU64,
    stopped: AtomicBool,
    write_timeout: Duration,
}

impl Shared {
    fn is_subscribed(&self, handle: VarHandle, kind: NotifyKind) -> bool {
        self.subscriptions.lock().contains(&(handle, kind))
    }
}

/// Variable server listening on a Unix domain socket
pub struct LocalServer {
    shared: Arc<Shared>,
    socket: PathBuf,
    notifications: Receiver<Notification>,
    closed: bool,
}

impl LocalServer {
    /// Bind the configured socket and start accepting readers
    pub fn start(config: &ServerConfig) -> Result<Self, ServerError> {
        let store = Arc::new(VarStore::new(&config.variables));
        Self::start_with_store(config, store)
    }

    /// Bind the configured socket and serve the variables in `store`
    pub fn start_with_store(
        config: &ServerConfig,
        store: Arc<VarStore>,
    ) -> Result<Self, ServerError> {
        let socket = config.socket.as_path();
        remove_stale_socket(socket)?;
        let listener = UnixListener::bind(socket)?;

        let shared = Arc::new(Shared {
            store,
            subscriptions: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
            write_timeout: config.write_timeout(),
        });

        let (tx, rx) = bounded(config.queue_depth.max(1));
        let listener_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("filevars-listener".to_string())
            .spawn(move || listen(listener, listener_shared, tx))?;

        info!(socket = %socket.display(), variables = shared.store.len(), "variable server listening");

        Ok(Self {
            shared,
            socket: socket.to_path_buf(),
            notifications: rx,
            closed: false,
        })
    }

    /// The variables this server knows
    pub fn store(&self) -> Arc<VarStore> {
        Arc::clone(&self.shared.store)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }
}

impl VarServer for LocalServer {
    type Sink = UnixStream;

    fn resolve(&self, name: &str) -> VarHandle {
        self.shared.store.handle(name)
    }

    fn subscribe(&mut self, handle: VarHandle, kind: NotifyKind) -> Result<(), ServerError> {
        if self.closed {
            return Err(ServerError::Closed);
        }
        if !handle.is_valid() {
            return Err(ServerError::InvalidHandle);
        }
        self.shared.subscriptions.lock().insert((handle, kind));
        Ok(())
    }

    fn notifications(&self) -> Receiver<Notification> {
        self.notifications.clone()
    }

    fn begin_print(&mut self, token: Token) -> Result<PrintSession<UnixStream>, ServerError> {
        if self.closed {
            return Err(ServerError::Closed);
        }
        let PendingPrint { handle, stream } = self
            .shared
            .pending
            .lock()
            .remove(&token)
            .ok_or(ServerError::UnknownToken(token))?;
        Ok(PrintSession {
            handle,
            sink: stream,
        })
    }

    fn end_print(&mut self, _token: Token, mut sink: UnixStream) -> Result<(), ServerError> {
        sink.flush()?;
        match sink.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shared.stopped.store(true, Ordering::SeqCst);

        // wake the listener out of accept() so it sees the stop flag
        let _ = UnixStream::connect(&self.socket);

        self.shared.pending.lock().clear();
        if let Err(e) = fs::remove_file(&self.socket) {
            debug!(socket = %self.socket.display(), error = %e, "could not remove socket");
        }
        info!(socket = %self.socket.display(), "variable server closed");
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Remove a socket left behind by an earlier run. Anything else at the path
/// is left alone.
fn remove_stale_socket(socket: &Path) -> Result<(), ServerError> {
    match fs::symlink_metadata(socket) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!(socket = %socket.display(), "removing stale socket");
            fs::remove_file(socket)?;
            Ok(())
        }
        Ok(_) => Err(ServerError::NotASocket(socket.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn listen(listener: UnixListener, shared: Arc<Shared>, tx: Sender<Notification>) {
    for stream in listener.incoming() {
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };

        let shared = Arc::clone(&shared);
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("filevars-reader".to_string())
            .spawn(move || {
                if let Err(e) = serve_connection(&shared, &tx, stream) {
                    debug!(error = %e, "dropped reader connection");
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "could not start reader thread");
        }
    }
    debug!("listener stopped");
}

fn serve_connection(
    shared: &Shared,
    tx: &Sender<Notification>,
    mut stream: UnixStream,
) -> io::Result<()> {
    stream.set_read_timeout(Some(REQUEST_TIMEOUT))?;
    let name = read_request(&stream)?;
    let handle = shared.store.handle(&name);

    if !handle.is_valid() {
        writeln!(stream, "unknown variable {name}")?;
        return Ok(());
    }

    if shared.is_subscribed(handle, NotifyKind::Print) {
        if shared.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        // a reader that stops reading must not stall the dispatch loop
        stream.set_write_timeout(Some(shared.write_timeout))?;

        let token = Token::new(shared.next_token.fetch_add(1, Ordering::SeqCst));
        shared
            .pending
            .lock()
            .insert(token, PendingPrint { handle, stream });
        if tx.send(Notification::print(token)).is_err() {
            shared.pending.lock().remove(&token);
            return Ok(());
        }
        debug!(var = %name, %token, "queued print request");
        return Ok(());
    }

    let value = shared.store.value_of(handle).unwrap_or_default();
    writeln!(stream, "{value}")?;
    Ok(())
}

/// Read one request line, at most [`MAX_REQUEST_LEN`] bytes of it
fn read_request(stream: impl Read) -> io::Result<String> {
    let mut line = String::new();
    BufReader::new(stream.take(MAX_REQUEST_LEN)).read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Ask the server listening on `socket` for the value of `name`
pub fn query(socket: &Path, name: &str) -> io::Result<String> {
    let mut stream = UnixStream::connect(socket)?;
    writeln!(stream, "{name}")?;
    stream.shutdown(Shutdown::Write)?;
    let mut out = String::new();
    stream.read_to_string(&mut out)?;
    Ok(out)
}
