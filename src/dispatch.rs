//! The event dispatch loop
//!
//! One thread, one suspension point: the loop blocks until the server
//! delivers a notification (or shutdown is requested), handles print requests
//! one at a time in delivery order, and always hands each sink back to the
//! server before waiting again.

use crossbeam_channel::{never, select, Receiver};
use tracing::{debug, info, trace, warn};

use crate::error::FileVarError;
use crate::print::PrintHandler;
use crate::server::{Notification, NotifyKind, PrintSession, VarServer};
use crate::template::TemplateRenderer;

/// Why the dispatch loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// A termination signal was received
    Shutdown,
    /// The server stopped delivering notifications
    Disconnected,
}

/// Outcome of handling a single notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Not a print request
    Ignored(NotifyKind),
    /// The server could not open the print session
    Unavailable,
    /// A print session ran; carries the render result
    Printed(Result<(), FileVarError>),
}

enum Wake {
    Notification(Notification),
    Shutdown,
    Disconnected,
}

/// Owns the server connection and serves print requests until stopped
pub struct Dispatcher<S, R> {
    server: S,
    printer: PrintHandler<R>,
    notifications: Receiver<Notification>,
    shutdown: Receiver<()>,
}

impl<S, R> Dispatcher<S, R>
where
    S: VarServer,
    R: TemplateRenderer,
{
    pub fn new(server: S, printer: PrintHandler<R>) -> Self {
        let notifications = server.notifications();
        Self {
            server,
            printer,
            notifications,
            shutdown: never(),
        }
    }

    /// Stop the loop when `shutdown` receives a message
    pub fn with_shutdown(mut self, shutdown: Receiver<()>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn printer(&self) -> &PrintHandler<R> {
        &self.printer
    }

    /// Serve notifications until shutdown or disconnection, then close the
    /// server connection.
    pub fn run(&mut self) -> Exit {
        info!(entries = self.printer.registry().len(), "waiting for print requests");

        let exit = loop {
            match self.wait() {
                Wake::Notification(notification) => {
                    self.dispatch(notification);
                }
                Wake::Shutdown => break Exit::Shutdown,
                Wake::Disconnected => break Exit::Disconnected,
            }
        };

        debug!(?exit, "closing variable server connection");
        self.server.close();
        exit
    }

    /// Handle one notification: open the print session, render, and release
    /// the sink regardless of the render result.
    pub fn dispatch(&mut self, notification: Notification) -> Dispatched {
        let Notification { kind, token } = notification;
        if kind != NotifyKind::Print {
            trace!(?kind, %token, "ignoring notification");
            return Dispatched::Ignored(kind);
        }

        let PrintSession { handle, mut sink } = match self.server.begin_print(token) {
            Ok(session) => session,
            Err(e) => {
                warn!(%token, error = %e, "could not open print session");
                return Dispatched::Unavailable;
            }
        };

        let result = self.printer.render(handle, &mut sink);
        match &result {
            Ok(()) => debug!(%handle, %token, "printed file variable"),
            Err(e) => debug!(%handle, %token, error = %e, "print request not served"),
        }

        if let Err(e) = self.server.end_print(token, sink) {
            warn!(%handle, %token, error = %e, "could not close print session");
        }

        Dispatched::Printed(result)
    }

    fn wait(&mut self) -> Wake {
        loop {
            // a pending shutdown wins over queued notifications
            if self.shutdown.try_recv().is_ok() {
                return Wake::Shutdown;
            }

            let woke = select! {
                recv(self.notifications) -> msg => Some(match msg {
                    Ok(notification) => Wake::Notification(notification),
                    Err(_) => Wake::Disconnected,
                }),
                recv(self.shutdown) -> msg => msg.ok().map(|()| Wake::Shutdown),
            };

            match woke {
                Some(wake) => return wake,
                // every trigger is gone; nothing can request shutdown now
                None => self.shutdown = never(),
            }
        }
    }
}
