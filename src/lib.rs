//! filevars - serve template files as variables
//!
//! Each configured variable is bound to a template file. When a reader asks
//! the variable server for one of those variables, the template is rendered
//! (with `${name}` references replaced by live values) straight into the
//! reader's channel.
//!
//! # Example
//!
//! ```rust
//! use filevars::config::FileVarDecl;
//! use filevars::server::VarHandle;
//! use filevars::testing::{FakeServer, RecordingRenderer};
//! use filevars::{serve_with, Exit};
//!
//! let mut server = FakeServer::new().with_variable("/sys/test/info", 1);
//! server.print_request(VarHandle::new(1));
//! server.hang_up();
//!
//! let decls = [FileVarDecl::new("/sys/test/info", "/tmp/t.tmpl")];
//! let (_trigger, shutdown) = filevars::shutdown::channel();
//! let exit = serve_with(server, &decls, RecordingRenderer::new(), shutdown);
//! assert_eq!(exit, Exit::Disconnected);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod print;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod template;
pub mod testing;

pub use config::{FileVarDecl, FileVarsConfig, ServerConfig};
pub use dispatch::{Dispatched, Dispatcher, Exit};
pub use error::{ConfigError, FileVarError};
pub use print::PrintHandler;
pub use registry::{FileVarEntry, FileVarRegistry};
pub use server::{LocalServer, ServerError, VarHandle, VarServer};
pub use template::{SubstitutionRenderer, TemplateRenderer};

use crossbeam_channel::Receiver;

/// Run filevars against the bundled local variable server.
///
/// Starts the server, registers every configured file variable and serves
/// print requests until `shutdown` fires or the server stops.
pub fn serve(config: &FileVarsConfig, shutdown: Receiver<()>) -> Result<Exit, ServerError> {
    let server = LocalServer::start(&config.server)?;
    let renderer = SubstitutionRenderer::new(server.store());
    Ok(serve_with(server, &config.config, renderer, shutdown))
}

/// Run filevars against any variable server and renderer
pub fn serve_with<S, R>(
    mut server: S,
    decls: &[FileVarDecl],
    renderer: R,
    shutdown: Receiver<()>,
) -> Exit
where
    S: VarServer,
    R: TemplateRenderer,
{
    let registry = FileVarRegistry::from_decls(&mut server, decls);
    let printer = PrintHandler::new(registry, renderer);
    Dispatcher::new(server, printer)
        .with_shutdown(shutdown)
        .run()
}
