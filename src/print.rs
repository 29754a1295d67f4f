//! Print session handling: render a file variable into a reader's sink

use std::fs::File;
use std::io::Write;

use tracing::debug;

use crate::error::FileVarError;
use crate::registry::FileVarRegistry;
use crate::server::VarHandle;
use crate::template::TemplateRenderer;

/// Renders the template bound to a variable handle
#[derive(Debug)]
pub struct PrintHandler<R> {
    registry: FileVarRegistry,
    renderer: R,
}

impl<R: TemplateRenderer> PrintHandler<R> {
    pub fn new(registry: FileVarRegistry, renderer: R) -> Self {
        Self { registry, renderer }
    }

    pub fn registry(&self) -> &FileVarRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Render the template file registered for `handle` into `sink`.
    ///
    /// A template file that cannot be opened renders nothing and still
    /// reports success. The renderer's own result is not inspected.
    pub fn render(&self, handle: VarHandle, sink: &mut dyn Write) -> Result<(), FileVarError> {
        if !handle.is_valid() {
            return Err(FileVarError::invalid("invalid variable handle"));
        }

        let entry = self
            .registry
            .lookup(handle)
            .ok_or_else(|| FileVarError::not_found(handle))?;

        let mut input = match File::open(&entry.path) {
            Ok(file) => file,
            Err(e) => {
                debug!(%handle, path = %entry.path.display(), error = %e, "template file not readable");
                return Ok(());
            }
        };

        if let Err(e) = self.renderer.render(&mut input, sink) {
            debug!(%handle, path = %entry.path.display(), error = %e, "template render failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRenderer;

    fn handler_with(entries: &[(u32, &str)]) -> PrintHandler<RecordingRenderer> {
        let mut registry = FileVarRegistry::new();
        for (raw, path) in entries {
            registry.insert(VarHandle::new(*raw), path);
        }
        PrintHandler::new(registry, RecordingRenderer::new())
    }

    #[test]
    fn test_render_registered_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.tmpl");
        std::fs::write(&path, "hello").expect("write");

        let handler = handler_with(&[(1, path.to_str().expect("utf-8 path"))]);
        let mut sink = Vec::new();
        handler
            .render(VarHandle::new(1), &mut sink)
            .expect("Should render");

        assert_eq!(handler.renderer().calls(), vec!["hello".to_string()]);
        assert_eq!(sink, b"hello");
    }

    #[test]
    fn test_render_invalid_handle() {
        let handler = handler_with(&[(1, "/tmp/unused.tmpl")]);
        let mut sink = Vec::new();
        let result = handler.render(VarHandle::INVALID, &mut sink);

        assert!(matches!(result, Err(FileVarError::InvalidArguments { .. })));
        assert!(handler.renderer().calls().is_empty());
    }

    #[test]
    fn test_render_unknown_handle() {
        let handler = handler_with(&[(1, "/tmp/unused.tmpl")]);
        let mut sink = Vec::new();
        let result = handler.render(VarHandle::new(2), &mut sink);

        assert_eq!(result, Err(FileVarError::not_found(VarHandle::new(2))));
        assert!(handler.renderer().calls().is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_render_missing_file_succeeds_silently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.tmpl");

        let handler = handler_with(&[(1, path.to_str().expect("utf-8 path"))]);
        let mut sink = Vec::new();
        let result = handler.render(VarHandle::new(1), &mut sink);

        assert_eq!(result, Ok(()));
        assert!(handler.renderer().calls().is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_render_uses_latest_registration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old = dir.path().join("old.tmpl");
        let new = dir.path().join("new.tmpl");
        std::fs::write(&old, "old").expect("write");
        std::fs::write(&new, "new").expect("write");

        let handler = handler_with(&[
            (1, old.to_str().expect("utf-8 path")),
            (1, new.to_str().expect("utf-8 path")),
        ]);
        let mut sink = Vec::new();
        handler
            .render(VarHandle::new(1), &mut sink)
            .expect("Should render");

        assert_eq!(sink, b"new");
    }
}
