//! Registry mapping variable handles to template files
//!
//! Handles are not required to be unique: the same variable may be listed
//! more than once in the configuration. Lookup always returns the most
//! recently registered entry for a handle, shadowing earlier ones.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::FileVarDecl;
use crate::error::FileVarError;
use crate::server::{NotifyKind, VarHandle, VarServer};

/// A variable bound to a template file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVarEntry {
    /// Handle issued by the server; may be [`VarHandle::INVALID`]
    pub handle: VarHandle,
    /// Template file rendered when the variable is printed
    pub path: PathBuf,
}

/// Registry of file variables, built once at startup
#[derive(Debug, Default)]
pub struct FileVarRegistry {
    /// Entries in registration order
    entries: Vec<FileVarEntry>,
    /// Latest entry position for each valid handle
    index: HashMap<VarHandle, usize>,
}

impl FileVarRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration entries, in document order.
    ///
    /// Entries that fail to register are logged and skipped.
    pub fn from_decls<S>(server: &mut S, decls: &[FileVarDecl]) -> Self
    where
        S: VarServer + ?Sized,
    {
        decls.iter().fold(Self::new(), |mut registry, decl| {
            let name = decl.var.as_deref().unwrap_or_default();
            let file = decl.file.as_deref().unwrap_or_default();
            if let Err(e) = registry.register(server, name, file) {
                warn!(var = name, file, error = %e, "skipping file variable");
            }
            registry
        })
    }

    /// Resolve `name`, subscribe it for print notifications and bind it to
    /// `path`.
    ///
    /// A name the server does not know is still registered, carrying
    /// [`VarHandle::INVALID`].
    pub fn register<S>(
        &mut self,
        server: &mut S,
        name: &str,
        path: &str,
    ) -> Result<&FileVarEntry, FileVarError>
    where
        S: VarServer + ?Sized,
    {
        if name.is_empty() {
            return Err(FileVarError::invalid("missing variable name"));
        }
        if path.is_empty() {
            return Err(FileVarError::invalid("missing template file"));
        }

        self.entries
            .try_reserve(1)
            .map_err(|_| FileVarError::ResourceExhausted)?;

        let handle = server.resolve(name);
        if !handle.is_valid() {
            warn!(var = name, "variable not found on server");
        }

        if let Err(e) = server.subscribe(handle, NotifyKind::Print) {
            warn!(var = name, %handle, error = %e, "print subscription failed");
        }

        debug!(var = name, %handle, file = path, "registered file variable");
        Ok(self.insert(handle, path))
    }

    /// Add an entry for an already resolved handle
    pub fn insert(&mut self, handle: VarHandle, path: impl AsRef<Path>) -> &FileVarEntry {
        let position = self.entries.len();
        self.entries.push(FileVarEntry {
            handle,
            path: path.as_ref().to_path_buf(),
        });
        if handle.is_valid() {
            self.index.insert(handle, position);
        }
        &self.entries[position]
    }

    /// Find the most recently registered entry for `handle`
    pub fn lookup(&self, handle: VarHandle) -> Option<&FileVarEntry> {
        if !handle.is_valid() {
            return None;
        }
        self.index.get(&handle).map(|&i| &self.entries[i])
    }

    /// Iterate entries, most recently registered first
    pub fn iter(&self) -> impl Iterator<Item = &FileVarEntry> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeServer;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_register_and_lookup() {
        let mut server = FakeServer::new().with_variable("/sys/test/info", 1);
        let mut registry = FileVarRegistry::new();

        let entry = registry
            .register(&mut server, "/sys/test/info", "/tmp/t.tmpl")
            .expect("Should register");
        assert_eq!(entry.handle, VarHandle::new(1));

        let found = registry.lookup(VarHandle::new(1)).expect("Should find");
        assert_eq!(found.path, PathBuf::from("/tmp/t.tmpl"));
        assert_eq!(
            server.subscriptions(),
            &[(VarHandle::new(1), NotifyKind::Print)]
        );
    }

    #[test]
    fn test_last_registration_wins() {
        let mut server = FakeServer::new().with_variable("/sys/a", 1);
        let mut registry = FileVarRegistry::new();

        registry
            .register(&mut server, "/sys/a", "first.tmpl")
            .expect("Should register");
        registry
            .register(&mut server, "/sys/a", "second.tmpl")
            .expect("Should register");

        assert_eq!(registry.len(), 2);
        let found = registry.lookup(VarHandle::new(1)).expect("Should find");
        assert_eq!(found.path, PathBuf::from("second.tmpl"));
    }

    #[test]
    fn test_distinct_handles_round_trip() {
        let mut server = FakeServer::new()
            .with_variable("/sys/a", 1)
            .with_variable("/sys/b", 2)
            .with_variable("/sys/c", 3);
        let mut registry = FileVarRegistry::new();

        for (name, file) in [("/sys/c", "c.tmpl"), ("/sys/a", "a.tmpl"), ("/sys/b", "b.tmpl")] {
            registry
                .register(&mut server, name, file)
                .expect("Should register");
        }

        for (raw, file) in [(1, "a.tmpl"), (2, "b.tmpl"), (3, "c.tmpl")] {
            let found = registry.lookup(VarHandle::new(raw)).expect("Should find");
            assert_eq!(found.path, PathBuf::from(file));
        }
    }

    #[test]
    fn test_unknown_handle_not_found() {
        let mut server = FakeServer::new().with_variable("/sys/a", 1);
        let mut registry = FileVarRegistry::new();
        assert!(registry.lookup(VarHandle::new(1)).is_none());

        registry
            .register(&mut server, "/sys/a", "a.tmpl")
            .expect("Should register");
        assert!(registry.lookup(VarHandle::new(2)).is_none());
    }

    #[test]
    fn test_unresolved_name_still_registered() {
        let mut server = FakeServer::new();
        let mut registry = FileVarRegistry::new();

        let entry = registry
            .register(&mut server, "/sys/missing", "m.tmpl")
            .expect("Should register");
        assert_eq!(entry.handle, VarHandle::INVALID);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            server.subscriptions(),
            &[(VarHandle::INVALID, NotifyKind::Print)]
        );

        // the invalid sentinel never matches, even though an entry carries it
        assert!(registry.lookup(VarHandle::INVALID).is_none());
    }

    #[test]
    fn test_missing_arguments_rejected() {
        let mut server = FakeServer::new().with_variable("/sys/a", 1);
        let mut registry = FileVarRegistry::new();

        let result = registry.register(&mut server, "", "a.tmpl");
        assert!(matches!(result, Err(FileVarError::InvalidArguments { .. })));
        let result = registry.register(&mut server, "/sys/a", "");
        assert!(matches!(result, Err(FileVarError::InvalidArguments { .. })));

        assert!(registry.is_empty());
        assert!(server.subscriptions().is_empty());
    }

    #[test]
    fn test_iter_most_recent_first() {
        let mut registry = FileVarRegistry::new();
        registry.insert(VarHandle::new(1), "one.tmpl");
        registry.insert(VarHandle::new(2), "two.tmpl");
        registry.insert(VarHandle::new(1), "three.tmpl");

        let paths: Vec<_> = registry.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("three.tmpl"),
                PathBuf::from("two.tmpl"),
                PathBuf::from("one.tmpl"),
            ]
        );
    }

    #[test]
    fn test_from_decls_skips_incomplete_entries() {
        let mut server = FakeServer::new()
            .with_variable("/sys/a", 1)
            .with_variable("/sys/b", 2);
        let decls = vec![
            FileVarDecl::new("/sys/a", "a.tmpl"),
            FileVarDecl {
                var: Some("/sys/b".to_string()),
                file: None,
            },
            FileVarDecl::new("/sys/b", "b.tmpl"),
        ];

        let registry = FileVarRegistry::from_decls(&mut server, &decls);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup(VarHandle::new(2)).map(|e| e.path.clone()),
            Some(PathBuf::from("b.tmpl"))
        );
    }
}
