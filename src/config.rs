//! Configuration file loading
//!
//! The configuration lists which variables map to which template files, plus
//! the settings of the bundled local variable server. JSON is the primary
//! format; files ending in `.toml` are read as TOML.
//!
//! ```json
//! {
//!     "config": [
//!         { "var": "/sys/test/info", "file": "/etc/filevars/info.tmpl" }
//!     ],
//!     "server": {
//!         "socket": "/run/filevars.sock",
//!         "variables": { "/sys/test/info": "", "/sys/hostname": "box-1" }
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default capacity of the notification queue between listener and loop
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Default time a print session may block writing to a stalled reader
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 5;

/// One `{ "var": ..., "file": ... }` mapping.
///
/// Both fields are optional at parse time so that one malformed entry does
/// not reject the whole file; registration reports it instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileVarDecl {
    #[serde(default)]
    pub var: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

impl FileVarDecl {
    pub fn new(var: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            var: Some(var.into()),
            file: Some(file.into()),
        }
    }
}

/// Settings for the bundled local variable server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket readers connect to
    pub socket: PathBuf,
    /// Maximum number of print requests buffered ahead of the dispatch loop
    pub queue_depth: usize,
    /// Seconds a single write to a reader may block before the print is
    /// abandoned
    pub write_timeout_secs: u64,
    /// Variables known to the server and their current values
    pub variables: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket: std::env::temp_dir().join("filevars.sock"),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            variables: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn with_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.socket = socket.into();
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_write_timeout_secs(mut self, secs: u64) -> Self {
        self.write_timeout_secs = secs;
        self
    }

    /// Write timeout applied to parked print sessions; never zero
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileVarsConfig {
    /// File variable mappings, in document order
    #[serde(default)]
    pub config: Vec<FileVarDecl>,
    #[serde(default)]
    pub server: ServerConfig,
}

impl FileVarsConfig {
    /// Load a configuration file, choosing the format from its extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let name = path.display().to_string();
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            Self::parse_toml(&name, text)
        } else {
            Self::parse_json(&name, text)
        }
    }

    /// Parse a JSON configuration document
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse_json("<config>", text.to_string())
    }

    /// Parse a TOML configuration document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse_toml("<config>", text.to_string())
    }

    fn parse_json(name: &str, text: String) -> Result<Self, ConfigError> {
        match serde_json::from_str(&text) {
            Ok(config) => Ok(config),
            Err(error) => Err(ConfigError::Json {
                name: name.to_string(),
                text,
                error,
            }),
        }
    }

    fn parse_toml(name: &str, text: String) -> Result<Self, ConfigError> {
        match toml::from_str(&text) {
            Ok(config) => Ok(config),
            Err(error) => Err(ConfigError::Toml {
                name: name.to_string(),
                text,
                error,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_json_mappings_in_order() {
        let config = FileVarsConfig::from_json_str(
            r#"{"config": [
                {"var": "/sys/test/info", "file": "/tmp/t.tmpl"},
                {"var": "/sys/test/other", "file": "other.tmpl"}
            ]}"#,
        )
        .expect("Should parse");

        assert_eq!(
            config.config,
            vec![
                FileVarDecl::new("/sys/test/info", "/tmp/t.tmpl"),
                FileVarDecl::new("/sys/test/other", "other.tmpl"),
            ]
        );
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_parse_json_entry_missing_file() {
        let config = FileVarsConfig::from_json_str(r#"{"config": [{"var": "/sys/a"}]}"#)
            .expect("Should parse");
        assert_eq!(config.config[0].var.as_deref(), Some("/sys/a"));
        assert_eq!(config.config[0].file, None);
    }

    #[test]
    fn test_parse_json_server_section() {
        let config = FileVarsConfig::from_json_str(
            r#"{
                "config": [],
                "server": {
                    "socket": "/run/fv.sock",
                    "variables": {"/sys/hostname": "box-1"}
                }
            }"#,
        )
        .expect("Should parse");

        assert_eq!(config.server.socket, PathBuf::from("/run/fv.sock"));
        assert_eq!(config.server.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(
            config.server.variables.get("/sys/hostname").map(String::as_str),
            Some("box-1")
        );
    }

    #[test]
    fn test_parse_toml() {
        let config = FileVarsConfig::from_toml_str(
            r#"
[[config]]
var = "/sys/test/info"
file = "/tmp/t.tmpl"

[server]
queue_depth = 4

[server.variables]
"/sys/test/info" = ""
"#,
        )
        .expect("Should parse");

        assert_eq!(config.config, vec![FileVarDecl::new("/sys/test/info", "/tmp/t.tmpl")]);
        assert_eq!(config.server.queue_depth, 4);
        assert_eq!(config.server.write_timeout_secs, DEFAULT_WRITE_TIMEOUT_SECS);
        assert!(config.server.variables.contains_key("/sys/test/info"));
    }

    #[test]
    fn test_write_timeout_never_zero() {
        let config = FileVarsConfig::from_json_str(r#"{"server": {"write_timeout_secs": 0}}"#)
            .expect("Should parse");
        assert_eq!(config.server.write_timeout_secs, 0);
        assert_eq!(config.server.write_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_json_error() {
        let result = FileVarsConfig::from_json_str("{\"config\": [");
        assert!(matches!(result, Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_invalid_toml_error() {
        let result = FileVarsConfig::from_toml_str("config = {{{{");
        assert!(matches!(result, Err(ConfigError::Toml { .. })));
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let toml_path = dir.path().join("filevars.toml");
        std::fs::write(&toml_path, "[[config]]\nvar = \"a\"\nfile = \"b\"\n").expect("write");
        let json_path = dir.path().join("filevars.json");
        std::fs::write(&json_path, r#"{"config": [{"var": "a", "file": "b"}]}"#).expect("write");

        let from_toml = FileVarsConfig::from_file(&toml_path).expect("Should parse TOML");
        let from_json = FileVarsConfig::from_file(&json_path).expect("Should parse JSON");
        assert_eq!(from_toml.config, from_json.config);
    }

    #[test]
    fn test_from_file_missing() {
        let result = FileVarsConfig::from_file(Path::new("/nonexistent/filevars.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
