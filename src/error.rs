//! Error types for registration, printing and configuration

use std::ops::Range;
use std::path::PathBuf;

use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::server::VarHandle;

/// Errors returned by the registry and the print handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileVarError {
    /// A required input was missing or empty
    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: &'static str },

    /// No registered file variable matches the handle
    #[error("no file variable registered for handle {handle}")]
    NotFound { handle: VarHandle },

    /// The registry could not grow
    #[error("out of memory while registering file variable")]
    ResourceExhausted,
}

impl FileVarError {
    pub fn invalid(reason: &'static str) -> Self {
        Self::InvalidArguments { reason }
    }

    pub fn not_found(handle: VarHandle) -> Self {
        Self::NotFound { handle }
    }
}

/// Errors that can occur while loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("failed to parse JSON configuration {name}: {error}")]
    Json {
        name: String,
        text: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("failed to parse TOML configuration {name}: {}", .error.message())]
    Toml {
        name: String,
        text: String,
        #[source]
        error: toml::de::Error,
    },
}

impl ConfigError {
    /// Format the error for an operator, with source context for parse errors
    pub fn report(&self) -> String {
        match self {
            ConfigError::Io { .. } => self.to_string(),
            ConfigError::Json { name, text, error } => {
                let offset = line_col_to_offset(text, error.line(), error.column());
                render_report(name, text, offset..offset, &error.to_string())
                    .unwrap_or_else(|| self.to_string())
            }
            ConfigError::Toml { name, text, error } => {
                let span = error.span().unwrap_or(0..0);
                render_report(name, text, span, error.message())
                    .unwrap_or_else(|| self.to_string())
            }
        }
    }
}

fn render_report(name: &str, text: &str, span: Range<usize>, message: &str) -> Option<String> {
    let end = span.end.min(text.len());
    let start = span.start.min(end);
    let mut buf = Vec::new();
    Report::build(ReportKind::Error, name, start)
        .with_config(Config::default().with_color(false))
        .with_message("invalid configuration")
        .with_label(Label::new((name, start..end)).with_message(message))
        .finish()
        .write((name, Source::from(text)), &mut buf)
        .ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Convert a 1-based line/column pair into a byte offset
fn line_col_to_offset(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    let rest = &text[line_start.min(text.len())..];
    let in_line: usize = rest
        .chars()
        .take(column.saturating_sub(1))
        .take_while(|c| *c != '\n')
        .map(char::len_utf8)
        .sum();
    (line_start + in_line).min(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_var_error_display() {
        let err = FileVarError::not_found(VarHandle::new(4));
        assert_eq!(err.to_string(), "no file variable registered for handle #4");

        let err = FileVarError::invalid("empty variable name");
        assert!(err.to_string().contains("empty variable name"));
    }

    #[test]
    fn test_line_col_to_offset() {
        let text = "ab\ncde\nf";
        assert_eq!(line_col_to_offset(text, 1, 1), 0);
        assert_eq!(line_col_to_offset(text, 2, 2), 4);
        assert_eq!(line_col_to_offset(text, 3, 1), 7);
        assert_eq!(line_col_to_offset(text, 9, 9), text.len());
    }

    #[test]
    fn test_json_report_mentions_file() {
        let text = "{\"config\": [}";
        let error = serde_json::from_str::<serde_json::Value>(text).unwrap_err();
        let err = ConfigError::Json {
            name: "filevars.json".to_string(),
            text: text.to_string(),
            error,
        };
        let report = err.report();
        assert!(report.contains("filevars.json"));
        assert!(report.contains("invalid configuration"));
    }
}
