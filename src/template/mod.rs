//! Template rendering for file variables
//!
//! A template file is literal text with `${name}` references to other
//! variables. Rendering replaces each reference with the variable's current
//! value; `$$` produces a literal `$`.
//!
//! # Example
//!
//! ```text
//! hostname: ${/sys/hostname}
//! uptime:   ${/sys/uptime} seconds
//! ```

pub mod lexer;
mod render;

pub use render::{expand, SubstitutionRenderer, TemplateRenderer, VarSource};
