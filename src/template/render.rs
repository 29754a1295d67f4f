//! Template expansion

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::debug;

use super::lexer::{lex, Token};

/// Source of live variable values for template expansion
pub trait VarSource {
    /// Current value of the named variable, if it exists
    fn value(&self, name: &str) -> Option<String>;
}

impl VarSource for HashMap<String, String> {
    fn value(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl VarSource for BTreeMap<String, String> {
    fn value(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<T: VarSource + ?Sized> VarSource for Arc<T> {
    fn value(&self, name: &str) -> Option<String> {
        (**self).value(name)
    }
}

impl<T: VarSource + ?Sized> VarSource for &T {
    fn value(&self, name: &str) -> Option<String> {
        (**self).value(name)
    }
}

/// Renders an opened template file into a print session's sink
pub trait TemplateRenderer {
    fn render(&self, input: &mut dyn Read, sink: &mut dyn Write) -> io::Result<()>;
}

/// Expand `${name}` references in `template`, writing the result to `out`.
///
/// References to unknown variables are written out unchanged.
pub fn expand<V>(template: &str, values: &V, out: &mut dyn Write) -> io::Result<()>
where
    V: VarSource + ?Sized,
{
    for (token, span) in lex(template) {
        match token {
            Token::Var(name) => match values.value(&name) {
                Some(value) => out.write_all(value.as_bytes())?,
                None => {
                    debug!(var = %name, "unknown template variable");
                    out.write_all(template[span].as_bytes())?;
                }
            },
            Token::EscapedDollar | Token::Dollar => out.write_all(b"$")?,
            Token::Text => out.write_all(template[span].as_bytes())?,
        }
    }
    Ok(())
}

/// Renderer that substitutes `${name}` references from a [`VarSource`]
#[derive(Debug, Clone)]
pub struct SubstitutionRenderer<V> {
    values: V,
}

impl<V: VarSource> SubstitutionRenderer<V> {
    pub fn new(values: V) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &V {
        &self.values
    }
}

impl<V: VarSource> TemplateRenderer for SubstitutionRenderer<V> {
    fn render(&self, input: &mut dyn Read, sink: &mut dyn Write) -> io::Result<()> {
        let mut raw = Vec::new();
        input.read_to_end(&mut raw)?;
        let template = String::from_utf8_lossy(&raw);
        expand(&template, &self.values, sink)?;
        sink.flush()
    }
}
