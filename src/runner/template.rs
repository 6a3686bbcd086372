//! Command templates
//!
//! A command template is parsed into a list of literal segments and
//! `${var}` references, so referenced names can be inspected before
//! anything executes. Rendering is all-or-nothing: the first missing
//! variable fails the whole template.

use crate::error::{TemplateError, TemplateResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Regex matching `${var}` placeholders
fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").unwrap())
}

/// One piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, copied through verbatim
    Literal(String),

    /// A `${name}` reference, substituted at render time
    Variable(String),
}

/// A parsed command template
#[derive(Debug, Clone)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string into segments
    pub fn parse(raw: &str) -> TemplateResult<Self> {
        let mut segments = Vec::new();
        let mut last_end = 0;

        for caps in placeholder_pattern().captures_iter(raw) {
            let m = caps.get(0).expect("capture group 0 always present");
            let name = &caps[1];

            if name.is_empty() {
                return Err(TemplateError::InvalidSyntax(format!(
                    "empty variable reference in '{}'",
                    raw
                )));
            }
            if !is_valid_name(name) {
                return Err(TemplateError::InvalidSyntax(format!(
                    "invalid variable name '{}' in '{}'",
                    name, raw
                )));
            }

            if m.start() > last_end {
                segments.push(Segment::Literal(raw[last_end..m.start()].to_string()));
            }
            segments.push(Segment::Variable(name.to_string()));
            last_end = m.end();
        }

        if last_end < raw.len() {
            segments.push(Segment::Literal(raw[last_end..].to_string()));
        }

        Ok(Template {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The original template string
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The parsed segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of all referenced variables, in order of first appearance
    pub fn references(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !seen.contains(&name.as_str()) {
                    seen.push(name.as_str());
                }
            }
        }
        seen
    }

    /// Substitute every variable reference, failing on the first
    /// missing key
    pub fn render(&self, vars: &BTreeMap<String, String>) -> TemplateResult<String> {
        let mut result = String::with_capacity(self.raw.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => result.push_str(text),
                Segment::Variable(name) => match vars.get(name) {
                    Some(value) => result.push_str(value),
                    None => return Err(TemplateError::UnresolvedVariable(name.clone())),
                },
            }
        }

        Ok(result)
    }
}

/// Variable names follow environment-variable conventions
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
