//! Minimal brace-placeholder prompt templates.
//!
//! `{name}` is a placeholder, `{{` and `}}` are literal braces. Text that
//! should reach the model verbatim must be escaped with
//! [`atlas_core::knowledge::escape_template_braces`] before it is embedded.

use atlas_core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed template, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse `source`. Unbalanced braces and malformed placeholder names are
    /// rejected.
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|&(_, next)| next) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|&(_, next)| next) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(Error::Template(format!(
                            "unclosed '{{' at byte {pos}"
                        )));
                    }
                    if !is_placeholder_name(&name) {
                        return Err(Error::Template(format!(
                            "invalid placeholder {{{name}}} at byte {pos}"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => {
                    return Err(Error::Template(format!(
                        "unmatched '}}' at byte {pos}"
                    )));
                }
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Render the template. Templates here carry no variables, so any
    /// placeholder left in the source is an error.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    return Err(Error::Template(format!(
                        "no value for placeholder {{{name}}}"
                    )));
                }
            }
        }
        Ok(out)
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
