//! Positional query templates for the condition read strategy

use std::fmt::Write;
use std::sync::OnceLock;

use regex::Regex;

use crate::data::Value;

/// How template parameters reach the database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Substitution {
    /// Splice each parameter's display text into the SQL
    #[default]
    Inline,
    /// Emit numbered `?N` placeholders and bind the values separately
    Bind,
}

/// A caller-supplied SQL fragment with `{}` / `{N}` placeholders
///
/// `{{` and `}}` render as literal braces.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    text: String,
    substitution: Substitution,
}

/// A template with its parameters applied
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    /// Values for `?N` placeholders, empty for inline substitution
    pub params: Vec<Value>,
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{(\d*)\}").expect("placeholder pattern is valid")
    })
}

impl QueryTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            substitution: Substitution::Inline,
        }
    }

    pub fn with_substitution(mut self, substitution: Substitution) -> Self {
        self.substitution = substitution;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn substitution(&self) -> Substitution {
        self.substitution
    }

    /// Apply positional parameters
    pub fn render(&self, params: &[Value]) -> Result<RenderedQuery, TemplateError> {
        let mut sql = String::with_capacity(self.text.len());
        let mut bound = Vec::new();
        let mut last = 0;
        let mut next_auto = 0;

        for caps in placeholder().captures_iter(&self.text) {
            let Some(whole) = caps.get(0) else { continue };
            sql.push_str(&self.text[last..whole.start()]);
            last = whole.end();

            match whole.as_str() {
                "{{" => sql.push('{'),
                "}}" => sql.push('}'),
                _ => {
                    let index = match caps.get(1).map(|g| g.as_str()).filter(|d| !d.is_empty()) {
                        Some(digits) => digits
                            .parse::<usize>()
                            .map_err(|_| TemplateError::BadIndex(digits.to_string()))?,
                        None => {
                            next_auto += 1;
                            next_auto - 1
                        }
                    };
                    let value = params.get(index).ok_or(TemplateError::MissingParam {
                        index,
                        supplied: params.len(),
                    })?;

                    match self.substitution {
                        Substitution::Inline => {
                            let _ = write!(sql, "{}", value);
                        }
                        Substitution::Bind => {
                            bound.push(value.clone());
                            let _ = write!(sql, "?{}", bound.len());
                        }
                    }
                }
            }
        }
        sql.push_str(&self.text[last..]);

        Ok(RenderedQuery { sql, params: bound })
    }
}

/// Template rendering errors
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Placeholder {{{index}}} has no parameter ({supplied} supplied)")]
    MissingParam { index: usize, supplied: usize },

    #[error("Invalid placeholder index: {0}")]
    BadIndex(String),
}
