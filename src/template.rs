//! Filename Templates
//!
//! Compiles filename patterns such as `Image Picka/${pageTitle}/${name}${ext}` into a
//! reusable renderer. Placeholders are resolved either as plain environment lookups or
//! as sandboxed expressions, then escaped so the rendered value is a safe relative path.

use crate::environment::{value_to_text, Environment};
use crate::error::TemplateError;
use serde::{Deserialize, Serialize};

pub mod escape;
pub mod expr;

pub use escape::{escape_path, escape_variable};
use expr::Expression;

/// How `${...}` placeholders are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// The placeholder text is an environment key
    #[default]
    Property,
    /// The placeholder text is an expression over the environment
    Expression,
}

impl RenderMode {
    pub fn from_flag(use_expression: bool) -> Self {
        if use_expression {
            RenderMode::Expression
        } else {
            RenderMode::Property
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Property(String),
    Expression(Expression),
}

/// A compiled filename pattern
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pattern: String,
    mode: RenderMode,
    segments: Vec<Segment>,
}

impl Template {
    /// Compile `pattern`. In expression mode every placeholder is parsed here, so a
    /// malformed expression fails before anything is rendered.
    pub fn compile(pattern: &str, mode: RenderMode) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = pattern;

        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            // `.+?` semantics: the first `}` after at least one character closes the span
            let Some(end) = after.char_indices().skip(1).find(|(_, c)| *c == '}').map(|(i, _)| i)
            else {
                break;
            };
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let inner = &after[..end];
            segments.push(match mode {
                RenderMode::Property => Segment::Property(inner.to_string()),
                RenderMode::Expression => {
                    let expression =
                        Expression::parse(inner).map_err(|e| TemplateError::Compile {
                            expression: inner.to_string(),
                            message: e.to_string(),
                        })?;
                    Segment::Expression(expression)
                }
            });
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            mode,
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Render against `env`. The environment is only read.
    pub fn render(&self, env: &Environment) -> Result<String, TemplateError> {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Property(key) => {
                    let text = env.get(key).map(value_to_text).unwrap_or_default();
                    output.push_str(&escape_variable(&text));
                }
                Segment::Expression(expression) => {
                    let value =
                        expression
                            .evaluate(env)
                            .map_err(|e| TemplateError::Render {
                                expression: expression.source().to_string(),
                                message: e.to_string(),
                            })?;
                    output.push_str(&escape_variable(&value.to_text()));
                }
            }
        }
        Ok(escape_path(&output))
    }
}
