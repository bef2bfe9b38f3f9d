use serde_json::Map;
use serde_json::Value;

use crate::errors::TemplateError;

/// A schema-scoped template mapping a resource body to a sync-backend key.
///
/// Templates are plain strings with `{{field}}` placeholders referring to
/// top-level body fields, e.g. `/nets/{{tenant_id}}/{{id}}`. Parsing
/// happens once at schema construction; rendering happens per event.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncKeyTemplate {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field(String),
}

impl SyncKeyTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(TemplateError::Unterminated {
                    template: raw.to_string(),
                });
            };
            let field = after[..end].trim();
            if field.is_empty() {
                return Err(TemplateError::EmptyPlaceholder {
                    template: raw.to_string(),
                });
            }
            segments.push(Segment::Field(field.to_string()));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Substitute every placeholder from the matching top-level body field.
    ///
    /// Strings render verbatim; numbers and booleans through their display
    /// form. Missing fields and non-scalar values are errors; the caller
    /// decides whether to fall back to the raw resource path.
    pub fn render(&self, body: &Map<String, Value>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = body.get(name).ok_or_else(|| TemplateError::MissingField {
                        field: name.clone(),
                    })?;
                    match value {
                        Value::String(s) => out.push_str(s),
                        Value::Number(n) => out.push_str(&n.to_string()),
                        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
                        _ => {
                            return Err(TemplateError::NonScalarField {
                                field: name.clone(),
                            })
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}
