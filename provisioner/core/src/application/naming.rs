// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

//! Creation Token Naming
//!
//! Derives the idempotency key of a remote filesystem from the logical
//! attributes of a request using a configurable template.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Pure, deterministic `template x request -> token`
//!
//! # Template syntax
//!
//! Literal text with `{field}` placeholders. Supported fields:
//!
//! - `{namespace}` - namespace of the claim
//! - `{pvName}` - name chosen for the persistent volume
//! - `{pvcName}` - name of the claim (fails if the request has none)
//!
//! Rendering never truncates: an over-long or empty result is an error.

use std::fmt;
use thiserror::Error;

use crate::domain::request::{CreationToken, ProvisioningRequest};

/// Longest creation token EFS accepts.
pub const MAX_TOKEN_LENGTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("naming template is empty")]
    EmptyTemplate,

    #[error("unclosed '{{' at position {0}")]
    Unclosed(usize),

    #[error("unmatched '}}' at position {0}")]
    Unmatched(usize),

    #[error("empty placeholder at position {0}")]
    EmptyPlaceholder(usize),

    #[error("unknown template field '{0}'")]
    UnknownField(String),

    #[error("template field '{0}' is not set on this request")]
    MissingField(String),

    #[error("rendered name is empty")]
    EmptyName,

    #[error("rendered name is {length} characters long, the limit is {}", MAX_TOKEN_LENGTH)]
    TooLong { length: usize },

    #[error("rendered name contains non-printable character {0:?}")]
    InvalidCharacter(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed naming template.
///
/// Parsing validates syntax and field names up front, so a bad template is
/// caught when configuration is loaded rather than on the first request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl NameTemplate {
    pub fn parse(template: &str) -> Result<Self, NamingError> {
        if template.is_empty() {
            return Err(NamingError::EmptyTemplate);
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices();

        while let Some((position, c)) = chars.next() {
            match c {
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(NamingError::Unclosed(position)),
                            c => field.push(c),
                        }
                    }
                    if !closed {
                        return Err(NamingError::Unclosed(position));
                    }

                    let field = field.trim().to_string();
                    if field.is_empty() {
                        return Err(NamingError::EmptyPlaceholder(position));
                    }
                    if !ProvisioningRequest::FIELDS.contains(&field.as_str()) {
                        return Err(NamingError::UnknownField(field));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => return Err(NamingError::Unmatched(position)),
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Substitute the request's fields into the template.
    pub fn render(&self, request: &ProvisioningRequest) -> Result<CreationToken, NamingError> {
        let mut name = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Field(field) => {
                    let value = request
                        .field(field)
                        .filter(|value| !value.is_empty())
                        .ok_or_else(|| NamingError::MissingField(field.clone()))?;
                    name.push_str(value);
                }
            }
        }

        if name.is_empty() {
            return Err(NamingError::EmptyName);
        }
        if let Some(c) = name.chars().find(|c| !(c.is_ascii_graphic() || *c == ' ')) {
            return Err(NamingError::InvalidCharacter(c));
        }
        let length = name.chars().count();
        if length > MAX_TOKEN_LENGTH {
            return Err(NamingError::TooLong { length });
        }

        Ok(CreationToken::new(name))
    }
}

impl fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse `template` and render it for `request` in one go.
pub fn format_name(
    template: &str,
    request: &ProvisioningRequest,
) -> Result<CreationToken, NamingError> {
    NameTemplate::parse(template)?.render(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProvisioningRequest {
        ProvisioningRequest::new("foo", "bar").with_claim_name("baz")
    }

    #[test]
    fn test_format_name() {
        let name = format_name("{namespace}-{pvName}", &request()).unwrap();
        assert_eq!(name.as_str(), "foo-bar");

        let name = format_name("{namespace}-{pvcName}", &request()).unwrap();
        assert_eq!(name.as_str(), "foo-baz");
    }

    #[test]
    fn test_literal_text_is_kept() {
        let name = format_name("efs-{ namespace }.{pvName}-data", &request()).unwrap();
        assert_eq!(name.as_str(), "efs-foo.bar-data");

        let name = format_name("static", &request()).unwrap();
        assert_eq!(name.as_str(), "static");
    }

    #[test]
    fn test_determinism() {
        let template = NameTemplate::parse("{namespace}-{pvName}").unwrap();
        let first = template.render(&request()).unwrap();
        let second = template.render(&request().clone()).unwrap();
        assert_eq!(first, second);

        let other_namespace = ProvisioningRequest::new("qux", "bar");
        let other_name = ProvisioningRequest::new("foo", "quux");
        assert_ne!(template.render(&other_namespace).unwrap(), first);
        assert_ne!(template.render(&other_name).unwrap(), first);
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(NameTemplate::parse(""), Err(NamingError::EmptyTemplate));
        assert_eq!(NameTemplate::parse("{namespace"), Err(NamingError::Unclosed(0)));
        assert_eq!(NameTemplate::parse("a-{pv{Name}"), Err(NamingError::Unclosed(2)));
        assert_eq!(NameTemplate::parse("a}"), Err(NamingError::Unmatched(1)));
        assert_eq!(NameTemplate::parse("x-{}"), Err(NamingError::EmptyPlaceholder(2)));
        assert_eq!(
            NameTemplate::parse("{storageClass}"),
            Err(NamingError::UnknownField("storageClass".to_string()))
        );
    }

    #[test]
    fn test_missing_field_fails() {
        let unnamed = ProvisioningRequest::new("foo", "bar");
        assert_eq!(
            format_name("{namespace}-{pvcName}", &unnamed),
            Err(NamingError::MissingField("pvcName".to_string()))
        );
    }

    #[test]
    fn test_overlong_name_is_not_truncated() {
        let request = ProvisioningRequest::new("n".repeat(40), "p".repeat(30));
        assert_eq!(
            format_name("{namespace}-{pvName}", &request),
            Err(NamingError::TooLong { length: 71 })
        );
    }

    #[test]
    fn test_non_printable_name_is_rejected() {
        let request = ProvisioningRequest::new("foo\n", "bar");
        assert_eq!(
            format_name("{namespace}-{pvName}", &request),
            Err(NamingError::InvalidCharacter('\n'))
        );
    }
}
