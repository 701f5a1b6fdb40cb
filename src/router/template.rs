//! Route path templates
//!
//! A template is a `/`-separated list of literal segments and `{name}`
//! parameter segments, e.g. `/files/{name}`. Prefix templates end with `/`
//! and match any path that starts with them.

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Parsed route template
#[derive(Debug, Clone)]
pub struct RouteTemplate {
    raw: String,
    segments: Vec<Segment>,
    prefix: bool,
}

/// Result of matching a path against a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
    pub params: Vec<(String, String)>,
    /// Path below a prefix template, always starting with `/`
    pub remainder: String,
}

impl RouteTemplate {
    /// Parse a template matching whole paths only
    pub fn exact(raw: &str) -> AppResult<Self> {
        Self::parse(raw, false)
    }

    /// Parse a template matching every path that starts with it
    ///
    /// The template must end with `/`.
    pub fn prefix(raw: &str) -> AppResult<Self> {
        if !raw.ends_with('/') {
            return Err(invalid(raw, "prefix templates must end with '/'"));
        }
        Self::parse(raw, true)
    }

    fn parse(raw: &str, prefix: bool) -> AppResult<Self> {
        let Some(body) = raw.strip_prefix('/') else {
            return Err(invalid(raw, "templates must start with '/'"));
        };
        let body = if prefix {
            body.strip_suffix('/').unwrap_or(body)
        } else {
            body
        };

        let mut segments = Vec::new();
        if !body.is_empty() {
            for part in body.split('/') {
                segments.push(parse_segment(raw, part)?);
            }
        }

        let mut seen = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) = segment {
                if seen.contains(&name) {
                    return Err(invalid(raw, &format!("duplicate parameter '{}'", name)));
                }
                seen.push(name);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            prefix,
        })
    }

    /// The template as written, used as the metrics label
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match `path` (an absolute URI path) against this template
    pub fn matches(&self, path: &str) -> Option<TemplateMatch> {
        let mut rest = path.strip_prefix('/')?;
        let mut params = Vec::new();

        if self.prefix {
            for segment in &self.segments {
                let (head, tail) = rest.split_once('/')?;
                capture(segment, head, &mut params)?;
                rest = tail;
            }
            return Some(TemplateMatch {
                params,
                remainder: format!("/{}", rest),
            });
        }

        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };
        if parts.len() != self.segments.len() {
            return None;
        }
        for (segment, part) in self.segments.iter().zip(parts) {
            capture(segment, part, &mut params)?;
        }
        Some(TemplateMatch {
            params,
            remainder: "/".to_string(),
        })
    }
}

fn parse_segment(raw: &str, part: &str) -> AppResult<Segment> {
    if part.is_empty() {
        return Err(invalid(raw, "empty path segment"));
    }
    if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(raw, &format!("invalid parameter name '{}'", name)));
        }
        return Ok(Segment::Param(name.to_string()));
    }
    if part.contains('{') || part.contains('}') {
        return Err(invalid(raw, &format!("unbalanced brace in segment '{}'", part)));
    }
    Ok(Segment::Literal(part.to_string()))
}

fn capture(segment: &Segment, part: &str, params: &mut Vec<(String, String)>) -> Option<()> {
    match segment {
        Segment::Literal(literal) => (literal == part).then_some(()),
        Segment::Param(name) => {
            if part.is_empty() {
                return None;
            }
            params.push((name.clone(), part.to_string()));
            Some(())
        }
    }
}

fn invalid(raw: &str, reason: &str) -> AppError {
    AppError::InvalidRoute {
        template: raw.to_string(),
        reason: reason.to_string(),
    }
}
