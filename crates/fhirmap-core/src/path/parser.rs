//! Mapping path parser
//!
//! Tokenizes a mapping path such as
//! `identifier[?system='urn:cns'].value` or `extension:race.valueString`
//! into an ordered list of [`PathSegment`]s. Parsing is total: every input
//! produces a (possibly empty) segment list.
//!
//! Copyright (c) 2025 fhirmap contributors
//! Licensed under the Apache-2.0 license

use std::fmt;

/// One step of a mapping path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Plain property name (`name`)
    Property(String),
    /// Array position (`[2]`)
    Index(usize),
    /// Property constrained to a named slice (`identifier:cns`)
    SlicedProperty { name: String, slice: String },
    /// Content-addressed array element (`[?system='urn:cns']`)
    Predicate { key: String, value: String },
}

impl PathSegment {
    /// Property name for property-like segments
    pub fn name(&self) -> Option<&str> {
        match self {
            PathSegment::Property(name) | PathSegment::SlicedProperty { name, .. } => Some(name),
            PathSegment::Index(_) | PathSegment::Predicate { .. } => None,
        }
    }

    /// Slice name, if this is a sliced property
    pub fn slice(&self) -> Option<&str> {
        match self {
            PathSegment::SlicedProperty { slice, .. } => Some(slice),
            _ => None,
        }
    }

    /// Whether the segment addresses an array element
    pub fn is_array_selector(&self) -> bool {
        matches!(self, PathSegment::Index(_) | PathSegment::Predicate { .. })
    }

    fn is_bracketed(&self) -> bool {
        self.is_array_selector()
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Property(name) => write!(f, "{name}"),
            PathSegment::Index(index) => write!(f, "[{index}]"),
            PathSegment::SlicedProperty { name, slice } => write!(f, "{name}:{slice}"),
            PathSegment::Predicate { key, value } => write!(f, "[?{key}='{value}']"),
        }
    }
}

/// Parse a path string into segments
///
/// A `.` outside brackets ends a segment. Bracket content that is all digits
/// becomes an [`PathSegment::Index`], `?key='value'` becomes a
/// [`PathSegment::Predicate`], and any other bracket content is kept
/// verbatim as a property. Quotes inside brackets protect `.`, `[` and `]`.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        if depth > 0 {
            if let Some(q) = quote {
                if ch == q {
                    quote = None;
                }
                current.push(ch);
                continue;
            }
            match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '[' => {
                    depth += 1;
                    current.push(ch);
                }
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        push_bracketed(&mut segments, &current);
                        current.clear();
                        if chars.peek() == Some(&'.') {
                            chars.next();
                        }
                    } else {
                        current.push(ch);
                    }
                }
                _ => current.push(ch),
            }
            continue;
        }

        match ch {
            '.' => {
                push_plain(&mut segments, &current);
                current.clear();
            }
            '[' => {
                push_plain(&mut segments, &current);
                current.clear();
                depth = 1;
            }
            _ => current.push(ch),
        }
    }

    if depth > 0 {
        // Unterminated bracket: keep whatever followed it as a property.
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            segments.push(PathSegment::Property(trimmed.to_string()));
        }
    } else {
        push_plain(&mut segments, &current);
    }

    segments
}

fn push_plain(segments: &mut Vec<PathSegment>, raw: &str) {
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    if let Some((name, slice)) = raw.split_once(':') {
        if !name.is_empty() && !slice.is_empty() {
            segments.push(PathSegment::SlicedProperty {
                name: name.to_string(),
                slice: slice.to_string(),
            });
            return;
        }
    }
    segments.push(PathSegment::Property(raw.to_string()));
}

fn push_bracketed(segments: &mut Vec<PathSegment>, raw: &str) {
    let content = raw.trim();
    if content.is_empty() {
        return;
    }
    if content.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(index) = content.parse::<usize>() {
            segments.push(PathSegment::Index(index));
            return;
        }
    }
    if let Some(predicate) = parse_predicate(content) {
        segments.push(predicate);
        return;
    }
    segments.push(PathSegment::Property(content.to_string()));
}

fn parse_predicate(content: &str) -> Option<PathSegment> {
    let body = content.strip_prefix('?')?.trim();
    let (key, literal) = body.split_once('=')?;
    let key = key.trim();
    let literal = literal.trim();
    if key.is_empty() || literal.len() < 2 {
        return None;
    }
    let first = literal.chars().next()?;
    if (first != '\'' && first != '"') || !literal.ends_with(first) {
        return None;
    }
    Some(PathSegment::Predicate {
        key: key.to_string(),
        value: literal[1..literal.len() - 1].to_string(),
    })
}

/// Render segments back into path syntax
pub fn render_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        if !segment.is_bracketed() && !out.is_empty() {
            out.push('.');
        }
        out.push_str(&segment.to_string());
    }
    out
}

/// Path reduced to property names: indices, predicates and slices removed
///
/// `identifier[?system='x'].value` and `identifier:cns.value` both reduce to
/// `identifier.value`.
pub fn base_path(path: &str) -> String {
    parse_path(path)
        .iter()
        .filter_map(PathSegment::name)
        .collect::<Vec<_>>()
        .join(".")
}

/// Path with indices and predicates removed, slices kept
pub fn strip_indices(path: &str) -> String {
    let segments: Vec<PathSegment> = parse_path(path)
        .into_iter()
        .filter(|segment| !segment.is_array_selector())
        .collect();
    render_path(&segments)
}

/// Remove every `:slice` suffix from a dotted path
pub fn strip_slices(path: &str) -> String {
    path.split('.')
        .map(|part| part.split_once(':').map_or(part, |(name, _)| name))
        .collect::<Vec<_>>()
        .join(".")
}
