//! Schema metadata index
//!
//! Wraps the flat element list of one resource type (or profile) in a lookup
//! structure keyed by absolute path. Slices are addressed as `A.b:slice` and
//! fall back to `A.b`; choice elements (`value[x]`) are matched by any typed
//! variant (`valueQuantity`, `valueString`, ...).

use crate::path::strip_slices;
use crate::types::SchemaElement;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Path-keyed view over a resource's schema elements
#[derive(Debug, Clone, Default)]
pub struct SchemaIndex {
    resource_type: String,
    elements: Vec<SchemaElement>,
    by_path: HashMap<String, usize>,
    parents: HashSet<String>,
    choices: HashSet<String>,
}

impl SchemaIndex {
    /// Build an index over `elements` for `resource_type`
    pub fn new(resource_type: impl Into<String>, elements: Vec<SchemaElement>) -> Self {
        let mut by_path = HashMap::with_capacity(elements.len());
        let mut parents = HashSet::new();
        let mut choices = HashSet::new();

        for (position, element) in elements.iter().enumerate() {
            let key = element.sliced_path();
            by_path.entry(key.clone()).or_insert(position);
            // Also reachable without the slice when no unsliced element exists.
            by_path.entry(element.path.clone()).or_insert(position);

            if let Some(stem) = element.path.strip_suffix("[x]") {
                choices.insert(stem.to_string());
            }
            for candidate in [&key, &element.path] {
                let mut cursor = candidate.as_str();
                while let Some((parent, _)) = cursor.rsplit_once('.') {
                    parents.insert(parent.to_string());
                    parents.insert(strip_slices(parent));
                    cursor = parent;
                }
            }
        }

        Self {
            resource_type: resource_type.into(),
            elements,
            by_path,
            parents,
            choices,
        }
    }

    /// An index with no elements; every lookup misses
    pub fn empty(resource_type: impl Into<String>) -> Self {
        Self::new(resource_type, Vec::new())
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn elements(&self) -> &[SchemaElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Find the element for an absolute path
    ///
    /// Tries the exact (possibly sliced) path, then the slice-stripped path.
    /// Typed choice variants resolve to their `[x]` element.
    pub fn lookup(&self, absolute_path: &str) -> Option<&SchemaElement> {
        self.lookup_exact(absolute_path)
            .or_else(|| self.lookup_exact(&strip_slices(absolute_path)))
    }

    /// Find the element for an absolute path without slice fallback
    pub fn lookup_exact(&self, absolute_path: &str) -> Option<&SchemaElement> {
        if let Some(&position) = self.by_path.get(absolute_path) {
            return self.elements.get(position);
        }
        let resolved = self.resolve_choices(absolute_path)?;
        self.by_path
            .get(&resolved)
            .and_then(|&position| self.elements.get(position))
    }

    /// Whether an element exists for the path, without slice fallback
    pub fn contains(&self, absolute_path: &str) -> bool {
        self.lookup_exact(absolute_path).is_some()
    }

    /// Whether any element is declared below the path
    ///
    /// A slice inherits the children of its base element.
    pub fn has_children(&self, absolute_path: &str) -> bool {
        if self.parents.contains(absolute_path) || self.parents.contains(&strip_slices(absolute_path)) {
            return true;
        }
        self.resolve_choices(absolute_path)
            .is_some_and(|resolved| self.parents.contains(&resolved))
    }

    /// Elements carrying a fixed or default value
    pub fn fixed_or_default(&self) -> impl Iterator<Item = &SchemaElement> {
        self.elements.iter().filter(|e| e.has_fixed_or_default())
    }

    /// Elements with a minimum cardinality of one or more
    pub fn mandatory(&self) -> impl Iterator<Item = &SchemaElement> {
        self.elements.iter().filter(|e| e.is_mandatory())
    }

    /// Rewrite typed choice segments (`valueQuantity`) to `value[x]`
    ///
    /// Returns `None` when nothing was rewritten.
    fn resolve_choices(&self, absolute_path: &str) -> Option<String> {
        if self.choices.is_empty() {
            return None;
        }
        let mut resolved: Vec<String> = Vec::new();
        let mut changed = false;

        for segment in absolute_path.split('.') {
            let (name, slice) = match segment.split_once(':') {
                Some((name, slice)) => (name, Some(slice)),
                None => (segment, None),
            };
            let parent = resolved.join(".");
            let choice = self.choices.iter().find_map(|stem| {
                let (stem_parent, stem_name) = stem.rsplit_once('.')?;
                (stem_parent == parent && is_choice_variant(stem_name, name)).then_some(stem_name)
            });

            let mut rendered = match choice {
                Some(stem_name) => {
                    changed = true;
                    format!("{stem_name}[x]")
                }
                None => name.to_string(),
            };
            if let Some(slice) = slice {
                rendered.push(':');
                rendered.push_str(slice);
            }
            resolved.push(rendered);
        }

        changed.then(|| resolved.join("."))
    }
}

/// Whether `name` is a typed variant of the choice stem (`value` / `valueString`)
fn is_choice_variant(stem: &str, name: &str) -> bool {
    name.strip_prefix(stem)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|first| first.is_ascii_uppercase())
}

/// Property name to write for an element path's last segment
///
/// `value[x]` with declared type `Quantity` becomes `valueQuantity`; any
/// other name is returned unchanged.
pub fn concrete_property_name(last_segment: &str, declared_type: Option<&str>) -> String {
    match (last_segment.strip_suffix("[x]"), declared_type) {
        (Some(stem), Some(declared)) if !declared.is_empty() => {
            let mut chars = declared.chars();
            let mut name = stem.to_string();
            if let Some(first) = chars.next() {
                name.extend(first.to_uppercase());
                name.push_str(chars.as_str());
            }
            name
        }
        (Some(stem), _) => stem.to_string(),
        (None, _) => last_segment.to_string(),
    }
}

/// Parse a stored fixed/default value according to its declared type
pub fn parse_typed_value(stored: &Value, declared_type: Option<&str>) -> Value {
    let raw = match stored {
        Value::String(raw) => raw,
        other => return other.clone(),
    };
    let Some(declared) = declared_type.filter(|t| !t.is_empty()) else {
        return stored.clone();
    };

    match declared {
        "boolean" => match raw.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => stored.clone(),
        },
        "integer" | "positiveInt" | "unsignedInt" | "integer64" => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| stored.clone()),
        "decimal" => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| stored.clone()),
        complex if complex.starts_with(|c: char| c.is_ascii_uppercase()) => {
            serde_json::from_str(raw).unwrap_or_else(|_| stored.clone())
        }
        _ => stored.clone(),
    }
}
