//! Array-versus-object decision for intermediate nodes

use crate::schema::SchemaIndex;

/// Shape of a container created by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Array,
    Object,
}

/// Container kind together with how it was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerDecision {
    /// Decided from the element's maximum cardinality
    Schema(ContainerKind),
    /// No schema element; decided from the property name
    Heuristic(ContainerKind),
}

impl ContainerDecision {
    pub fn kind(self) -> ContainerKind {
        match self {
            ContainerDecision::Schema(kind) | ContainerDecision::Heuristic(kind) => kind,
        }
    }

    pub fn is_array(self) -> bool {
        self.kind() == ContainerKind::Array
    }
}

/// Property names that repeat in every resource type
pub const REPEATING_NAMES: &[&str] = &[
    "coding",
    "identifier",
    "extension",
    "name",
    "telecom",
    "contact",
    "entry",
    "link",
    "item",
    "profile",
];

/// Decide the container kind for `absolute_path`
pub fn decide_container(absolute_path: &str, schema: &SchemaIndex) -> ContainerDecision {
    if let Some(element) = schema.lookup(absolute_path) {
        return ContainerDecision::Schema(if element.is_repeating() {
            ContainerKind::Array
        } else {
            ContainerKind::Object
        });
    }

    let last = absolute_path.rsplit('.').next().unwrap_or(absolute_path);
    let name = last.split_once(':').map_or(last, |(name, _)| name);
    if REPEATING_NAMES.contains(&name) {
        ContainerDecision::Heuristic(ContainerKind::Array)
    } else {
        ContainerDecision::Heuristic(ContainerKind::Object)
    }
}
