//! Single-pass structural metrics over an arbitrary JSON tree.
//!
//! Depth counts container nesting: the root container sits at level 1 and a
//! scalar is recorded at the level of the container holding it, so a flat
//! array of objects has `max_depth == 2`. Field presence is measured
//! against the set of all object nodes in the tree; `schema_consistency`
//! is the mean of those presence fractions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive kind of a JSON value, for type-consistency bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

fn kind_of(value: &Value) -> Kind {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Bool,
        Value::Number(_) => Kind::Number,
        Value::String(_) => Kind::String,
        Value::Array(_) => Kind::Array,
        Value::Object(_) => Kind::Object,
    }
}

/// Structural measurements of one JSON tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShapeMetrics {
    /// Container nesting level of the deepest scalar; root container = 1.
    pub max_depth: u32,
    /// Number of object nodes.
    pub total_objects: u32,
    /// Number of distinct field names.
    pub unique_fields: u32,
    /// Total field occurrences across all objects.
    pub total_field_occurrences: u32,
    /// Per-field fraction of object nodes carrying the field, in [0,1].
    pub field_presence: BTreeMap<String, f64>,
    /// Mean of `field_presence`; 1.0 when no fields were observed.
    pub schema_consistency: f64,
    /// Fraction of fields whose values all share one kind; 1.0 when no
    /// fields were observed.
    pub type_consistency: f64,
    /// True when the tree contains any array at all, the root fan-out
    /// array excluded.
    pub has_arrays: bool,
    /// True when some non-root array holds a container (or the root array
    /// holds an array).
    pub has_nested_arrays: bool,
    /// True when some field's value set spans more than one kind.
    pub has_mixed_types: bool,
}

#[derive(Default)]
struct Walk {
    max_depth: u32,
    total_objects: u32,
    total_field_occurrences: u32,
    field_objects: BTreeMap<String, u32>,
    field_kinds: BTreeMap<String, Vec<Kind>>,
    has_arrays: bool,
    has_nested_arrays: bool,
}

impl Walk {
    fn visit(&mut self, value: &Value, depth: u32, is_root: bool) {
        match value {
            Value::Object(map) => {
                self.total_objects += 1;
                self.max_depth = self.max_depth.max(depth);
                for (key, child) in map {
                    self.total_field_occurrences += 1;
                    *self.field_objects.entry(key.clone()).or_insert(0) += 1;
                    let kinds = self.field_kinds.entry(key.clone()).or_default();
                    let kind = kind_of(child);
                    if !kinds.contains(&kind) {
                        kinds.push(kind);
                    }
                    match child {
                        Value::Object(_) | Value::Array(_) => {
                            self.visit(child, depth + 1, false);
                        }
                        _ => self.max_depth = self.max_depth.max(depth),
                    }
                }
            }
            Value::Array(items) => {
                if !is_root {
                    self.has_arrays = true;
                }
                self.max_depth = self.max_depth.max(depth);
                for item in items {
                    match item {
                        Value::Array(_) => {
                            // An array element that is itself an array is
                            // nested wherever it appears, root included.
                            self.has_nested_arrays = true;
                            self.visit(item, depth + 1, false);
                        }
                        Value::Object(_) => {
                            if !is_root {
                                self.has_nested_arrays = true;
                            }
                            self.visit(item, depth + 1, false);
                        }
                        _ => self.max_depth = self.max_depth.max(depth),
                    }
                }
            }
            _ => self.max_depth = self.max_depth.max(depth.max(1)),
        }
    }
}

/// Walk `tree` once and compute its [`ShapeMetrics`].
pub fn analyze(tree: &Value) -> ShapeMetrics {
    let mut walk = Walk::default();
    walk.visit(tree, 1, true);

    let total_objects = walk.total_objects;
    let mut field_presence = BTreeMap::new();
    for (field, containing) in &walk.field_objects {
        let denom = total_objects.max(1) as f64;
        field_presence.insert(field.clone(), f64::from(*containing) / denom);
    }

    let schema_consistency = if field_presence.is_empty() {
        1.0
    } else {
        field_presence.values().sum::<f64>() / field_presence.len() as f64
    };

    let (type_consistency, has_mixed_types) = if walk.field_kinds.is_empty() {
        (1.0, false)
    } else {
        let consistent = walk
            .field_kinds
            .values()
            .filter(|kinds| kinds.len() == 1)
            .count();
        let total = walk.field_kinds.len();
        (consistent as f64 / total as f64, consistent != total)
    };

    ShapeMetrics {
        max_depth: walk.max_depth,
        total_objects,
        unique_fields: walk.field_objects.len() as u32,
        total_field_occurrences: walk.total_field_occurrences,
        field_presence,
        schema_consistency,
        type_consistency,
        has_arrays: walk.has_arrays,
        has_nested_arrays: walk.has_nested_arrays,
        has_mixed_types,
    }
}
