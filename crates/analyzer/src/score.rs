//! Additive scoring of shape metrics into a backing decision.

use serde::{Deserialize, Serialize};

use crate::metrics::ShapeMetrics;

const EPSILON: f64 = 1e-6;

/// The chosen persistence engine for a JSON document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backing {
    Relational,
    Document,
}

impl std::fmt::Display for Backing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backing::Relational => f.write_str("relational"),
            Backing::Document => f.write_str("document"),
        }
    }
}

/// Scoring outcome: winner, confidence, raw scores, and a human-readable
/// reasons list (winning contributions, plus losing-side counter-signals
/// flagged as weak).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub backing: Backing,
    pub confidence: f64,
    pub sql_score: f64,
    pub nosql_score: f64,
    pub reasons: Vec<String>,
}

fn sql_contributions(m: &ShapeMetrics) -> Vec<(f64, &'static str)> {
    let mut parts = Vec::new();
    if m.schema_consistency > 0.90 {
        parts.push((3.0, "consistent object schemas"));
    }
    if m.max_depth <= 2 {
        parts.push((2.5, "shallow structure"));
    }
    if !m.has_arrays {
        parts.push((1.5, "no arrays"));
    } else if !m.has_nested_arrays {
        parts.push((1.0, "only flat arrays"));
    }
    if m.field_presence.values().all(|p| *p >= 0.80) {
        parts.push((2.0, "fields present across objects"));
    }
    if m.type_consistency == 1.0 {
        parts.push((2.0, "uniform field types"));
    }
    parts
}

fn nosql_contributions(m: &ShapeMetrics) -> Vec<(f64, &'static str)> {
    let mut parts = Vec::new();
    if m.schema_consistency < 0.70 {
        parts.push((2.5, "inconsistent object schemas"));
    }
    if m.max_depth > 4 {
        parts.push((3.0, "deep nesting"));
    }
    if m.has_nested_arrays {
        parts.push((2.5, "nested arrays"));
    }
    if m.field_presence.values().any(|p| *p < 0.50) {
        parts.push((2.0, "sparse fields"));
    }
    if m.has_mixed_types {
        parts.push((1.5, "mixed value types"));
    }
    parts
}

/// Score `metrics` and pick a backing. Ties (including zero/zero) resolve
/// to `document` with confidence 0.5.
pub fn decide(metrics: &ShapeMetrics) -> Verdict {
    let sql_parts = sql_contributions(metrics);
    let nosql_parts = nosql_contributions(metrics);
    let sql_score: f64 = sql_parts.iter().map(|(w, _)| w).sum();
    let nosql_score: f64 = nosql_parts.iter().map(|(w, _)| w).sum();

    let (backing, confidence, winners, losers) = if (sql_score - nosql_score).abs() < EPSILON {
        (Backing::Document, 0.5, nosql_parts, sql_parts)
    } else if sql_score > nosql_score {
        let confidence = sql_score / (sql_score + nosql_score + EPSILON);
        (Backing::Relational, confidence, sql_parts, nosql_parts)
    } else {
        let confidence = nosql_score / (sql_score + nosql_score + EPSILON);
        (Backing::Document, confidence, nosql_parts, sql_parts)
    };

    let mut reasons: Vec<String> = winners.iter().map(|(_, label)| (*label).into()).collect();
    reasons.extend(losers.iter().map(|(_, label)| format!("weak: {label}")));

    Verdict {
        backing,
        confidence,
        sql_score,
        nosql_score,
        reasons,
    }
}
