//! JSON shape analysis and store routing.
//!
//! This crate answers one question: given a parsed JSON tree, does it want
//! to live in a relational table or a document collection? The answer comes
//! in two stages:
//!
//! 1. [`analyze`] walks the tree once and produces a [`ShapeMetrics`]
//!    record: depth, object/field counts, per-field presence, schema and
//!    type consistency, array shape flags.
//! 2. [`decide`] scores the metrics on two additive scales (one per
//!    backing) and picks a winner. Ties go to `document` - nested
//!    structures are the safer default - and a zero/zero score also lands
//!    on `document` with confidence 0.5.
//!
//! Both stages are pure and deterministic; the same tree always yields the
//! same metrics, scores, and decision.
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//!
//! let tree = json!([
//!     {"id": 1, "name": "A", "price": 9.99},
//!     {"id": 2, "name": "B", "price": 19.99},
//! ]);
//! let analysis = analyzer::analyze_and_decide(&tree);
//! assert_eq!(analysis.verdict.backing, analyzer::Backing::Relational);
//! assert!(analysis.verdict.confidence > 0.99);
//! ```

mod metrics;
mod score;

pub use crate::metrics::{analyze, ShapeMetrics};
pub use crate::score::{decide, Backing, Verdict};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metrics plus verdict for one tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub metrics: ShapeMetrics,
    pub verdict: Verdict,
}

/// Run both stages.
pub fn analyze_and_decide(tree: &Value) -> Analysis {
    let metrics = analyze(tree);
    let verdict = decide(&metrics);
    tracing::debug!(
        backing = %verdict.backing,
        confidence = verdict.confidence,
        sql_score = verdict.sql_score,
        nosql_score = verdict.nosql_score,
        max_depth = metrics.max_depth,
        total_objects = metrics.total_objects,
        "shape_decision"
    );
    Analysis { metrics, verdict }
}
