//! Detection engine: gate, suppressed-slot classifier, identity matcher and the
//! pass that chains them over one frame.

pub mod annotate;
pub mod catalog;
pub mod classifier;
pub mod gate;
pub mod matcher;
pub mod pass;

pub use annotate::annotate;
pub use catalog::{Catalog, CatalogEntry, Variant};
pub use classifier::{classify, Classification, RegionMetrics, SuppressionReason};
pub use gate::{gate_score, GateController, GateState, GateTransition};
pub use matcher::{rank_candidates, CatalogMatcher, Identification, Identify};
pub use pass::{run_pass, DetectionResult, DetectionSummary};
