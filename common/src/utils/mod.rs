//! Utility functions and helpers.

pub mod sql_classifier;

// Re-export commonly used types
pub use sql_classifier::{
    Classification, ClassifiedStatement, QuerySafetyClassifier, RejectReason,
};
