//! Row-at-a-time drivers for every run mode.
//!
//! The default mode ([`replace`]) drives each input row through the
//! fixed replacement sequence; the secondary modes ([`modes`]) are
//! single-call-per-row variants.  All modes share the same discipline:
//! a row's failure is logged, written to the failure ledger, and never
//! aborts the run.

pub mod modes;
pub mod replace;
mod source;

pub use replace::{run_replace, Stage};
pub use source::{PipelineError, RunSummary};
