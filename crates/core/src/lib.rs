//! Shared domain logic for the relink batch tool.
//!
//! Contains everything that does not touch the network: the CSV row
//! source, the append-only outcome ledgers, and the file-name
//! collision-stamp rules used when downloaded asset files are re-uploaded.

pub mod ledger;
pub mod naming;
pub mod rows;
