//! Client for the Contentful Management API (CMA).
//!
//! [`CmaClient`] wraps the small set of CMA calls the replacement
//! pipeline needs: entry and asset reads, the upload/create/process/
//! publish sequence for new assets, asset unpublish and archive, the
//! entry link patch, and entry publish.  [`download`] covers fetching
//! an asset's binary file to local disk.

mod assets;
mod client;
pub mod download;
mod entries;

pub use assets::{Asset, PROCESS_POLL_ATTEMPTS, PROCESS_POLL_INTERVAL};
pub use client::{ApiError, Auth, CmaClient, CmaConfig, VERSION_HEADER};
pub use download::DownloadError;
pub use entries::Entry;
