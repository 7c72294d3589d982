//! File-name collision-stamp rules.
//!
//! Every downloaded asset file gets a timestamp stamp (derived from the
//! asset's creation time) inserted before its extension, so repeated
//! downloads of the same logical file never overwrite each other.  The
//! stamp is stripped again before re-upload so the replacement asset
//! carries the original file name.  [`timestamped_filename`] and
//! [`strip_timestamp_suffix`] must stay exact inverses of each other or
//! file names drift on every replacement.

use chrono::{DateTime, Utc};

/// `strftime` format of the collision stamp (e.g. `20240131_154502`).
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Render a creation timestamp in the collision-stamp format.
pub fn collision_stamp(created_at: DateTime<Utc>) -> String {
    created_at.format(STAMP_FORMAT).to_string()
}

/// Insert `_{stamp}` before the extension of `file_name`.
///
/// `report.pdf` with stamp `20240131_154502` becomes
/// `report_20240131_154502.pdf`; a name without an extension gets the
/// stamp appended at the end.
pub fn timestamped_filename(file_name: &str, stamp: &str) -> String {
    let (base, ext) = split_extension(file_name);
    format!("{base}_{stamp}{ext}")
}

/// Remove a `_{stamp}` suffix previously inserted by
/// [`timestamped_filename`].
///
/// Returns the name unchanged when the stamp is empty or the suffix is
/// not present before the extension.
pub fn strip_timestamp_suffix(file_name: &str, stamp: &str) -> String {
    if stamp.is_empty() {
        return file_name.to_string();
    }
    let (base, ext) = split_extension(file_name);
    let marker = format!("_{stamp}");
    match base.strip_suffix(marker.as_str()) {
        Some(clean) => format!("{clean}{ext}"),
        None => file_name.to_string(),
    }
}

/// Split a file name into (stem, extension including the dot).
///
/// A leading dot (`.env`) is treated as part of the stem, not as an
/// extension separator.
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}
