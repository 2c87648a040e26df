use serde::{Deserialize, Serialize};

use crate::FilterError;

/// What the working copy was fetched with. Fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Commits, trees and refs only; file contents were filtered out.
    MetadataOnly,
    /// Full history including file contents.
    WithBlobs,
}

impl FetchMode {
    /// Whether file contents are available.
    #[must_use]
    pub const fn has_blobs(self) -> bool {
        matches!(self, Self::WithBlobs)
    }
}

/// Rejects requests for data the session's fetch mode did not fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterGuard {
    mode: FetchMode,
}

impl FilterGuard {
    /// Guard for the given mode.
    #[must_use]
    pub const fn new(mode: FetchMode) -> Self {
        Self { mode }
    }

    /// The mode being enforced.
    #[must_use]
    pub const fn mode(&self) -> FetchMode {
        self.mode
    }

    /// Succeed only when blobs were fetched.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] naming `field` in metadata-only mode.
    pub const fn require_blobs(&self, field: &'static str) -> Result<(), FilterError> {
        if self.mode.has_blobs() {
            Ok(())
        } else {
            Err(FilterError::new(field))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_only_rejects_blob_data() {
        let guard = FilterGuard::new(FetchMode::MetadataOnly);
        let err = guard.require_blobs("diffs").expect_err("filtered");
        assert_eq!(err.field, "diffs");
        assert!(err.to_string().contains("diffs"));
    }

    #[test]
    fn with_blobs_allows_everything() {
        let guard = FilterGuard::new(FetchMode::WithBlobs);
        assert!(guard.require_blobs("file_mods").is_ok());
        assert_eq!(guard.mode(), FetchMode::WithBlobs);
    }
}
