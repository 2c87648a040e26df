use thiserror::Error;

/// Raised when a caller reads data that the session's fetch mode excluded.
///
/// The record never substitutes an empty or zero value for data it did not
/// fetch; it names the missing field instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{field}` is unavailable because the session was acquired without blobs")]
pub struct FilterError {
    /// Name of the field or record kind that was requested.
    pub field: &'static str,
}

impl FilterError {
    /// Construct an error naming the unavailable field.
    #[must_use]
    pub const fn new(field: &'static str) -> Self {
        Self { field }
    }
}
