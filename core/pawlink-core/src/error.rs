//! Error types for pawlink-core operations.
//! Location and scan-log failures are deliberately NOT represented here;
//! those paths degrade to `None`/logged warnings instead of erroring.

/// All errors that can occur in pawlink-core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The scanned code does not exist in the tag registry. Terminal for
    /// this attempt; the user has to re-scan.
    #[error("Unknown tag code: {0}")]
    InvalidCode(String),

    /// PIN did not match the tag secret. Recoverable, re-prompt.
    #[error("Incorrect PIN for tag {code}")]
    InvalidPin { code: String },

    /// Re-proof of the login PIN failed (lost-mode deactivation).
    #[error("Owner re-authentication failed for {code}")]
    AuthFailed { code: String },

    /// Lost another client's race on the claim compare-and-set.
    /// Recoverable: re-enter as a returning owner.
    #[error("Tag {0} was claimed by a concurrent client")]
    AlreadyClaimed(String),

    /// Lost-mode activation submitted without the consent acknowledgement.
    #[error("Lost mode activation requires consent acknowledgement")]
    ConsentRequired,

    /// A backing store rejected or failed an operation. Transient;
    /// surfaced to the caller as retryable.
    #[error("Store unavailable: {context}: {details}")]
    StoreUnavailable { context: String, details: String },
}

impl CoreError {
    pub fn store(context: impl Into<String>, details: impl std::fmt::Display) -> Self {
        CoreError::StoreUnavailable {
            context: context.into(),
            details: details.to_string(),
        }
    }

    /// Stable machine-readable code, used by service layers to map onto
    /// wire error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidCode(_) => "invalid_code",
            CoreError::InvalidPin { .. } => "invalid_pin",
            CoreError::AuthFailed { .. } => "auth_failed",
            CoreError::AlreadyClaimed(_) => "already_claimed",
            CoreError::ConsentRequired => "consent_required",
            CoreError::StoreUnavailable { .. } => "store_unavailable",
        }
    }
}

/// Convenience type alias for Results using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(CoreError::InvalidCode("X".into()).code(), "invalid_code");
        assert_eq!(
            CoreError::AlreadyClaimed("X".into()).code(),
            "already_claimed"
        );
        assert_eq!(CoreError::ConsentRequired.code(), "consent_required");
        assert_eq!(
            CoreError::store("tags.get", "disk on fire").code(),
            "store_unavailable"
        );
    }

    #[test]
    fn test_store_error_keeps_context() {
        let err = CoreError::store("scan_log.append", "database is locked");
        assert_eq!(
            err.to_string(),
            "Store unavailable: scan_log.append: database is locked"
        );
    }
}
