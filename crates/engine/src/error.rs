use stylebook_core::ids::{StyleId, VariantId};
use stylebook_storage::StorageError;
use thiserror::Error;

/// A local precondition failed. Never retried and never reaches the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("sign in required")]
    NotAuthenticated,

    #[error("style {0} is a system style")]
    SystemStyle(StyleId),

    #[error("style {0} belongs to another user")]
    NotOwner(StyleId),

    #[error("style {0} is public")]
    PublicStyle(StyleId),

    #[error("style {0} is not public")]
    NotPublic(StyleId),

    #[error("style {0} is your own private style; delete it instead")]
    OwnedStyle(StyleId),

    #[error("style {0} is not in the catalog")]
    UnknownStyle(StyleId),

    #[error("style {style} has no variant {variant}")]
    UnknownVariant { style: StyleId, variant: VariantId },

    #[error("style {0} is not hidden")]
    NotHidden(StyleId),

    #[error("style {0} is still being saved")]
    StillSaving(StyleId),

    #[error("invalid style: {0}")]
    InvalidDraft(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{action} failed and was rolled back: {source}")]
    RemoteWrite {
        action: &'static str,
        source: StorageError,
    },

    #[error("catalog read failed: {0}")]
    RemoteRead(#[source] StorageError),

    #[error("style {0} not found after re-fetch")]
    NotFoundDrift(StyleId),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Remote failures are worth retrying; local rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteWrite { .. } | Self::RemoteRead(_))
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }
}
