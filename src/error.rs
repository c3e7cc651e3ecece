use crate::rt::status::{ErrorCategory, RtStatus, RuntimeFailure, translate};
use std::fmt::Display;
use thiserror::Error;

/// External code reported for every precondition violation.
pub const ERROR_INVALID_PARAM: u32 = 100_000;
/// External code reported when a reserved feature value is used.
pub const ERROR_FEATURE_UNSUPPORTED: u32 = 200_006;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemError {
    #[error("Invalid parameter `{param}` = {value}: {reason}")]
    InvalidParam {
        param: &'static str,
        value: String,
        reason: String,
    },

    #[error("Feature unsupported: {0}")]
    FeatureUnsupported(String),

    #[error("Runtime failure: {0}")]
    Runtime(#[from] RuntimeFailure),
}

impl MemError {
    /// The flat error code a C-style caller would see.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::InvalidParam { .. } => ERROR_INVALID_PARAM,
            Self::FeatureUnsupported(_) => ERROR_FEATURE_UNSUPPORTED,
            Self::Runtime(failure) => failure.code,
        }
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidParam { .. } => ErrorCategory::Param,
            Self::FeatureUnsupported(_) => ErrorCategory::Resource,
            Self::Runtime(failure) => failure.category,
        }
    }

    #[must_use]
    pub const fn is_invalid_param(&self) -> bool {
        matches!(self, Self::InvalidParam { .. })
    }
}

impl From<RtStatus> for MemError {
    fn from(status: RtStatus) -> Self {
        Self::Runtime(translate(status))
    }
}

// A convenient alias
pub type MemResult<T> = Result<T, MemError>;

/// Emits the structured input-error report and builds the matching error.
pub fn report_input_error(
    param: &'static str,
    value: impl Display,
    reason: impl Into<String>,
) -> MemError {
    let value = value.to_string();
    let reason = reason.into();
    tracing::error!(
        target: "devmem::input",
        param,
        value = %value,
        reason = %reason,
        "invalid input parameter"
    );
    MemError::InvalidParam {
        param,
        value,
        reason,
    }
}

/// Rejects a null pointer argument before anything reaches the runtime.
pub(crate) fn require_non_null<T>(param: &'static str, ptr: *const T) -> MemResult<()> {
    if ptr.is_null() {
        return Err(report_input_error(param, "null", "must not be null"));
    }
    Ok(())
}
