use std::fmt;
use thiserror::Error;

// ===============================================================================================
// Runtime Status Codes
// ===============================================================================================

/// A raw status reported by the device runtime. Success is `Ok(())`, so there is no "none" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RtStatus(pub u32);

impl fmt::Display for RtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

pub const RT_ERROR_INVALID_VALUE: RtStatus = RtStatus(0x0701_0001);
pub const RT_ERROR_DEVICE_ID: RtStatus = RtStatus(0x0701_0002);
pub const RT_ERROR_CONTEXT_NULL: RtStatus = RtStatus(0x0701_0003);
pub const RT_ERROR_STREAM_CONTEXT: RtStatus = RtStatus(0x0701_0004);
pub const RT_ERROR_FEATURE_NOT_SUPPORT: RtStatus = RtStatus(0x0702_0001);
pub const RT_ERROR_MEMORY_ALLOCATION: RtStatus = RtStatus(0x0702_0002);
pub const RT_ERROR_MEMORY_FREE: RtStatus = RtStatus(0x0702_0003);
pub const RT_ERROR_INTERNAL: RtStatus = RtStatus(0x0705_0001);
pub const RT_ERROR_DRV: RtStatus = RtStatus(0x0705_0002);

// ===============================================================================================
// External Error Codes
// ===============================================================================================

pub const ERROR_RT_PARAM_INVALID: u32 = 107_000;
pub const ERROR_RT_INVALID_DEVICEID: u32 = 107_001;
pub const ERROR_RT_CONTEXT_NULL: u32 = 107_002;
pub const ERROR_RT_STREAM_CONTEXT: u32 = 107_003;
pub const ERROR_RT_FEATURE_NOT_SUPPORT: u32 = 207_000;
pub const ERROR_RT_MEMORY_ALLOCATION: u32 = 207_001;
pub const ERROR_RT_MEMORY_FREE: u32 = 207_002;
pub const ERROR_RT_INTERNAL_ERROR: u32 = 507_000;
pub const ERROR_RT_DRV_INTERNAL_ERROR: u32 = 507_899;

/// Runtime status -> external code. Anything missing is a driver-internal error.
const STATUS_TABLE: &[(RtStatus, u32)] = &[
    (RT_ERROR_INVALID_VALUE, ERROR_RT_PARAM_INVALID),
    (RT_ERROR_DEVICE_ID, ERROR_RT_INVALID_DEVICEID),
    (RT_ERROR_CONTEXT_NULL, ERROR_RT_CONTEXT_NULL),
    (RT_ERROR_STREAM_CONTEXT, ERROR_RT_STREAM_CONTEXT),
    (RT_ERROR_FEATURE_NOT_SUPPORT, ERROR_RT_FEATURE_NOT_SUPPORT),
    (RT_ERROR_MEMORY_ALLOCATION, ERROR_RT_MEMORY_ALLOCATION),
    (RT_ERROR_MEMORY_FREE, ERROR_RT_MEMORY_FREE),
    (RT_ERROR_INTERNAL, ERROR_RT_INTERNAL_ERROR),
    (RT_ERROR_DRV, ERROR_RT_DRV_INTERNAL_ERROR),
];

/// Coarse classification carried by the leading digit of an external code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Param,
    Resource,
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code / 100_000 {
            1 => Self::Param,
            2 => Self::Resource,
            _ => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Param => "parameter",
            Self::Resource => "resource",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A runtime status after translation into the external taxonomy.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("runtime result {status}, error code {code} ({category})")]
pub struct RuntimeFailure {
    pub status: RtStatus,
    pub code: u32,
    pub category: ErrorCategory,
}

/// Translates a runtime status into its external code and category.
#[must_use]
pub fn translate(status: RtStatus) -> RuntimeFailure {
    let code = STATUS_TABLE
        .iter()
        .find(|(known, _)| *known == status)
        .map_or(ERROR_RT_DRV_INTERNAL_ERROR, |&(_, code)| code);

    RuntimeFailure {
        status,
        code,
        category: ErrorCategory::from_code(code),
    }
}
