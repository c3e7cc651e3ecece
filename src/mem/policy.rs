use crate::rt::{
    RT_MEMORY_DEFAULT, RT_MEMORY_POLICY_DEFAULT_PAGE_ONLY, RT_MEMORY_POLICY_HUGE_PAGE_FIRST,
    RT_MEMORY_POLICY_HUGE_PAGE_ONLY, RT_MEMORY_POLICY_P2P,
};
use std::fmt;

/// Page-size preference of a device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MallocPolicy {
    /// Huge pages when available, normal pages otherwise.
    #[default]
    HugeFirst,
    HugeOnly,
    NormalOnly,
    HugeFirstP2p,
    HugeOnlyP2p,
    NormalOnlyP2p,
    /// A raw value outside the defined set, kept so it can be resolved explicitly.
    Unrecognized(u32),
}

impl MallocPolicy {
    /// Decodes the flat policy code. Codes past the defined set are kept as
    /// [`MallocPolicy::Unrecognized`].
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::HugeFirst,
            1 => Self::HugeOnly,
            2 => Self::NormalOnly,
            3 => Self::HugeFirstP2p,
            4 => Self::HugeOnlyP2p,
            5 => Self::NormalOnlyP2p,
            other => Self::Unrecognized(other),
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::HugeFirst => 0,
            Self::HugeOnly => 1,
            Self::NormalOnly => 2,
            Self::HugeFirstP2p => 3,
            Self::HugeOnlyP2p => 4,
            Self::NormalOnlyP2p => 5,
            Self::Unrecognized(raw) => raw,
        }
    }

    #[must_use]
    pub const fn is_p2p(self) -> bool {
        matches!(
            self,
            Self::HugeFirstP2p | Self::HugeOnlyP2p | Self::NormalOnlyP2p
        )
    }
}

impl From<u32> for MallocPolicy {
    fn from(raw: u32) -> Self {
        Self::from_raw(raw)
    }
}

impl fmt::Display for MallocPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HugeFirst => write!(f, "HUGE_FIRST"),
            Self::HugeOnly => write!(f, "HUGE_ONLY"),
            Self::NormalOnly => write!(f, "NORMAL_ONLY"),
            Self::HugeFirstP2p => write!(f, "HUGE_FIRST_P2P"),
            Self::HugeOnlyP2p => write!(f, "HUGE_ONLY_P2P"),
            Self::NormalOnlyP2p => write!(f, "NORMAL_ONLY_P2P"),
            Self::Unrecognized(raw) => write!(f, "UNRECOGNIZED({raw})"),
        }
    }
}

/// Runtime flags for a plain device allocation.
///
/// Unrecognized policies fall through to `RT_MEMORY_DEFAULT`; the runtime then
/// picks its own page policy. Callers that decode raw codes should treat that
/// as a probable caller bug rather than a supported request.
#[must_use]
pub const fn resolve_policy_flags(policy: MallocPolicy) -> u32 {
    match policy {
        MallocPolicy::HugeFirst => RT_MEMORY_DEFAULT | RT_MEMORY_POLICY_HUGE_PAGE_FIRST,
        MallocPolicy::HugeOnly => RT_MEMORY_DEFAULT | RT_MEMORY_POLICY_HUGE_PAGE_ONLY,
        MallocPolicy::NormalOnly => RT_MEMORY_DEFAULT | RT_MEMORY_POLICY_DEFAULT_PAGE_ONLY,
        MallocPolicy::HugeFirstP2p => {
            RT_MEMORY_DEFAULT | RT_MEMORY_POLICY_HUGE_PAGE_FIRST | RT_MEMORY_POLICY_P2P
        }
        MallocPolicy::HugeOnlyP2p => {
            RT_MEMORY_DEFAULT | RT_MEMORY_POLICY_HUGE_PAGE_ONLY | RT_MEMORY_POLICY_P2P
        }
        MallocPolicy::NormalOnlyP2p => {
            RT_MEMORY_DEFAULT | RT_MEMORY_POLICY_DEFAULT_PAGE_ONLY | RT_MEMORY_POLICY_P2P
        }
        MallocPolicy::Unrecognized(_) => RT_MEMORY_DEFAULT,
    }
}

/// Runtime flags for a cacheable device allocation.
///
/// Cached memory cannot be shared across the fabric, so only the three
/// non-P2P policies are honoured; anything else resolves to `RT_MEMORY_DEFAULT`.
#[must_use]
pub fn resolve_cached_policy_flags(policy: MallocPolicy) -> u32 {
    match policy {
        MallocPolicy::HugeFirst | MallocPolicy::HugeOnly | MallocPolicy::NormalOnly => {
            resolve_policy_flags(policy)
        }
        MallocPolicy::HugeFirstP2p | MallocPolicy::HugeOnlyP2p | MallocPolicy::NormalOnlyP2p => {
            tracing::warn!(
                "policy {policy} is not supported for cached memory, using the runtime default"
            );
            RT_MEMORY_DEFAULT
        }
        MallocPolicy::Unrecognized(_) => RT_MEMORY_DEFAULT,
    }
}
