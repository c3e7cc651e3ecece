//! The memory layer: validation, size and policy resolution, status translation
//! and accounting in front of a [`DeviceRuntime`](crate::rt::DeviceRuntime).

pub mod cache;
pub mod copy;
pub mod info;
pub mod manager;
pub mod peer;
pub mod policy;
pub mod stats;

use crate::error::MemError;
use crate::rt::{DevicePtr, HostPtr, RtStatus};
use std::fmt;

/// A successful device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAllocation {
    pub ptr: DevicePtr,       // Runtime handle
    pub size: usize,          // Requested size in bytes
    pub aligned_size: usize,  // Size handed to the runtime
    pub policy: MallocPolicy, // Policy as requested, before resolution
    pub cached: bool,         // Allocated through the cacheable path?
}

/// A successful pinned host allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostAllocation {
    pub ptr: HostPtr, // Page-locked when the platform allowed it
    pub size: usize,  // Requested size in bytes, never padded
}

/// Logs a rejected runtime call and converts its status.
pub(crate) fn runtime_failure(status: RtStatus, context: fmt::Arguments<'_>) -> MemError {
    let err = MemError::from(status);
    tracing::error!("{context}, runtime status = {status}, error code = {}", err.code());
    err
}

// Re-export the main manager and the resolvers for easy access
pub use copy::{MemcpyKind, resolve_memcpy_kind};
pub use info::{MemAttr, MemInfo};
pub use manager::MemoryManager;
pub use peer::PEER_ACCESS_RESERVED_FLAGS;
pub use policy::{MallocPolicy, resolve_cached_policy_flags, resolve_policy_flags};
pub use stats::{ResourceStatistics, StatKind, StatsSnapshot};
