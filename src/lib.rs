//! Device memory management over an accelerator runtime.
//!
//! [`mem::MemoryManager`] is the entry point: allocation policy resolution,
//! synchronous and stream-ordered copies, cache maintenance, peer access and
//! pool queries. The hardware side is reached only through
//! [`rt::DeviceRuntime`]; [`rt::HostRuntime`] implements it in process memory.

pub mod config;
pub mod error;
pub mod mem;
pub mod profiling;
pub mod rt;
pub mod utils;

pub use config::MemConfig;
pub use error::{MemError, MemResult};
pub use mem::{
    DeviceAllocation, HostAllocation, MallocPolicy, MemAttr, MemInfo, MemcpyKind, MemoryManager,
    ResourceStatistics,
};
pub use utils::aligned_size;
