use crate::config::MemConfig;
use crate::error::{MemResult, report_input_error, require_non_null};
use crate::mem::policy::{MallocPolicy, resolve_cached_policy_flags, resolve_policy_flags};
use crate::mem::stats::{ResourceStatistics, StatKind};
use crate::mem::{DeviceAllocation, HostAllocation, runtime_failure};
use crate::profiling;
use crate::rt::{DevicePtr, DeviceRuntime, HostPtr};
use crate::utils::aligned_size;
use std::fmt;
use std::sync::Arc;

/// Front door of the memory layer.
///
/// Every public call opens a profiling scope, validates its inputs, makes the
/// matching runtime call and translates the runtime status. The manager keeps
/// no state of its own besides the shared counters, so it can be cloned or
/// shared freely between threads.
#[derive(Clone)]
pub struct MemoryManager {
    pub(crate) runtime: Arc<dyn DeviceRuntime>,
    config: MemConfig,
    stats: Arc<ResourceStatistics>,
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl MemoryManager {
    /// A manager with the default [`MemConfig`] and its own counters.
    pub fn new(runtime: Arc<dyn DeviceRuntime>) -> Self {
        Self {
            runtime,
            config: MemConfig::default(),
            stats: Arc::new(ResourceStatistics::new()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: MemConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares `stats` with this manager instead of its private counters.
    #[must_use]
    pub fn with_statistics(mut self, stats: Arc<ResourceStatistics>) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &MemConfig {
        &self.config
    }

    #[must_use]
    pub const fn statistics(&self) -> &Arc<ResourceStatistics> {
        &self.stats
    }

    // ===========================================================================================
    // Device Memory
    // ===========================================================================================

    /// Allocates `size` bytes of device memory.
    ///
    /// The runtime receives the size padded by [`aligned_size`] and the flags of
    /// [`resolve_policy_flags`].
    ///
    /// # Errors
    /// `InvalidParam` for a zero or overflowing size, `Runtime` when the runtime
    /// rejects the request.
    pub fn malloc(&self, size: usize, policy: MallocPolicy) -> MemResult<DeviceAllocation> {
        let _scope = profiling::scope("malloc");
        self.alloc_device(size, policy, false)
    }

    /// Allocates cacheable device memory. P2P policies are not honoured here.
    ///
    /// # Errors
    /// Same as [`MemoryManager::malloc`].
    pub fn malloc_cached(&self, size: usize, policy: MallocPolicy) -> MemResult<DeviceAllocation> {
        let _scope = profiling::scope("malloc_cached");
        self.alloc_device(size, policy, true)
    }

    fn alloc_device(
        &self,
        size: usize,
        policy: MallocPolicy,
        cached: bool,
    ) -> MemResult<DeviceAllocation> {
        let op = if cached { "malloc_cached" } else { "malloc" };
        self.stats.apply_total(StatKind::MallocFree);
        tracing::info!("start to execute {op}, size = {size}, policy = {policy}");

        if size == 0 {
            return Err(report_input_error("size", size, "must be greater than 0"));
        }

        let aligned = aligned_size(size, self.config.align_size())?;
        let (flags, ret) = if cached {
            let flags = resolve_cached_policy_flags(policy);
            (flags, self.runtime.malloc_cached(aligned, flags))
        } else {
            let flags = resolve_policy_flags(policy);
            (flags, self.runtime.malloc(aligned, flags))
        };

        let ptr = ret.map_err(|status| {
            runtime_failure(
                status,
                format_args!(
                    "{op} failed, size = {size}, aligned size = {aligned}, flags = 0x{flags:x}"
                ),
            )
        })?;

        self.stats.apply_success(StatKind::MallocFree);
        Ok(DeviceAllocation {
            ptr,
            size,
            aligned_size: aligned,
            policy,
            cached,
        })
    }

    /// Returns device memory from [`MemoryManager::malloc`] or
    /// [`MemoryManager::malloc_cached`] to the runtime.
    ///
    /// # Errors
    /// `InvalidParam` for a null pointer, `Runtime` when the runtime does not
    /// recognise it.
    pub fn free(&self, ptr: DevicePtr) -> MemResult<()> {
        let _scope = profiling::scope("free");
        self.stats.release_total(StatKind::MallocFree);
        tracing::info!("start to execute free, ptr = {:p}", ptr.as_raw());

        require_non_null("dev_ptr", ptr.as_raw())?;
        self.runtime.free(ptr).map_err(|status| {
            runtime_failure(
                status,
                format_args!("free device memory failed, ptr = {:p}", ptr.as_raw()),
            )
        })?;

        self.stats.release_success(StatKind::MallocFree);
        Ok(())
    }

    // ===========================================================================================
    // Host Memory
    // ===========================================================================================

    /// Allocates `size` bytes of pinned host memory. The size is not padded.
    ///
    /// # Errors
    /// `InvalidParam` for a zero size, `Runtime` when the runtime rejects it.
    pub fn malloc_host(&self, size: usize) -> MemResult<HostAllocation> {
        let _scope = profiling::scope("malloc_host");
        self.stats.apply_total(StatKind::MallocFreeHost);
        tracing::info!("start to execute malloc_host, size = {size}");

        if size == 0 {
            return Err(report_input_error("size", size, "must be greater than 0"));
        }

        let ptr = self.runtime.malloc_host(size).map_err(|status| {
            runtime_failure(
                status,
                format_args!("malloc host memory failed, size = {size}"),
            )
        })?;

        self.stats.apply_success(StatKind::MallocFreeHost);
        Ok(HostAllocation { ptr, size })
    }

    /// # Errors
    /// `InvalidParam` for a null pointer, `Runtime` when the runtime does not
    /// recognise it.
    pub fn free_host(&self, ptr: HostPtr) -> MemResult<()> {
        let _scope = profiling::scope("free_host");
        self.stats.release_total(StatKind::MallocFreeHost);
        tracing::info!("start to execute free_host, ptr = {:p}", ptr.as_raw());

        require_non_null("host_ptr", ptr.as_raw())?;
        self.runtime.free_host(ptr).map_err(|status| {
            runtime_failure(
                status,
                format_args!("free host memory failed, ptr = {:p}", ptr.as_raw()),
            )
        })?;

        self.stats.release_success(StatKind::MallocFreeHost);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemError;
    use crate::mem::stats::StatsSnapshot;
    use crate::rt::host::{HostRuntime, RtOp};
    use crate::rt::status::RT_ERROR_MEMORY_ALLOCATION;

    fn setup() -> (Arc<HostRuntime>, MemoryManager) {
        let rt = Arc::new(HostRuntime::builder().build().unwrap());
        let mgr = MemoryManager::new(rt.clone());
        (rt, mgr)
    }

    #[test]
    fn malloc_pads_and_frees() {
        let (rt, mgr) = setup();
        let alloc = mgr.malloc(1024, MallocPolicy::default()).unwrap();
        assert!(!alloc.ptr.is_null());
        assert_eq!(alloc.size, 1024);
        assert_eq!(alloc.aligned_size, 1056);
        assert!(!alloc.cached);
        assert_eq!(rt.live_allocations(), 1);

        mgr.free(alloc.ptr).unwrap();
        assert_eq!(rt.live_allocations(), 0);
    }

    #[test]
    fn zero_size_never_reaches_runtime() {
        let (rt, mgr) = setup();
        assert!(mgr.malloc(0, MallocPolicy::HugeOnly).unwrap_err().is_invalid_param());
        assert!(mgr.malloc_cached(0, MallocPolicy::HugeFirst).unwrap_err().is_invalid_param());
        assert!(mgr.malloc_host(0).unwrap_err().is_invalid_param());
        assert_eq!(rt.total_calls(), 0);

        let snap = mgr.statistics().snapshot(StatKind::MallocFree);
        assert_eq!(snap.apply_total, 2);
        assert_eq!(snap.apply_success, 0);
    }

    #[test]
    fn null_free_is_rejected() {
        let (rt, mgr) = setup();
        assert!(mgr.free(DevicePtr::null()).unwrap_err().is_invalid_param());
        assert!(mgr.free_host(HostPtr::null()).unwrap_err().is_invalid_param());
        assert_eq!(rt.call_count(RtOp::Free), 0);
        assert_eq!(rt.call_count(RtOp::FreeHost), 0);

        let snap = mgr.statistics().snapshot(StatKind::MallocFreeHost);
        assert_eq!(snap.release_total, 1);
        assert_eq!(snap.release_success, 0);
    }

    #[test]
    fn runtime_failure_is_translated_and_not_counted() {
        let (rt, mgr) = setup();
        rt.inject_failure(RtOp::Malloc, RT_ERROR_MEMORY_ALLOCATION);

        let err = mgr.malloc(64, MallocPolicy::NormalOnly).unwrap_err();
        assert!(matches!(err, MemError::Runtime(_)));
        assert_eq!(err.code(), 207_001);
        assert_eq!(
            mgr.statistics().snapshot(StatKind::MallocFree),
            StatsSnapshot {
                apply_total: 1,
                apply_success: 0,
                release_total: 0,
                release_success: 0,
            }
        );
    }

    #[test]
    fn host_allocation_is_not_padded() {
        let (_rt, mgr) = setup();
        let alloc = mgr.malloc_host(100).unwrap();
        assert_eq!(alloc.size, 100);
        mgr.free_host(alloc.ptr).unwrap();

        let snap = mgr.statistics().snapshot(StatKind::MallocFreeHost);
        assert_eq!(snap.apply_success, 1);
        assert_eq!(snap.release_success, 1);
        assert_eq!(
            mgr.statistics().snapshot(StatKind::MallocFree),
            StatsSnapshot::default()
        );
    }

    #[test]
    fn custom_granularity_is_used() {
        let (_rt, mgr) = setup();
        let mgr = mgr.with_config(MemConfig::new().with_align_size(4096).unwrap());
        let alloc = mgr.malloc_cached(1, MallocPolicy::HugeFirstP2p).unwrap();
        assert_eq!(alloc.aligned_size, 8192);
        assert!(alloc.cached);
        mgr.free(alloc.ptr).unwrap();
    }

    #[test]
    fn statistics_can_be_shared() {
        let (rt, mgr) = setup();
        let shared = Arc::new(ResourceStatistics::new());
        let a = mgr.with_statistics(shared.clone());
        let b = MemoryManager::new(rt).with_statistics(shared.clone());

        let x = a.malloc(8, MallocPolicy::HugeFirst).unwrap();
        let y = b.malloc(8, MallocPolicy::HugeFirst).unwrap();
        a.free(y.ptr).unwrap();
        b.free(x.ptr).unwrap();

        let snap = shared.snapshot(StatKind::MallocFree);
        assert_eq!(snap.apply_success, 2);
        assert_eq!(snap.release_success, 2);
    }
}
