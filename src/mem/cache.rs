use crate::error::{MemResult, report_input_error, require_non_null};
use crate::mem::manager::MemoryManager;
use crate::mem::runtime_failure;
use crate::profiling;
use crate::rt::DevicePtr;

impl MemoryManager {
    /// Writes back cached lines of `[ptr, ptr + size)` so the device sees host writes.
    ///
    /// # Errors
    /// `InvalidParam` for a null pointer or zero size, `Runtime` otherwise.
    pub fn mem_flush(&self, ptr: DevicePtr, size: usize) -> MemResult<()> {
        let _scope = profiling::scope("mem_flush");
        tracing::info!("start to execute mem_flush, size = {size}");

        check_range(ptr, size)?;
        self.runtime.flush_cache(ptr, size).map_err(|status| {
            runtime_failure(
                status,
                format_args!("flush cache failed, ptr = {:p}, size = {size}", ptr.as_raw()),
            )
        })
    }

    /// Drops cached lines of `[ptr, ptr + size)` so the host sees device writes.
    ///
    /// # Errors
    /// `InvalidParam` for a null pointer or zero size, `Runtime` otherwise.
    pub fn mem_invalidate(&self, ptr: DevicePtr, size: usize) -> MemResult<()> {
        let _scope = profiling::scope("mem_invalidate");
        tracing::info!("start to execute mem_invalidate, size = {size}");

        check_range(ptr, size)?;
        self.runtime.invalidate_cache(ptr, size).map_err(|status| {
            runtime_failure(
                status,
                format_args!(
                    "invalidate cache failed, ptr = {:p}, size = {size}",
                    ptr.as_raw()
                ),
            )
        })
    }
}

fn check_range(ptr: DevicePtr, size: usize) -> MemResult<()> {
    require_non_null("ptr", ptr.as_raw())?;
    if size == 0 {
        return Err(report_input_error("size", size, "must be greater than 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::policy::MallocPolicy;
    use crate::rt::host::{HostRuntime, RtOp};
    use std::sync::Arc;

    #[test]
    fn flush_and_invalidate_are_independent() {
        let rt = Arc::new(HostRuntime::builder().build().unwrap());
        let mgr = MemoryManager::new(rt.clone());
        let alloc = mgr.malloc_cached(512, MallocPolicy::HugeFirst).unwrap();

        mgr.mem_flush(alloc.ptr, 512).unwrap();
        mgr.mem_invalidate(alloc.ptr, 512).unwrap();
        mgr.mem_invalidate(alloc.ptr, 256).unwrap();

        assert_eq!(rt.call_count(RtOp::FlushCache), 1);
        assert_eq!(rt.call_count(RtOp::InvalidateCache), 2);
        mgr.free(alloc.ptr).unwrap();
    }

    #[test]
    fn bad_arguments_never_reach_runtime() {
        let rt = Arc::new(HostRuntime::builder().build().unwrap());
        let mgr = MemoryManager::new(rt.clone());

        assert!(mgr.mem_flush(DevicePtr::null(), 64).unwrap_err().is_invalid_param());
        assert!(mgr.mem_invalidate(DevicePtr::null(), 64).unwrap_err().is_invalid_param());

        let alloc = mgr.malloc(64, MallocPolicy::HugeFirst).unwrap();
        assert!(mgr.mem_flush(alloc.ptr, 0).unwrap_err().is_invalid_param());
        assert_eq!(rt.call_count(RtOp::FlushCache), 0);
        assert_eq!(rt.call_count(RtOp::InvalidateCache), 0);
        mgr.free(alloc.ptr).unwrap();
    }
}
