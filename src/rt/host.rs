#![allow(clippy::cast_possible_truncation)]

use super::status::{
    RT_ERROR_DEVICE_ID, RT_ERROR_FEATURE_NOT_SUPPORT, RT_ERROR_INVALID_VALUE,
    RT_ERROR_MEMORY_ALLOCATION, RT_ERROR_MEMORY_FREE, RT_ERROR_STREAM_CONTEXT, RtStatus,
};
use super::topology::{LinkType, Topology};
use super::{
    DevicePtr, DeviceRuntime, HostPtr, RT_MEMORY_PAGE_POLICY_MASK, RT_MEMORY_POLICY_DEFAULT_PAGE_ONLY,
    RT_MEMORY_POLICY_HUGE_PAGE_ONLY, RT_MEMORY_POLICY_P2P, RtMemInfoType, RtMemcpyKind, RtResult,
    StreamHandle,
};
use crate::utils::checked_align_up;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};
use std::sync::{Mutex, MutexGuard, PoisonError};

const NORMAL_PAGE_SIZE: usize = 4096;
const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;
/// Huge-first requests at or below this size are served from normal pages.
const HUGE_FIRST_MIN_SIZE: usize = 1024 * 1024;

const DEFAULT_POOL_CAPACITY: usize = 1 << 30;
const DEFAULT_P2P_POOL_CAPACITY: usize = 256 << 20;

// ===============================================================================================
// Pools
// ===============================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemLocation {
    /// Host-side DRAM.
    Ddr,
    /// On-package device memory.
    Hbm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Huge,
    Normal,
}

impl PageKind {
    #[must_use]
    pub const fn page_size(self) -> usize {
        match self {
            Self::Huge => HUGE_PAGE_SIZE,
            Self::Normal => NORMAL_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub location: MemLocation,
    pub page: PageKind,
    pub p2p: bool,
}

impl PoolKey {
    const ALL: [Self; 8] = {
        use MemLocation::{Ddr, Hbm};
        use PageKind::{Huge, Normal};
        [
            Self::new(Ddr, Huge, false),
            Self::new(Ddr, Normal, false),
            Self::new(Ddr, Huge, true),
            Self::new(Ddr, Normal, true),
            Self::new(Hbm, Huge, false),
            Self::new(Hbm, Normal, false),
            Self::new(Hbm, Huge, true),
            Self::new(Hbm, Normal, true),
        ]
    };

    #[must_use]
    pub const fn new(location: MemLocation, page: PageKind, p2p: bool) -> Self {
        Self {
            location,
            page,
            p2p,
        }
    }

    /// Which pools a memory-info query aggregates over.
    const fn matches(self, info_type: RtMemInfoType) -> bool {
        use MemLocation::{Ddr, Hbm};
        use PageKind::{Huge, Normal};
        let (location, page, p2p) = match info_type {
            RtMemInfoType::Ddr => (Ddr, None, None),
            RtMemInfoType::Hbm => (Hbm, None, None),
            RtMemInfoType::DdrHuge => (Ddr, Some(Huge), Some(false)),
            RtMemInfoType::DdrNormal => (Ddr, Some(Normal), Some(false)),
            RtMemInfoType::HbmHuge => (Hbm, Some(Huge), Some(false)),
            RtMemInfoType::HbmNormal => (Hbm, Some(Normal), Some(false)),
            RtMemInfoType::DdrP2pHuge => (Ddr, Some(Huge), Some(true)),
            RtMemInfoType::DdrP2pNormal => (Ddr, Some(Normal), Some(true)),
            RtMemInfoType::HbmP2pHuge => (Hbm, Some(Huge), Some(true)),
            RtMemInfoType::HbmP2pNormal => (Hbm, Some(Normal), Some(true)),
        };
        let page_ok = match page {
            Some(Huge) => matches!(self.page, Huge),
            Some(Normal) => matches!(self.page, Normal),
            None => true,
        };
        let p2p_ok = match p2p {
            Some(flag) => self.p2p == flag,
            None => true,
        };
        matches!(
            (location, self.location),
            (Ddr, Ddr) | (Hbm, Hbm)
        ) && page_ok
            && p2p_ok
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Pool {
    total: usize,
    used: usize,
}

// ===============================================================================================
// Bookkeeping
// ===============================================================================================

/// Every runtime entry point, for call accounting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtOp {
    Malloc,
    MallocCached,
    Free,
    MallocHost,
    FreeHost,
    Memcpy,
    MemcpyAsync,
    Memset,
    MemsetAsync,
    FlushCache,
    InvalidateCache,
    GetDevice,
    GetDevicePhyId,
    CanAccessPeer,
    EnableP2p,
    DisableP2p,
    MemGetInfo,
}

impl RtOp {
    const COUNT: usize = 17;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionKind {
    Device { cached: bool },
    Host { locked: bool },
}

#[derive(Debug, Clone, Copy)]
struct Region {
    len: usize,
    charged: usize,
    pool: PoolKey,
    kind: RegionKind,
}

impl Region {
    const fn is_device(&self) -> bool {
        matches!(self.kind, RegionKind::Device { .. })
    }
}

#[derive(Debug)]
enum PendingOp {
    Copy { dst: usize, src: usize, count: usize },
    Fill { dst: usize, value: u8, count: usize },
}

impl PendingOp {
    /// # Safety
    /// The addresses recorded at enqueue time must still be valid.
    unsafe fn execute(&self) {
        match *self {
            Self::Copy { dst, src, count } => unsafe {
                ptr::copy(src as *const u8, dst as *mut u8, count);
            },
            Self::Fill { dst, value, count } => unsafe {
                ptr::write_bytes(dst as *mut u8, value, count);
            },
        }
    }

    /// Whether this operation reads or writes any byte of `[start, start + len)`.
    const fn touches(&self, start: usize, len: usize) -> bool {
        const fn overlaps(addr: usize, count: usize, start: usize, len: usize) -> bool {
            count != 0 && addr < start.saturating_add(len) && start < addr.saturating_add(count)
        }
        match *self {
            Self::Copy { dst, src, count } => {
                overlaps(dst, count, start, len) || overlaps(src, count, start, len)
            }
            Self::Fill { dst, count, .. } => overlaps(dst, count, start, len),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Finds the tracked region holding `[addr, addr + len)`.
///
/// `Ok(None)` means the address is untracked; `Err` means it starts inside a
/// region but runs past its end.
fn region_for(
    regions: &BTreeMap<usize, Region>,
    addr: usize,
    len: usize,
) -> RtResult<Option<Region>> {
    let Some((&start, region)) = regions.range(..=addr).next_back() else {
        return Ok(None);
    };
    if addr >= start + region.len {
        return Ok(None);
    }
    let end = addr.checked_add(len).ok_or(RT_ERROR_INVALID_VALUE)?;
    if end > start + region.len {
        return Err(RT_ERROR_INVALID_VALUE);
    }
    Ok(Some(*region))
}

fn check_range(
    regions: &BTreeMap<usize, Region>,
    addr: usize,
    len: usize,
    must_be_device: bool,
) -> RtResult<()> {
    match region_for(regions, addr, len)? {
        Some(region) if must_be_device && !region.is_device() => Err(RT_ERROR_INVALID_VALUE),
        Some(_) => Ok(()),
        None if must_be_device => Err(RT_ERROR_INVALID_VALUE),
        None => Ok(()),
    }
}

fn map_anonymous(len: usize) -> RtResult<*mut c_void> {
    let ret = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ret == libc::MAP_FAILED {
        tracing::debug!(
            "mmap of {len} bytes failed: {}",
            std::io::Error::last_os_error()
        );
        return Err(RT_ERROR_MEMORY_ALLOCATION);
    }
    Ok(ret)
}

// ===============================================================================================
// Host Runtime
// ===============================================================================================

/// A [`DeviceRuntime`] that emulates a multi-device accelerator in process memory.
///
/// Device and pinned host memory are anonymous mappings; pool capacities are
/// pure accounting and back [`DeviceRuntime::mem_get_info_ex`]. Streams are
/// FIFO queues drained by [`HostRuntime::synchronize_stream`].
#[derive(Debug)]
pub struct HostRuntime {
    topology: Topology,
    current_device: AtomicU32,

    // Live allocations: start address -> region
    regions: Mutex<BTreeMap<usize, Region>>,
    pools: Mutex<HashMap<PoolKey, Pool>>,

    streams: Mutex<HashMap<u64, VecDeque<PendingOp>>>,
    next_stream: AtomicU64,

    // (logical device, peer physical id)
    p2p_enabled: Mutex<HashSet<(u32, u32)>>,

    calls: [AtomicU64; RtOp::COUNT],
    injected: Mutex<HashMap<RtOp, RtStatus>>,
}

impl HostRuntime {
    #[must_use]
    pub fn builder() -> HostRuntimeBuilder {
        HostRuntimeBuilder::default()
    }

    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Binds `device_id` as the current device.
    pub fn set_device(&self, device_id: u32) -> RtResult<()> {
        if self.topology.phy_id(device_id).is_none() {
            return Err(RT_ERROR_DEVICE_ID);
        }
        self.current_device.store(device_id, Ordering::Release);
        Ok(())
    }

    /// Number of times `op` was invoked, including rejected calls.
    #[must_use]
    pub fn call_count(&self, op: RtOp) -> u64 {
        self.calls[op as usize].load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.calls.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Makes the next call to `op` fail with `status`.
    pub fn inject_failure(&self, op: RtOp, status: RtStatus) {
        lock(&self.injected).insert(op, status);
    }

    #[must_use]
    pub fn is_p2p_enabled(&self, device_id: u32, peer_phy_id: u32) -> bool {
        lock(&self.p2p_enabled).contains(&(device_id, peer_phy_id))
    }

    #[must_use]
    pub fn live_allocations(&self) -> usize {
        lock(&self.regions).len()
    }

    pub fn create_stream(&self) -> StreamHandle {
        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        lock(&self.streams).insert(id, VecDeque::new());
        tracing::trace!("created stream {id}");
        StreamHandle(id)
    }

    /// Runs every operation queued on `stream`, in submission order.
    pub fn synchronize_stream(&self, stream: StreamHandle) -> RtResult<()> {
        // Held while executing so concurrent synchronizers cannot reorder work.
        let mut streams = lock(&self.streams);
        let queue = streams.get_mut(&stream.0).ok_or(RT_ERROR_STREAM_CONTEXT)?;
        let drained = queue.len();
        while let Some(op) = queue.pop_front() {
            unsafe { op.execute() };
        }
        tracing::trace!("stream {} synchronized, {drained} operations", stream.0);
        Ok(())
    }

    /// Drains and removes a stream. The default stream cannot be destroyed.
    pub fn destroy_stream(&self, stream: StreamHandle) -> RtResult<()> {
        if stream == StreamHandle::DEFAULT {
            return Err(RT_ERROR_INVALID_VALUE);
        }
        self.synchronize_stream(stream)?;
        lock(&self.streams).remove(&stream.0);
        Ok(())
    }

    pub fn pending_ops(&self, stream: StreamHandle) -> RtResult<usize> {
        lock(&self.streams)
            .get(&stream.0)
            .map(VecDeque::len)
            .ok_or(RT_ERROR_STREAM_CONTEXT)
    }

    fn enter(&self, op: RtOp) -> RtResult<()> {
        self.calls[op as usize].fetch_add(1, Ordering::Relaxed);
        if let Some(status) = lock(&self.injected).remove(&op) {
            tracing::debug!("injected failure for {op:?}: {status}");
            return Err(status);
        }
        Ok(())
    }

    fn reserve(&self, location: MemLocation, flags: u32, size: usize) -> RtResult<(PoolKey, usize)> {
        let p2p = flags & RT_MEMORY_POLICY_P2P != 0;
        let candidates: &[PageKind] = match flags & RT_MEMORY_PAGE_POLICY_MASK {
            RT_MEMORY_POLICY_HUGE_PAGE_ONLY => &[PageKind::Huge],
            RT_MEMORY_POLICY_DEFAULT_PAGE_ONLY => &[PageKind::Normal],
            _ if size <= HUGE_FIRST_MIN_SIZE => &[PageKind::Normal],
            _ => &[PageKind::Huge, PageKind::Normal],
        };

        let mut pools = lock(&self.pools);
        for &page in candidates {
            let key = PoolKey::new(location, page, p2p);
            let Some(charge) = checked_align_up(size, page.page_size()) else {
                continue;
            };
            let pool = pools.entry(key).or_default();
            if pool.total - pool.used >= charge {
                pool.used += charge;
                return Ok((key, charge));
            }
        }
        tracing::debug!("no pool can hold {size} bytes, location = {location:?}, flags = 0x{flags:x}");
        Err(RT_ERROR_MEMORY_ALLOCATION)
    }

    fn unreserve(&self, key: PoolKey, charge: usize) {
        if let Some(pool) = lock(&self.pools).get_mut(&key) {
            pool.used = pool.used.saturating_sub(charge);
        }
    }

    fn alloc_region(
        &self,
        location: MemLocation,
        flags: u32,
        size: usize,
        kind: RegionKind,
    ) -> RtResult<(*mut c_void, Region)> {
        if size == 0 {
            return Err(RT_ERROR_INVALID_VALUE);
        }
        let (pool, charged) = self.reserve(location, flags, size)?;
        let ptr = match map_anonymous(size) {
            Ok(ptr) => ptr,
            Err(e) => {
                self.unreserve(pool, charged);
                return Err(e);
            }
        };

        let mut region = Region {
            len: size,
            charged,
            pool,
            kind,
        };

        if pool.page == PageKind::Huge {
            // Advisory only; transparent huge pages may be disabled.
            let ret = unsafe { libc::madvise(ptr, size, libc::MADV_HUGEPAGE) };
            if ret != 0 {
                tracing::trace!("madvise(MADV_HUGEPAGE) ignored for {size} bytes");
            }
        }

        if let RegionKind::Host { .. } = kind {
            let locked = unsafe { libc::mlock(ptr, size) } == 0;
            if !locked {
                tracing::debug!(
                    "mlock of {size} bytes failed, host memory stays pageable: {}",
                    std::io::Error::last_os_error()
                );
            }
            region.kind = RegionKind::Host { locked };
        }

        lock(&self.regions).insert(ptr as usize, region);
        tracing::trace!("mapped {size} bytes at {ptr:p} from {pool:?}");
        Ok((ptr, region))
    }

    /// Unmaps a region after running every queued operation that touches it.
    ///
    /// The stream lock is held until the mapping is gone, so no submission can
    /// slip in between the drain and the unmap.
    fn free_region(&self, addr: usize, device: bool) -> RtResult<()> {
        let mut streams = lock(&self.streams);
        let region = {
            let regions = lock(&self.regions);
            match regions.get(&addr) {
                Some(r) if r.is_device() == device => *r,
                _ => return Err(RT_ERROR_MEMORY_FREE),
            }
        };

        // Each stream runs in order up to its last operation on the region.
        for (id, queue) in streams.iter_mut() {
            let Some(last) = queue.iter().rposition(|op| op.touches(addr, region.len)) else {
                continue;
            };
            tracing::debug!(
                "free of 0x{addr:x} waits for {} operations on stream {id}",
                last + 1
            );
            for op in queue.drain(..=last) {
                unsafe { op.execute() };
            }
        }

        lock(&self.regions).remove(&addr);

        match region.kind {
            // Write back before the mapping disappears.
            RegionKind::Device { cached: true } => fence(Ordering::Release),
            RegionKind::Host { locked: true } => unsafe {
                libc::munlock(addr as *const c_void, region.len);
            },
            _ => {}
        }

        let ret = unsafe { libc::munmap(addr as *mut c_void, region.len) };
        if ret != 0 {
            tracing::error!(
                "munmap of 0x{addr:x} failed: {}",
                std::io::Error::last_os_error()
            );
        }
        drop(streams);
        self.unreserve(region.pool, region.charged);
        Ok(())
    }

    fn check_copy(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        src: *const c_void,
        count: usize,
        kind: RtMemcpyKind,
    ) -> RtResult<()> {
        if dst.is_null() || src.is_null() || count > dst_max {
            return Err(RT_ERROR_INVALID_VALUE);
        }
        let regions = lock(&self.regions);
        check_range(&regions, dst as usize, count, kind.dst_on_device())?;
        check_range(&regions, src as usize, count, kind.src_on_device())
    }

    fn check_fill(&self, dst: *mut c_void, dst_max: usize, count: usize) -> RtResult<()> {
        if dst.is_null() || count > dst_max {
            return Err(RT_ERROR_INVALID_VALUE);
        }
        check_range(&lock(&self.regions), dst as usize, count, false)
    }

    /// Validates and queues `op` under the stream lock, so a concurrent free
    /// either drains it or is seen by `check` as already gone.
    fn submit(
        &self,
        stream: StreamHandle,
        check: impl FnOnce() -> RtResult<()>,
        op: PendingOp,
    ) -> RtResult<()> {
        let mut streams = lock(&self.streams);
        let queue = streams.get_mut(&stream.0).ok_or(RT_ERROR_STREAM_CONTEXT)?;
        check()?;
        queue.push_back(op);
        Ok(())
    }

    fn check_cache_range(&self, ptr: DevicePtr, size: usize) -> RtResult<()> {
        if ptr.is_null() || size == 0 {
            return Err(RT_ERROR_INVALID_VALUE);
        }
        match region_for(&lock(&self.regions), ptr.addr(), size)? {
            Some(_) => Ok(()),
            None => Err(RT_ERROR_INVALID_VALUE),
        }
    }

    fn device_phy_id(&self, device_id: u32) -> RtResult<u32> {
        self.topology.phy_id(device_id).ok_or(RT_ERROR_DEVICE_ID)
    }

    fn peer_phy_checked(&self, peer_phy_id: u32) -> RtResult<u32> {
        if self.topology.contains_phy(peer_phy_id) {
            Ok(peer_phy_id)
        } else {
            Err(RT_ERROR_DEVICE_ID)
        }
    }
}

impl Drop for HostRuntime {
    fn drop(&mut self) {
        let regions = std::mem::take(
            self.regions
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if !regions.is_empty() {
            tracing::debug!("releasing {} allocations leaked by callers", regions.len());
        }
        for (addr, region) in regions {
            unsafe {
                libc::munmap(addr as *mut c_void, region.len);
            }
        }
    }
}

impl DeviceRuntime for HostRuntime {
    fn malloc(&self, size: usize, flags: u32) -> RtResult<DevicePtr> {
        self.enter(RtOp::Malloc)?;
        let (ptr, _) = self.alloc_region(
            MemLocation::Hbm,
            flags,
            size,
            RegionKind::Device { cached: false },
        )?;
        Ok(DevicePtr::from_raw(ptr))
    }

    fn malloc_cached(&self, size: usize, flags: u32) -> RtResult<DevicePtr> {
        self.enter(RtOp::MallocCached)?;
        let (ptr, _) = self.alloc_region(
            MemLocation::Hbm,
            flags,
            size,
            RegionKind::Device { cached: true },
        )?;
        Ok(DevicePtr::from_raw(ptr))
    }

    fn free(&self, ptr: DevicePtr) -> RtResult<()> {
        self.enter(RtOp::Free)?;
        self.free_region(ptr.addr(), true)
    }

    fn malloc_host(&self, size: usize) -> RtResult<HostPtr> {
        self.enter(RtOp::MallocHost)?;
        let (ptr, _) = self.alloc_region(
            MemLocation::Ddr,
            RT_MEMORY_POLICY_DEFAULT_PAGE_ONLY,
            size,
            RegionKind::Host { locked: false },
        )?;
        Ok(HostPtr::from_raw(ptr))
    }

    fn free_host(&self, ptr: HostPtr) -> RtResult<()> {
        self.enter(RtOp::FreeHost)?;
        self.free_region(ptr.addr(), false)
    }

    unsafe fn memcpy(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        src: *const c_void,
        count: usize,
        kind: RtMemcpyKind,
    ) -> RtResult<()> {
        self.enter(RtOp::Memcpy)?;
        self.check_copy(dst, dst_max, src, count, kind)?;
        unsafe { ptr::copy(src.cast::<u8>(), dst.cast::<u8>(), count) };
        Ok(())
    }

    unsafe fn memcpy_async(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        src: *const c_void,
        count: usize,
        kind: RtMemcpyKind,
        stream: StreamHandle,
    ) -> RtResult<()> {
        self.enter(RtOp::MemcpyAsync)?;
        self.submit(
            stream,
            || self.check_copy(dst, dst_max, src, count, kind),
            PendingOp::Copy {
                dst: dst as usize,
                src: src as usize,
                count,
            },
        )
    }

    unsafe fn memset(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        value: i32,
        count: usize,
    ) -> RtResult<()> {
        self.enter(RtOp::Memset)?;
        self.check_fill(dst, dst_max, count)?;
        unsafe { ptr::write_bytes(dst.cast::<u8>(), value as u8, count) };
        Ok(())
    }

    unsafe fn memset_async(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        value: i32,
        count: usize,
        stream: StreamHandle,
    ) -> RtResult<()> {
        self.enter(RtOp::MemsetAsync)?;
        self.submit(
            stream,
            || self.check_fill(dst, dst_max, count),
            PendingOp::Fill {
                dst: dst as usize,
                value: value as u8,
                count,
            },
        )
    }

    fn flush_cache(&self, ptr: DevicePtr, size: usize) -> RtResult<()> {
        self.enter(RtOp::FlushCache)?;
        self.check_cache_range(ptr, size)?;
        // Publish every write made before the flush.
        fence(Ordering::Release);
        Ok(())
    }

    fn invalidate_cache(&self, ptr: DevicePtr, size: usize) -> RtResult<()> {
        self.enter(RtOp::InvalidateCache)?;
        self.check_cache_range(ptr, size)?;
        fence(Ordering::Acquire);
        Ok(())
    }

    fn get_device(&self) -> RtResult<u32> {
        self.enter(RtOp::GetDevice)?;
        Ok(self.current_device.load(Ordering::Acquire))
    }

    fn get_device_phy_id_by_index(&self, device_id: u32) -> RtResult<u32> {
        self.enter(RtOp::GetDevicePhyId)?;
        self.device_phy_id(device_id)
    }

    fn device_can_access_peer(&self, device_id: u32, peer_phy_id: u32) -> RtResult<bool> {
        self.enter(RtOp::CanAccessPeer)?;
        let phy_id = self.device_phy_id(device_id)?;
        let peer_phy_id = self.peer_phy_checked(peer_phy_id)?;
        Ok(self.topology.is_linked(phy_id, peer_phy_id))
    }

    fn enable_p2p(&self, device_id: u32, peer_phy_id: u32, flags: u32) -> RtResult<()> {
        self.enter(RtOp::EnableP2p)?;
        if flags != 0 {
            return Err(RT_ERROR_INVALID_VALUE);
        }
        let phy_id = self.device_phy_id(device_id)?;
        let peer_phy_id = self.peer_phy_checked(peer_phy_id)?;
        if !self.topology.is_linked(phy_id, peer_phy_id) {
            return Err(RT_ERROR_FEATURE_NOT_SUPPORT);
        }
        lock(&self.p2p_enabled).insert((device_id, peer_phy_id));
        tracing::debug!("p2p enabled, device = {device_id}, peer phy id = {peer_phy_id}");
        Ok(())
    }

    fn disable_p2p(&self, device_id: u32, peer_phy_id: u32) -> RtResult<()> {
        self.enter(RtOp::DisableP2p)?;
        self.device_phy_id(device_id)?;
        let peer_phy_id = self.peer_phy_checked(peer_phy_id)?;
        if lock(&self.p2p_enabled).remove(&(device_id, peer_phy_id)) {
            tracing::debug!("p2p disabled, device = {device_id}, peer phy id = {peer_phy_id}");
        }
        Ok(())
    }

    fn mem_get_info_ex(&self, info_type: RtMemInfoType) -> RtResult<(usize, usize)> {
        self.enter(RtOp::MemGetInfo)?;
        let pools = lock(&self.pools);
        Ok(pools
            .iter()
            .filter(|(key, _)| key.matches(info_type))
            .fold((0usize, 0usize), |(free, total), (_, pool)| {
                (
                    free.saturating_add(pool.total - pool.used),
                    total.saturating_add(pool.total),
                )
            }))
    }
}

// ===============================================================================================
// Builder
// ===============================================================================================

#[derive(Debug, Clone)]
pub struct HostRuntimeBuilder {
    phy_ids: Vec<u32>,
    links: Vec<(u32, u32, LinkType)>, // logical ids
    current_device: u32,
    capacities: HashMap<PoolKey, usize>,
}

impl Default for HostRuntimeBuilder {
    fn default() -> Self {
        let capacities = PoolKey::ALL
            .iter()
            .map(|&key| {
                let bytes = if key.p2p {
                    DEFAULT_P2P_POOL_CAPACITY
                } else {
                    DEFAULT_POOL_CAPACITY
                };
                (key, bytes)
            })
            .collect();

        Self {
            phy_ids: vec![0],
            links: Vec::new(),
            current_device: 0,
            capacities,
        }
    }
}

impl HostRuntimeBuilder {
    /// `count` devices whose physical ids equal their logical ids.
    #[must_use]
    pub fn device_count(mut self, count: u32) -> Self {
        self.phy_ids = (0..count).collect();
        self
    }

    /// One device per entry; logical id `i` maps to `ids[i]`.
    #[must_use]
    pub fn physical_ids(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.phy_ids = ids.into_iter().collect();
        self
    }

    /// Wires two logical devices together.
    #[must_use]
    pub fn link(mut self, a: u32, b: u32, link_type: LinkType) -> Self {
        self.links.push((a, b, link_type));
        self
    }

    #[must_use]
    pub const fn current_device(mut self, device_id: u32) -> Self {
        self.current_device = device_id;
        self
    }

    #[must_use]
    pub fn pool_capacity(
        mut self,
        location: MemLocation,
        page: PageKind,
        p2p: bool,
        bytes: usize,
    ) -> Self {
        self.capacities
            .insert(PoolKey::new(location, page, p2p), bytes);
        self
    }

    /// # Errors
    /// `RT_ERROR_INVALID_VALUE` for an empty or duplicated id list, and
    /// `RT_ERROR_DEVICE_ID` when a link or the current device is out of range.
    pub fn build(self) -> RtResult<HostRuntime> {
        let unique: HashSet<u32> = self.phy_ids.iter().copied().collect();
        if self.phy_ids.is_empty() || unique.len() != self.phy_ids.len() {
            return Err(RT_ERROR_INVALID_VALUE);
        }

        let mut topology = Topology::new(self.phy_ids);
        for (a, b, link_type) in self.links {
            let phy_a = topology.phy_id(a).ok_or(RT_ERROR_DEVICE_ID)?;
            let phy_b = topology.phy_id(b).ok_or(RT_ERROR_DEVICE_ID)?;
            topology.add_link(phy_a, phy_b, link_type);
        }
        if topology.phy_id(self.current_device).is_none() {
            return Err(RT_ERROR_DEVICE_ID);
        }

        let pools = self
            .capacities
            .into_iter()
            .map(|(key, total)| (key, Pool { total, used: 0 }))
            .collect();

        let mut streams = HashMap::new();
        streams.insert(StreamHandle::DEFAULT.0, VecDeque::new());

        Ok(HostRuntime {
            topology,
            current_device: AtomicU32::new(self.current_device),
            regions: Mutex::new(BTreeMap::new()),
            pools: Mutex::new(pools),
            streams: Mutex::new(streams),
            next_stream: AtomicU64::new(1),
            p2p_enabled: Mutex::new(HashSet::new()),
            calls: std::array::from_fn(|_| AtomicU64::new(0)),
            injected: Mutex::new(HashMap::new()),
        })
    }
}
