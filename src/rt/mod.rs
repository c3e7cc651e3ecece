//! The device runtime boundary.
//!
//! Everything that actually touches memory, streams or the interconnect lives
//! behind [`DeviceRuntime`]. The memory layer in [`crate::mem`] validates and
//! resolves its inputs, then makes exactly one runtime call per step.

pub mod host;
pub mod status;
pub mod topology;

pub use host::HostRuntime;
pub use status::{ErrorCategory, RtStatus, RuntimeFailure, translate};

use std::ffi::c_void;
use std::ptr;

pub type RtResult<T> = Result<T, RtStatus>;

// ===============================================================================================
// Allocation Flags
// ===============================================================================================

pub const RT_MEMORY_DEFAULT: u32 = 0x0;
pub const RT_MEMORY_POLICY_HUGE_PAGE_FIRST: u32 = 0x400;
pub const RT_MEMORY_POLICY_HUGE_PAGE_ONLY: u32 = 0x800;
pub const RT_MEMORY_POLICY_DEFAULT_PAGE_ONLY: u32 = 0x1000;
/// Memory may be shared with peer devices across the topology.
pub const RT_MEMORY_POLICY_P2P: u32 = 0x2000;

pub const RT_MEMORY_PAGE_POLICY_MASK: u32 = RT_MEMORY_POLICY_HUGE_PAGE_FIRST
    | RT_MEMORY_POLICY_HUGE_PAGE_ONLY
    | RT_MEMORY_POLICY_DEFAULT_PAGE_ONLY;

// ===============================================================================================
// Runtime Enumerations
// ===============================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RtMemcpyKind {
    HostToHost = 0,
    HostToDevice = 1,
    DeviceToHost = 2,
    DeviceToDevice = 3,
}

impl RtMemcpyKind {
    #[must_use]
    pub const fn dst_on_device(self) -> bool {
        matches!(self, Self::HostToDevice | Self::DeviceToDevice)
    }

    #[must_use]
    pub const fn src_on_device(self) -> bool {
        matches!(self, Self::DeviceToHost | Self::DeviceToDevice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RtMemInfoType {
    Ddr = 0,
    Hbm = 1,
    DdrHuge = 2,
    DdrNormal = 3,
    HbmHuge = 4,
    HbmNormal = 5,
    DdrP2pHuge = 6,
    DdrP2pNormal = 7,
    HbmP2pHuge = 8,
    HbmP2pNormal = 9,
}

// ===============================================================================================
// Handles
// ===============================================================================================

/// An opaque handle to accelerator-addressable memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DevicePtr(*mut c_void);

/// An opaque handle to pinned host memory registered with the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct HostPtr(*mut c_void);

// Handles are plain addresses; the runtime owns what they point to.
unsafe impl Send for DevicePtr {}
unsafe impl Sync for DevicePtr {}
unsafe impl Send for HostPtr {}
unsafe impl Sync for HostPtr {}

macro_rules! impl_handle {
    ($name:ident) => {
        impl $name {
            #[must_use]
            pub const fn null() -> Self {
                Self(ptr::null_mut())
            }

            #[must_use]
            pub const fn from_raw(ptr: *mut c_void) -> Self {
                Self(ptr)
            }

            #[must_use]
            pub const fn as_raw(self) -> *mut c_void {
                self.0
            }

            #[must_use]
            pub fn is_null(self) -> bool {
                self.0.is_null()
            }

            #[must_use]
            pub fn addr(self) -> usize {
                self.0 as usize
            }
        }
    };
}

impl_handle!(DevicePtr);
impl_handle!(HostPtr);

/// An ordered command queue owned by the runtime. `0` is the default stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamHandle(pub u64);

impl StreamHandle {
    pub const DEFAULT: Self = Self(0);
}

// ===============================================================================================
// Runtime Trait
// ===============================================================================================

/// The primitives the memory layer consumes from a device runtime.
///
/// Implementations own thread-safety of memory and stream state; the memory
/// layer may call any method from several threads at once.
pub trait DeviceRuntime: Send + Sync {
    fn malloc(&self, size: usize, flags: u32) -> RtResult<DevicePtr>;

    fn malloc_cached(&self, size: usize, flags: u32) -> RtResult<DevicePtr>;

    fn free(&self, ptr: DevicePtr) -> RtResult<()>;

    fn malloc_host(&self, size: usize) -> RtResult<HostPtr>;

    fn free_host(&self, ptr: HostPtr) -> RtResult<()>;

    /// Blocking copy of `count` bytes. Fails if `count > dst_max`.
    ///
    /// # Safety
    /// `src` must be readable for `count` bytes and `dst` writable for `dst_max` bytes.
    unsafe fn memcpy(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        src: *const c_void,
        count: usize,
        kind: RtMemcpyKind,
    ) -> RtResult<()>;

    /// Enqueues a copy on `stream`. Returns once the runtime accepted it.
    ///
    /// # Safety
    /// Same as [`DeviceRuntime::memcpy`], and both regions must stay valid until
    /// the stream has been synchronized.
    unsafe fn memcpy_async(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        src: *const c_void,
        count: usize,
        kind: RtMemcpyKind,
        stream: StreamHandle,
    ) -> RtResult<()>;

    /// Blocking fill of `count` bytes with the low byte of `value`.
    ///
    /// # Safety
    /// `dst` must be writable for `dst_max` bytes.
    unsafe fn memset(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        value: i32,
        count: usize,
    ) -> RtResult<()>;

    /// # Safety
    /// Same as [`DeviceRuntime::memset`], and `dst` must stay valid until the
    /// stream has been synchronized.
    unsafe fn memset_async(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        value: i32,
        count: usize,
        stream: StreamHandle,
    ) -> RtResult<()>;

    fn flush_cache(&self, ptr: DevicePtr, size: usize) -> RtResult<()>;

    fn invalidate_cache(&self, ptr: DevicePtr, size: usize) -> RtResult<()>;

    /// The logical id of the device bound to the calling thread.
    fn get_device(&self) -> RtResult<u32>;

    fn get_device_phy_id_by_index(&self, device_id: u32) -> RtResult<u32>;

    fn device_can_access_peer(&self, device_id: u32, peer_phy_id: u32) -> RtResult<bool>;

    fn enable_p2p(&self, device_id: u32, peer_phy_id: u32, flags: u32) -> RtResult<()>;

    fn disable_p2p(&self, device_id: u32, peer_phy_id: u32) -> RtResult<()>;

    /// Returns `(free, total)` bytes for the selected pool.
    fn mem_get_info_ex(&self, info_type: RtMemInfoType) -> RtResult<(usize, usize)>;
}
