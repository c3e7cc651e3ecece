use crate::error::{MemError, MemResult, report_input_error, require_non_null};
use crate::mem::manager::MemoryManager;
use crate::mem::runtime_failure;
use crate::profiling;
use crate::rt::{RtMemcpyKind, StreamHandle};
use std::ffi::c_void;
use std::fmt;

/// Direction of a copy, seen from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemcpyKind {
    HostToHost,
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

impl MemcpyKind {
    /// Decodes a flat direction code (`0..=3`).
    ///
    /// # Errors
    /// `InvalidParam` for any other value.
    pub fn from_raw(raw: i32) -> MemResult<Self> {
        Self::try_from(raw)
    }
}

impl TryFrom<i32> for MemcpyKind {
    type Error = MemError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::HostToHost),
            1 => Ok(Self::HostToDevice),
            2 => Ok(Self::DeviceToHost),
            3 => Ok(Self::DeviceToDevice),
            _ => Err(report_input_error(
                "kind",
                raw,
                "must be 0 (host to host), 1 (host to device), 2 (device to host) or 3 (device to device)",
            )),
        }
    }
}

impl fmt::Display for MemcpyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HostToHost => "HOST_TO_HOST",
            Self::HostToDevice => "HOST_TO_DEVICE",
            Self::DeviceToHost => "DEVICE_TO_HOST",
            Self::DeviceToDevice => "DEVICE_TO_DEVICE",
        };
        f.write_str(name)
    }
}

#[must_use]
pub const fn resolve_memcpy_kind(kind: MemcpyKind) -> RtMemcpyKind {
    match kind {
        MemcpyKind::HostToHost => RtMemcpyKind::HostToHost,
        MemcpyKind::HostToDevice => RtMemcpyKind::HostToDevice,
        MemcpyKind::DeviceToHost => RtMemcpyKind::DeviceToHost,
        MemcpyKind::DeviceToDevice => RtMemcpyKind::DeviceToDevice,
    }
}

impl From<MemcpyKind> for RtMemcpyKind {
    fn from(kind: MemcpyKind) -> Self {
        resolve_memcpy_kind(kind)
    }
}

// ===============================================================================================
// Copy Engine
// ===============================================================================================

impl MemoryManager {
    /// Copies `count` bytes and returns once they have landed.
    ///
    /// `dst_max` is the capacity of `dst`; the runtime refuses copies larger than it.
    ///
    /// # Safety
    /// `src` must be readable for `count` bytes and `dst` writable for `dst_max`
    /// bytes, each in the address space `kind` names.
    ///
    /// # Errors
    /// `InvalidParam` for null pointers, `Runtime` for anything the runtime rejects.
    pub unsafe fn memcpy(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        src: *const c_void,
        count: usize,
        kind: MemcpyKind,
    ) -> MemResult<()> {
        let _scope = profiling::scope("memcpy");
        tracing::info!(
            "start to execute memcpy, dst_max = {dst_max}, count = {count}, kind = {kind}"
        );

        require_non_null("dst", dst)?;
        require_non_null("src", src)?;

        let rt_kind = resolve_memcpy_kind(kind);
        unsafe { self.runtime.memcpy(dst, dst_max, src, count, rt_kind) }.map_err(|status| {
            runtime_failure(
                status,
                format_args!(
                    "synchronous memcpy failed, dst_max = {dst_max}, count = {count}, kind = {kind}"
                ),
            )
        })
    }

    /// Enqueues a copy on `stream`. Success means the runtime accepted it; the
    /// data moves when the stream is drained.
    ///
    /// # Safety
    /// Same as [`MemoryManager::memcpy`], and both buffers must stay valid until
    /// the stream has been synchronized.
    ///
    /// # Errors
    /// Same as [`MemoryManager::memcpy`].
    pub unsafe fn memcpy_async(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        src: *const c_void,
        count: usize,
        kind: MemcpyKind,
        stream: StreamHandle,
    ) -> MemResult<()> {
        let _scope = profiling::scope("memcpy_async");
        tracing::info!(
            "start to execute memcpy_async, dst_max = {dst_max}, count = {count}, kind = {kind}, stream = {}",
            stream.0
        );

        require_non_null("dst", dst)?;
        require_non_null("src", src)?;

        let rt_kind = resolve_memcpy_kind(kind);
        unsafe {
            self.runtime
                .memcpy_async(dst, dst_max, src, count, rt_kind, stream)
        }
        .map_err(|status| {
            runtime_failure(
                status,
                format_args!(
                    "asynchronous memcpy failed, dst_max = {dst_max}, count = {count}, kind = {kind}, stream = {}",
                    stream.0
                ),
            )
        })
    }

    /// Fills `count` bytes of `dst` with the low byte of `value`.
    ///
    /// # Safety
    /// `dst` must be writable for `dst_max` bytes.
    ///
    /// # Errors
    /// `InvalidParam` for a null pointer, `Runtime` for anything the runtime rejects.
    pub unsafe fn memset(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        value: i32,
        count: usize,
    ) -> MemResult<()> {
        let _scope = profiling::scope("memset");
        tracing::info!(
            "start to execute memset, dst_max = {dst_max}, value = {value}, count = {count}"
        );

        require_non_null("dst", dst)?;

        unsafe { self.runtime.memset(dst, dst_max, value, count) }.map_err(|status| {
            runtime_failure(
                status,
                format_args!(
                    "synchronous memset failed, dst_max = {dst_max}, value = {value}, count = {count}"
                ),
            )
        })
    }

    /// # Safety
    /// Same as [`MemoryManager::memset`], and `dst` must stay valid until the
    /// stream has been synchronized.
    ///
    /// # Errors
    /// Same as [`MemoryManager::memset`].
    pub unsafe fn memset_async(
        &self,
        dst: *mut c_void,
        dst_max: usize,
        value: i32,
        count: usize,
        stream: StreamHandle,
    ) -> MemResult<()> {
        let _scope = profiling::scope("memset_async");
        tracing::info!(
            "start to execute memset_async, dst_max = {dst_max}, value = {value}, count = {count}, stream = {}",
            stream.0
        );

        require_non_null("dst", dst)?;

        unsafe { self.runtime.memset_async(dst, dst_max, value, count, stream) }.map_err(
            |status| {
                runtime_failure(
                    status,
                    format_args!(
                        "asynchronous memset failed, dst_max = {dst_max}, value = {value}, count = {count}, stream = {}",
                        stream.0
                    ),
                )
            },
        )
    }
}
