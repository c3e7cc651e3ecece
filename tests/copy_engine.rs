use devmem_rs::rt::HostRuntime;
use devmem_rs::rt::host::RtOp;
use devmem_rs::rt::status::{RT_ERROR_INVALID_VALUE, RT_ERROR_STREAM_CONTEXT};
use devmem_rs::rt::{ErrorCategory, StreamHandle};
use devmem_rs::{MallocPolicy, MemError, MemcpyKind, MemoryManager};
use rstest::rstest;
use std::ffi::c_void;
use std::sync::Arc;

fn setup() -> (Arc<HostRuntime>, MemoryManager) {
    let rt = Arc::new(HostRuntime::builder().build().unwrap());
    let mgr = MemoryManager::new(rt.clone());
    (rt, mgr)
}

fn runtime_status(err: &MemError) -> u32 {
    match err {
        MemError::Runtime(failure) => failure.status.0,
        other => panic!("expected a runtime failure, got {other:?}"),
    }
}

#[test]
fn capacity_violation_is_not_truncated() {
    let (_rt, mgr) = setup();
    let dev = mgr.malloc(64, MallocPolicy::HugeFirst).unwrap();
    let src = [0x5Au8; 32];

    let err = unsafe {
        mgr.memcpy(dev.ptr.as_raw(), 16, src.as_ptr().cast(), 32, MemcpyKind::HostToDevice)
    }
    .unwrap_err();
    assert_eq!(runtime_status(&err), RT_ERROR_INVALID_VALUE.0);
    assert_eq!(err.category(), ErrorCategory::Param);

    // Nothing was written.
    let mut out = [0xFFu8; 32];
    unsafe {
        mgr.memcpy(out.as_mut_ptr().cast(), 32, dev.ptr.as_raw(), 32, MemcpyKind::DeviceToHost)
            .unwrap();
    }
    assert_eq!(out, [0u8; 32]);
    mgr.free(dev.ptr).unwrap();
}

#[rstest]
#[case(-1)]
#[case(4)]
#[case(17)]
fn raw_kind_is_rejected_before_any_device_call(#[case] raw: i32) {
    let (rt, _mgr) = setup();
    assert!(MemcpyKind::from_raw(raw).unwrap_err().is_invalid_param());
    assert_eq!(rt.total_calls(), 0);
}

#[rstest]
#[case(0, MemcpyKind::HostToHost)]
#[case(3, MemcpyKind::DeviceToDevice)]
fn raw_kind_drives_copy(#[case] raw: i32, #[case] expected: MemcpyKind) {
    let (_rt, mgr) = setup();
    let kind = MemcpyKind::from_raw(raw).unwrap();
    assert_eq!(kind, expected);

    let a = mgr.malloc(8, MallocPolicy::NormalOnly).unwrap();
    let b = mgr.malloc(8, MallocPolicy::NormalOnly).unwrap();
    let host_a = [1u8; 8];
    let mut host_b = [0u8; 8];
    let (dst, src): (*mut c_void, *const c_void) = match kind {
        MemcpyKind::DeviceToDevice => (b.ptr.as_raw(), a.ptr.as_raw().cast_const()),
        _ => (host_b.as_mut_ptr().cast(), host_a.as_ptr().cast()),
    };
    unsafe { mgr.memcpy(dst, 8, src, 8, kind) }.unwrap();
    mgr.free(a.ptr).unwrap();
    mgr.free(b.ptr).unwrap();
}

#[test]
fn host_to_device_needs_device_destination() {
    let (_rt, mgr) = setup();
    let src = [1u8; 8];
    let mut dst = [0u8; 8];
    let err = unsafe {
        mgr.memcpy(dst.as_mut_ptr().cast(), 8, src.as_ptr().cast(), 8, MemcpyKind::HostToDevice)
    }
    .unwrap_err();
    assert_eq!(runtime_status(&err), RT_ERROR_INVALID_VALUE.0);
}

#[test]
fn async_work_lands_on_synchronize() {
    let (rt, mgr) = setup();
    let stream = rt.create_stream();
    let dev = mgr.malloc(16, MallocPolicy::HugeFirst).unwrap();
    let pinned = mgr.malloc_host(16).unwrap();

    unsafe {
        mgr.memset_async(dev.ptr.as_raw(), 16, 0x7F, 16, stream).unwrap();
        mgr.memcpy_async(
            pinned.ptr.as_raw(),
            16,
            dev.ptr.as_raw(),
            16,
            MemcpyKind::DeviceToHost,
            stream,
        )
        .unwrap();
    }

    let view = pinned.ptr.as_raw().cast::<u8>();
    assert_eq!(unsafe { *view }, 0);
    assert_eq!(rt.pending_ops(stream).unwrap(), 2);

    rt.synchronize_stream(stream).unwrap();
    let landed = unsafe { std::slice::from_raw_parts(view, 16) };
    assert!(landed.iter().all(|&b| b == 0x7F));

    rt.destroy_stream(stream).unwrap();
    mgr.free_host(pinned.ptr).unwrap();
    mgr.free(dev.ptr).unwrap();
}

#[test]
fn streams_do_not_share_queues() {
    let (rt, mgr) = setup();
    let s1 = rt.create_stream();
    let s2 = rt.create_stream();
    let dev = mgr.malloc(4, MallocPolicy::HugeFirst).unwrap();

    unsafe {
        mgr.memset_async(dev.ptr.as_raw(), 4, 1, 4, s1).unwrap();
        mgr.memset_async(dev.ptr.as_raw(), 4, 2, 4, s2).unwrap();
    }
    rt.synchronize_stream(s2).unwrap();
    assert_eq!(rt.pending_ops(s1).unwrap(), 1);
    assert_eq!(rt.pending_ops(s2).unwrap(), 0);

    rt.synchronize_stream(s1).unwrap();
    let mut out = [0u8; 4];
    unsafe {
        mgr.memcpy(out.as_mut_ptr().cast(), 4, dev.ptr.as_raw(), 4, MemcpyKind::DeviceToHost)
            .unwrap();
    }
    assert_eq!(out, [1; 4]);
    mgr.free(dev.ptr).unwrap();
}

#[test]
fn unknown_stream_surfaces_runtime_error() {
    let (rt, mgr) = setup();
    let dev = mgr.malloc(8, MallocPolicy::HugeFirst).unwrap();
    let err = unsafe { mgr.memset_async(dev.ptr.as_raw(), 8, 0, 8, StreamHandle(4242)) }
        .unwrap_err();
    assert_eq!(runtime_status(&err), RT_ERROR_STREAM_CONTEXT.0);
    assert_eq!(rt.call_count(RtOp::MemsetAsync), 1);
    mgr.free(dev.ptr).unwrap();
}

#[test]
fn memset_uses_low_byte() {
    let (_rt, mgr) = setup();
    let dev = mgr.malloc(8, MallocPolicy::HugeFirst).unwrap();
    let mut out = [0u8; 8];
    unsafe {
        mgr.memset(dev.ptr.as_raw(), 8, 0x1AB, 8).unwrap();
        mgr.memcpy(out.as_mut_ptr().cast(), 8, dev.ptr.as_raw(), 8, MemcpyKind::DeviceToHost)
            .unwrap();
    }
    assert_eq!(out, [0xAB; 8]);
    mgr.free(dev.ptr).unwrap();
}

#[test]
fn flush_then_invalidate() {
    let (_rt, mgr) = setup();
    let dev = mgr.malloc_cached(1024, MallocPolicy::HugeFirst).unwrap();
    mgr.mem_flush(dev.ptr, 1024).unwrap();
    mgr.mem_invalidate(dev.ptr, 1024).unwrap();

    let err = mgr.mem_flush(dev.ptr, 4096).unwrap_err();
    assert_eq!(runtime_status(&err), RT_ERROR_INVALID_VALUE.0);
    mgr.free(dev.ptr).unwrap();
}

#[test]
fn free_waits_for_queued_fill() {
    let (rt, mgr) = setup();
    let stream = rt.create_stream();
    let dev = mgr.malloc(1 << 20, MallocPolicy::HugeFirst).unwrap();

    unsafe {
        mgr.memset_async(dev.ptr.as_raw(), 1 << 20, 1, 1 << 20, stream)
            .unwrap();
    }
    assert_eq!(rt.pending_ops(stream).unwrap(), 1);

    mgr.free(dev.ptr).unwrap();
    assert_eq!(rt.pending_ops(stream).unwrap(), 0);
    rt.synchronize_stream(stream).unwrap();
    rt.destroy_stream(stream).unwrap();
}

#[test]
fn free_host_waits_for_queued_copy_into_it() {
    let (rt, mgr) = setup();
    let stream = rt.create_stream();
    let dev = mgr.malloc(32, MallocPolicy::NormalOnly).unwrap();
    let pinned = mgr.malloc_host(32).unwrap();

    unsafe {
        mgr.memset(dev.ptr.as_raw(), 32, 9, 32).unwrap();
        mgr.memcpy_async(
            pinned.ptr.as_raw(),
            32,
            dev.ptr.as_raw(),
            32,
            MemcpyKind::DeviceToHost,
            stream,
        )
        .unwrap();
    }
    mgr.free_host(pinned.ptr).unwrap();
    assert_eq!(rt.pending_ops(stream).unwrap(), 0);
    mgr.free(dev.ptr).unwrap();
}

#[derive(Debug, Clone, Copy)]
enum Submit {
    CopyAsync,
    Fill,
    FillAsync,
}

#[rstest]
#[case(Submit::CopyAsync)]
#[case(Submit::Fill)]
#[case(Submit::FillAsync)]
fn capacity_violation_is_rejected_without_queueing(#[case] submit: Submit) {
    let (rt, mgr) = setup();
    let stream = rt.create_stream();
    let dev = mgr.malloc(64, MallocPolicy::HugeFirst).unwrap();
    let src = [0xEEu8; 32];

    let ret = unsafe {
        match submit {
            Submit::CopyAsync => mgr.memcpy_async(
                dev.ptr.as_raw(),
                16,
                src.as_ptr().cast(),
                32,
                MemcpyKind::HostToDevice,
                stream,
            ),
            Submit::Fill => mgr.memset(dev.ptr.as_raw(), 16, 0xEE, 32),
            Submit::FillAsync => mgr.memset_async(dev.ptr.as_raw(), 16, 0xEE, 32, stream),
        }
    };
    let err = ret.unwrap_err();
    assert_eq!(runtime_status(&err), RT_ERROR_INVALID_VALUE.0);
    assert_eq!(rt.pending_ops(stream).unwrap(), 0);

    rt.synchronize_stream(stream).unwrap();
    let mut out = [0xFFu8; 32];
    unsafe {
        mgr.memcpy(out.as_mut_ptr().cast(), 32, dev.ptr.as_raw(), 32, MemcpyKind::DeviceToHost)
            .unwrap();
    }
    assert_eq!(out, [0u8; 32]);
    mgr.free(dev.ptr).unwrap();
}
