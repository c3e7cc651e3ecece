use devmem_rs::rt::HostRuntime;
use devmem_rs::rt::host::{MemLocation, PageKind, RtOp};
use devmem_rs::rt::status::RT_ERROR_DRV;
use devmem_rs::{MallocPolicy, MemAttr, MemInfo, MemoryManager};
use rstest::rstest;
use std::sync::Arc;

const MIB: usize = 1 << 20;

fn small_system() -> (Arc<HostRuntime>, MemoryManager) {
    let mut builder = HostRuntime::builder();
    for location in [MemLocation::Ddr, MemLocation::Hbm] {
        for page in [PageKind::Huge, PageKind::Normal] {
            builder = builder
                .pool_capacity(location, page, false, 64 * MIB)
                .pool_capacity(location, page, true, 16 * MIB);
        }
    }
    let rt = Arc::new(builder.build().unwrap());
    let mgr = MemoryManager::new(rt.clone());
    (rt, mgr)
}

#[rstest]
#[case(MemAttr::DdrMem, 160 * MIB)]
#[case(MemAttr::HbmMem, 160 * MIB)]
#[case(MemAttr::HbmMemHuge, 64 * MIB)]
#[case(MemAttr::DdrMemNormal, 64 * MIB)]
#[case(MemAttr::HbmMemP2pHuge, 16 * MIB)]
#[case(MemAttr::DdrMemP2pNormal, 16 * MIB)]
fn totals_match_pool_layout(#[case] attr: MemAttr, #[case] total: usize) {
    let (_rt, mgr) = small_system();
    assert_eq!(mgr.get_mem_info(attr).unwrap(), MemInfo { free: total, total });
}

#[test]
fn huge_allocation_shows_in_huge_and_aggregate() {
    let (_rt, mgr) = small_system();
    let alloc = mgr.malloc(3 * MIB, MallocPolicy::HugeOnly).unwrap();

    let huge = mgr.get_mem_info(MemAttr::HbmMemHuge).unwrap();
    assert_eq!(huge.total - huge.free, 4 * MIB);
    let all = mgr.get_mem_info(MemAttr::HbmMem).unwrap();
    assert_eq!(all.total - all.free, 4 * MIB);
    let normal = mgr.get_mem_info(MemAttr::HbmMemNormal).unwrap();
    assert_eq!(normal.free, normal.total);

    mgr.free(alloc.ptr).unwrap();
}

#[test]
fn host_allocation_draws_from_ddr() {
    let (_rt, mgr) = small_system();
    let alloc = mgr.malloc_host(10_000).unwrap();
    let ddr = mgr.get_mem_info(MemAttr::DdrMemNormal).unwrap();
    assert_eq!(ddr.total - ddr.free, 12_288);
    mgr.free_host(alloc.ptr).unwrap();
}

#[test]
fn query_failure_is_translated() {
    let (rt, mgr) = small_system();
    rt.inject_failure(RtOp::MemGetInfo, RT_ERROR_DRV);
    assert_eq!(mgr.get_mem_info(MemAttr::HbmMem).unwrap_err().code(), 507_899);
    assert!(mgr.get_mem_info(MemAttr::HbmMem).is_ok());
}

#[test]
fn aggregate_query_survives_oversized_pools() {
    let rt = Arc::new(
        HostRuntime::builder()
            .pool_capacity(MemLocation::Ddr, PageKind::Huge, false, usize::MAX / 2 + 1)
            .pool_capacity(MemLocation::Ddr, PageKind::Normal, false, usize::MAX / 2 + 1)
            .build()
            .unwrap(),
    );
    let mgr = MemoryManager::new(rt);
    let info = mgr.get_mem_info(MemAttr::DdrMem).unwrap();
    assert_eq!(info, MemInfo { free: usize::MAX, total: usize::MAX });
}
