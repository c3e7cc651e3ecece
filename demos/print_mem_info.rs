use devmem_rs::mem::StatKind;
use devmem_rs::rt::HostRuntime;
use devmem_rs::{MallocPolicy, MemAttr, MemConfig, MemResult, MemoryManager};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const ATTRS: [MemAttr; 10] = [
    MemAttr::DdrMem,
    MemAttr::HbmMem,
    MemAttr::DdrMemHuge,
    MemAttr::DdrMemNormal,
    MemAttr::HbmMemHuge,
    MemAttr::HbmMemNormal,
    MemAttr::DdrMemP2pHuge,
    MemAttr::DdrMemP2pNormal,
    MemAttr::HbmMemP2pHuge,
    MemAttr::HbmMemP2pNormal,
];

fn print_pools(mgr: &MemoryManager) -> MemResult<()> {
    for attr in ATTRS {
        let info = mgr.get_mem_info(attr)?;
        println!(
            "    {:<18} free {:>8} MB / total {:>8} MB",
            format!("{attr:?}"),
            info.free / 1024 / 1024,
            info.total / 1024 / 1024
        );
    }
    Ok(())
}

fn main() -> MemResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("============================================================");
    println!("                  Device Memory - Pool Info                 ");
    println!("============================================================");

    let runtime = HostRuntime::builder().build()?;
    let mgr = MemoryManager::new(Arc::new(runtime)).with_config(MemConfig::from_env()?);
    println!("[+] Allocation granularity: {} bytes", mgr.config().align_size());

    println!("\n[+] Pools before allocating:");
    print_pools(&mgr)?;

    let huge = mgr.malloc(64 * 1024 * 1024, MallocPolicy::HugeOnly)?;
    let normal = mgr.malloc(3 * 1024 * 1024, MallocPolicy::NormalOnly)?;
    let host = mgr.malloc_host(16 * 1024 * 1024)?;
    println!(
        "\n[+] Allocated {} + {} device bytes and {} host bytes",
        huge.aligned_size, normal.aligned_size, host.size
    );

    println!("\n[+] Pools while holding them:");
    print_pools(&mgr)?;

    mgr.free(huge.ptr)?;
    mgr.free(normal.ptr)?;
    mgr.free_host(host.ptr)?;

    let dev = mgr.statistics().snapshot(StatKind::MallocFree);
    let pinned = mgr.statistics().snapshot(StatKind::MallocFreeHost);
    println!("\n[+] Statistics:");
    println!("    device: {dev:?}");
    println!("    host:   {pinned:?}");

    Ok(())
}
