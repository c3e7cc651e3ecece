use devmem_rs::rt::HostRuntime;
use devmem_rs::rt::topology::LinkType;
use devmem_rs::{MallocPolicy, MemResult, MemcpyKind, MemoryManager};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> MemResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Devices 0 and 1 share a fabric link, device 2 hangs off PCIe alone.
    let runtime = Arc::new(
        HostRuntime::builder()
            .physical_ids([4, 5, 6])
            .link(0, 1, LinkType::Fabric)
            .build()?,
    );
    let mgr = MemoryManager::new(runtime.clone());

    println!("[+] Peer matrix (logical ids):");
    let count = runtime.topology().device_count();
    for dev in 0..count {
        let row: Vec<String> = (0..count)
            .map(|peer| {
                if dev == peer {
                    return " - ".to_string();
                }
                match mgr.device_can_access_peer(dev, peer) {
                    Ok(true) => " Y ".to_string(),
                    Ok(false) => " N ".to_string(),
                    Err(e) => format!("E{}", e.code()),
                }
            })
            .collect();
        println!("    {dev}: {}", row.join(""));
    }

    println!("\n[+] Enabling peer access 0 -> 1...");
    mgr.device_enable_peer_access(1, 0)?;

    let a = mgr.malloc(4096, MallocPolicy::HugeFirstP2p)?;
    let b = mgr.malloc(4096, MallocPolicy::HugeFirstP2p)?;
    let pattern = vec![0xA5u8; 4096];
    let mut check = vec![0u8; 4096];
    unsafe {
        mgr.memcpy(a.ptr.as_raw(), 4096, pattern.as_ptr().cast(), 4096, MemcpyKind::HostToDevice)?;
        mgr.memcpy(b.ptr.as_raw(), 4096, a.ptr.as_raw(), 4096, MemcpyKind::DeviceToDevice)?;
        mgr.memcpy(check.as_mut_ptr().cast(), 4096, b.ptr.as_raw(), 4096, MemcpyKind::DeviceToHost)?;
    }
    println!("    device-to-device copy intact: {}", check == pattern);

    println!("\n[+] Enabling peer access 0 -> 2 (no link)...");
    match mgr.device_enable_peer_access(2, 0) {
        Ok(()) => println!("    unexpectedly succeeded"),
        Err(e) => println!("    refused: {e} (code {})", e.code()),
    }

    mgr.device_disable_peer_access(1)?;
    mgr.free(a.ptr)?;
    mgr.free(b.ptr)?;
    println!("\n[+] Done");
    Ok(())
}
