use crate::error::{MemError, MemResult, report_input_error};
use crate::mem::manager::MemoryManager;
use crate::mem::runtime_failure;
use crate::profiling;

/// The only flags value peer access accepts today.
pub const PEER_ACCESS_RESERVED_FLAGS: u32 = 0;

// ===============================================================================================
// Peer Access
// ===============================================================================================
//
// Device ids passed in are logical indices. The runtime addresses peers by
// physical id, which is resolved again on every call; nothing is cached here.

impl MemoryManager {
    /// Whether `device_id` can reach memory on `peer_device_id` over the interconnect.
    ///
    /// # Errors
    /// `InvalidParam` when both ids are equal, `Runtime` when an id cannot be
    /// resolved or the query fails.
    pub fn device_can_access_peer(&self, device_id: u32, peer_device_id: u32) -> MemResult<bool> {
        let _scope = profiling::scope("device_can_access_peer");
        tracing::info!(
            "start to execute device_can_access_peer, device = {device_id}, peer device = {peer_device_id}"
        );

        check_distinct(device_id, peer_device_id)?;
        let peer_phy_id = self.peer_phy_id(peer_device_id)?;

        self.runtime
            .device_can_access_peer(device_id, peer_phy_id)
            .map_err(|status| {
                runtime_failure(
                    status,
                    format_args!(
                        "query peer access failed, device = {device_id}, peer device = {peer_device_id}, peer phy id = {peer_phy_id}"
                    ),
                )
            })
    }

    /// Lets the current device access memory on `peer_device_id`.
    ///
    /// # Errors
    /// `FeatureUnsupported` for any `flags` other than
    /// [`PEER_ACCESS_RESERVED_FLAGS`], `InvalidParam` when the peer is the
    /// current device, `Runtime` for resolution or enable failures.
    pub fn device_enable_peer_access(&self, peer_device_id: u32, flags: u32) -> MemResult<()> {
        let _scope = profiling::scope("device_enable_peer_access");
        tracing::info!(
            "start to execute device_enable_peer_access, peer device = {peer_device_id}, flags = {flags}"
        );

        if flags != PEER_ACCESS_RESERVED_FLAGS {
            tracing::error!(
                "peer access flags must be {PEER_ACCESS_RESERVED_FLAGS}, got {flags}"
            );
            return Err(MemError::FeatureUnsupported(format!(
                "peer access flags {flags} (only {PEER_ACCESS_RESERVED_FLAGS} is supported)"
            )));
        }

        let device_id = self.current_device()?;
        check_distinct(device_id, peer_device_id)?;
        let peer_phy_id = self.peer_phy_id(peer_device_id)?;

        self.runtime
            .enable_p2p(device_id, peer_phy_id, flags)
            .map_err(|status| {
                runtime_failure(
                    status,
                    format_args!(
                        "enable peer access failed, device = {device_id}, peer device = {peer_device_id}, peer phy id = {peer_phy_id}"
                    ),
                )
            })
    }

    /// Revokes the current device's access to `peer_device_id`.
    ///
    /// # Errors
    /// `InvalidParam` when the peer is the current device, `Runtime` for
    /// resolution or disable failures.
    pub fn device_disable_peer_access(&self, peer_device_id: u32) -> MemResult<()> {
        let _scope = profiling::scope("device_disable_peer_access");
        tracing::info!(
            "start to execute device_disable_peer_access, peer device = {peer_device_id}"
        );

        let device_id = self.current_device()?;
        check_distinct(device_id, peer_device_id)?;
        let peer_phy_id = self.peer_phy_id(peer_device_id)?;

        self.runtime
            .disable_p2p(device_id, peer_phy_id)
            .map_err(|status| {
                runtime_failure(
                    status,
                    format_args!(
                        "disable peer access failed, device = {device_id}, peer device = {peer_device_id}, peer phy id = {peer_phy_id}"
                    ),
                )
            })
    }

    fn current_device(&self) -> MemResult<u32> {
        self.runtime.get_device().map_err(|status| {
            runtime_failure(status, format_args!("get current device failed"))
        })
    }

    fn peer_phy_id(&self, peer_device_id: u32) -> MemResult<u32> {
        self.runtime
            .get_device_phy_id_by_index(peer_device_id)
            .map_err(|status| {
                runtime_failure(
                    status,
                    format_args!("get phy id of device {peer_device_id} failed"),
                )
            })
    }
}

fn check_distinct(device_id: u32, peer_device_id: u32) -> MemResult<()> {
    if device_id == peer_device_id {
        return Err(report_input_error(
            "peer_device_id",
            peer_device_id,
            format!("must differ from device {device_id}"),
        ));
    }
    Ok(())
}
