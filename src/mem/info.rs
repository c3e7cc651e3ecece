use crate::error::{MemError, MemResult, report_input_error};
use crate::mem::manager::MemoryManager;
use crate::mem::runtime_failure;
use crate::profiling;
use crate::rt::RtMemInfoType;

/// Pool selector of a memory-info query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MemAttr {
    DdrMem = 0,
    HbmMem = 1,
    DdrMemHuge = 2,
    DdrMemNormal = 3,
    HbmMemHuge = 4,
    HbmMemNormal = 5,
    DdrMemP2pHuge = 6,
    DdrMemP2pNormal = 7,
    HbmMemP2pHuge = 8,
    HbmMemP2pNormal = 9,
}

impl TryFrom<u32> for MemAttr {
    type Error = MemError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => Self::DdrMem,
            1 => Self::HbmMem,
            2 => Self::DdrMemHuge,
            3 => Self::DdrMemNormal,
            4 => Self::HbmMemHuge,
            5 => Self::HbmMemNormal,
            6 => Self::DdrMemP2pHuge,
            7 => Self::DdrMemP2pNormal,
            8 => Self::HbmMemP2pHuge,
            9 => Self::HbmMemP2pNormal,
            _ => return Err(report_input_error("attr", raw, "must be in 0..=9")),
        })
    }
}

impl From<MemAttr> for RtMemInfoType {
    fn from(attr: MemAttr) -> Self {
        match attr {
            MemAttr::DdrMem => Self::Ddr,
            MemAttr::HbmMem => Self::Hbm,
            MemAttr::DdrMemHuge => Self::DdrHuge,
            MemAttr::DdrMemNormal => Self::DdrNormal,
            MemAttr::HbmMemHuge => Self::HbmHuge,
            MemAttr::HbmMemNormal => Self::HbmNormal,
            MemAttr::DdrMemP2pHuge => Self::DdrP2pHuge,
            MemAttr::DdrMemP2pNormal => Self::DdrP2pNormal,
            MemAttr::HbmMemP2pHuge => Self::HbmP2pHuge,
            MemAttr::HbmMemP2pNormal => Self::HbmP2pNormal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub free: usize,  // bytes
    pub total: usize, // bytes
}

impl MemoryManager {
    /// Free and total bytes of the pool `attr` selects.
    ///
    /// # Errors
    /// `Runtime` when the runtime query fails.
    pub fn get_mem_info(&self, attr: MemAttr) -> MemResult<MemInfo> {
        let _scope = profiling::scope("get_mem_info");
        tracing::info!("start to execute get_mem_info, attr = {attr:?}");

        let (free, total) = self
            .runtime
            .mem_get_info_ex(attr.into())
            .map_err(|status| {
                runtime_failure(status, format_args!("get memory info failed, attr = {attr:?}"))
            })?;

        tracing::info!("successfully got memory info, attr = {attr:?}, free = {free}, total = {total}");
        Ok(MemInfo { free, total })
    }
}
