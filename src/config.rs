use crate::error::{MemResult, report_input_error};

pub const DEFAULT_ALIGN_SIZE: usize = 32;
/// Upper bound for the allocation granularity (one 2 MiB huge page).
pub const MAX_ALIGN_SIZE: usize = 2 * 1024 * 1024;
pub const ALIGN_SIZE_ENV: &str = "DEVMEM_ALIGN_SIZE";

/// Tunables of the memory layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemConfig {
    align_size: usize,
}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            align_size: DEFAULT_ALIGN_SIZE,
        }
    }
}

impl MemConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the allocation granularity.
    ///
    /// # Errors
    /// `InvalidParam` unless `align_size` is a power of two no larger than [`MAX_ALIGN_SIZE`].
    pub fn with_align_size(mut self, align_size: usize) -> MemResult<Self> {
        if !align_size.is_power_of_two() || align_size > MAX_ALIGN_SIZE {
            return Err(report_input_error(
                "align_size",
                align_size,
                format!("must be a power of two no larger than {MAX_ALIGN_SIZE}"),
            ));
        }
        self.align_size = align_size;
        Ok(self)
    }

    #[must_use]
    pub const fn align_size(&self) -> usize {
        self.align_size
    }

    /// Defaults overridden by `DEVMEM_ALIGN_SIZE` when it is set.
    ///
    /// # Errors
    /// `InvalidParam` if the variable is set but is not a valid granularity.
    pub fn from_env() -> MemResult<Self> {
        match std::env::var(ALIGN_SIZE_ENV) {
            Ok(val) => Self::from_env_value(&val),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(report_input_error(ALIGN_SIZE_ENV, "<unreadable>", e.to_string())),
        }
    }

    fn from_env_value(val: &str) -> MemResult<Self> {
        let align_size = val
            .trim()
            .parse::<usize>()
            .map_err(|e| report_input_error(ALIGN_SIZE_ENV, val, e.to_string()))?;
        tracing::debug!("allocation granularity from environment: {align_size}");
        Self::default().with_align_size(align_size)
    }
}
