use crate::error::{MemResult, report_input_error};

/// Rounds `val` up to a multiple of `align` (a power of two). `None` on overflow.
#[must_use]
pub const fn checked_align_up(val: usize, align: usize) -> Option<usize> {
    match val.checked_add(align - 1) {
        Some(sum) => Some(sum & !(align - 1)),
        None => None,
    }
}

/// Size handed to the runtime for a request of `size` bytes.
///
/// Rounds up to `align` and keeps one extra granule of tail padding, so the
/// result is always strictly larger than `size`. `align` must be a power of two.
///
/// # Errors
/// Returns `InvalidParam` when the padded size does not fit in `usize`.
pub fn aligned_size(size: usize, align: usize) -> MemResult<usize> {
    debug_assert!(align.is_power_of_two());

    let padded = size
        .checked_add(align)
        .and_then(|s| checked_align_up(s, align));

    padded.ok_or_else(|| {
        tracing::error!("size too large to align, size = {size}, align = {align}");
        report_input_error("size", size, "size overflows when aligned")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pads_one_granule() {
        assert_eq!(aligned_size(1, 32).unwrap(), 64);
        assert_eq!(aligned_size(31, 32).unwrap(), 64);
        assert_eq!(aligned_size(32, 32).unwrap(), 64);
        assert_eq!(aligned_size(33, 32).unwrap(), 96);
        assert_eq!(aligned_size(1024, 32).unwrap(), 1056);
    }

    #[test]
    fn overflow_is_reported() {
        let err = aligned_size(usize::MAX - 10, 32).unwrap_err();
        assert!(err.is_invalid_param());
    }

    #[test]
    fn checked_align_up_edges() {
        assert_eq!(checked_align_up(0, 4096), Some(0));
        assert_eq!(checked_align_up(1, 4096), Some(4096));
        assert_eq!(checked_align_up(4096, 4096), Some(4096));
        assert_eq!(checked_align_up(usize::MAX, 4096), None);
    }

    proptest! {
        #[test]
        fn aligned_is_at_least_requested(size in 1usize..(1 << 48), shift in 0u32..22) {
            let align = 1usize << shift;
            let aligned = aligned_size(size, align).unwrap();
            prop_assert!(aligned >= size);
            prop_assert_eq!(aligned % align, 0);
        }

        #[test]
        fn aligned_is_monotonic(a in 1usize..(1 << 40), b in 1usize..(1 << 40)) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(aligned_size(lo, 32).unwrap() <= aligned_size(hi, 32).unwrap());
        }
    }
}
