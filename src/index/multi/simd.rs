#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use super::hash::NUM_LEVELS;

/// Computes all four candidate lanes in one pass:
/// `lane[i] = (key + add[i]) * mult[i]` with wrapping 32-bit arithmetic.
#[inline]
pub(crate) fn index_lanes(
    key: u32,
    add: &[u32; NUM_LEVELS],
    mult: &[u32; NUM_LEVELS],
) -> [u32; NUM_LEVELS] {
    unsafe {
        let key = _mm_set1_epi32(key as i32);
        let add = _mm_loadu_si128(add.as_ptr() as *const __m128i);
        let mult = _mm_loadu_si128(mult.as_ptr() as *const __m128i);
        let lanes = _mm_mullo_epi32(_mm_add_epi32(key, add), mult);

        let mut out = [0u32; NUM_LEVELS];
        _mm_storeu_si128(out.as_mut_ptr() as *mut __m128i, lanes);
        out
    }
}
