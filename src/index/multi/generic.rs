use super::hash::NUM_LEVELS;

/// Portable rendition of the four-lane index computation. Produces exactly
/// the same lanes as the vectorized path (`_mm_mullo_epi32` is a wrapping
/// 32-bit multiply).
#[inline]
pub(crate) fn index_lanes(
    key: u32,
    add: &[u32; NUM_LEVELS],
    mult: &[u32; NUM_LEVELS],
) -> [u32; NUM_LEVELS] {
    let mut out = [0u32; NUM_LEVELS];
    for (lane, (&a, &m)) in out.iter_mut().zip(add.iter().zip(mult.iter())) {
        *lane = key.wrapping_add(a).wrapping_mul(m);
    }
    out
}
