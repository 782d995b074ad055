//! Small shared helpers.
//!
//! Randomness here is a clock-seeded xorshift — good enough for jitter and
//! pool selection, not crypto, and avoids pulling in the `rand` crate.

/// Return a pseudo-random value in `[0, max)`. Returns 0 when `max == 0`.
pub(crate) fn rand_below(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    // Seed from high-resolution clock.
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max
}

/// Pick a random element of a non-empty slice.
pub(crate) fn rand_choice<'a, T>(items: &'a [T]) -> &'a T {
    &items[rand_below(items.len() as u64) as usize]
}
