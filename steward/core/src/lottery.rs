//! Lottery Draw Engine
//!
//! Uniform random draw with replacement. Pure apart from the random source.

use rand::seq::SliceRandom;
use rand::Rng;

/// Draw `count` items from `pool`, with replacement, using the thread RNG
///
/// An empty pool or a zero count yields an empty result; neither is an error.
/// Result order is draw order.
#[must_use]
pub fn draw<T: Clone>(pool: &[T], count: usize) -> Vec<T> {
    draw_with(&mut rand::thread_rng(), pool, count)
}

/// [`draw`] with an explicit random source
pub fn draw_with<T: Clone, R: Rng + ?Sized>(rng: &mut R, pool: &[T], count: usize) -> Vec<T> {
    if pool.is_empty() {
        return Vec::new();
    }
    (0..count)
        .filter_map(|_| pool.choose(rng).cloned())
        .collect()
}
