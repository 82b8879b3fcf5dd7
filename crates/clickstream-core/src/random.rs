//! Random draws used by the tick loop.
//!
//! Every function takes the random source explicitly. Workers own a seeded
//! [`SmallRng`](rand::rngs::SmallRng), so a seeded run is reproducible.

use std::time::Duration;

use rand::Rng;

/// Perturb `base` by a uniformly random amount in `[-jitter, +jitter)`.
///
/// `jitter_duration(1s, 200ms)` returns something between 800ms and 1.2s.
/// The lower bound is clamped at zero, so with `jitter > base` the result
/// lies in `[0, base + jitter)`.
pub fn jitter_duration<R: Rng + ?Sized>(
    base: Duration,
    jitter: Duration,
    rng: &mut R,
) -> Duration {
    let low = base.saturating_sub(jitter);
    let high = base.saturating_add(jitter);
    let span = u64::try_from(high.saturating_sub(low).as_nanos()).unwrap_or(u64::MAX);
    if span == 0 {
        return base;
    }
    low.saturating_add(Duration::from_nanos(rng.random_range(0..span)))
}

/// Number of visitors to admit this tick.
///
/// Zero when the population is at or above `max_users`; otherwise uniform
/// over `1..=max_users - population`.
pub fn admission_count<R: Rng + ?Sized>(max_users: usize, population: usize, rng: &mut R) -> usize {
    match max_users.checked_sub(population) {
        Some(room) if room > 0 => rng.random_range(1..=room),
        _ => 0,
    }
}

/// Draw a navigation probability in `[0, 1)`, squared so that most draws
/// land near zero.
pub fn event_probability<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random::<f64>().powi(2)
}
