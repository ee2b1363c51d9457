//! Pure intimacy arithmetic.
//!
//! Everything here is a deterministic function of `(raw value, now)` so
//! the decay-on-read behavior is reproducible: the stored value is always
//! the last explicit write, and a read at time `t` always produces the
//! same view.

use kizuna_types::settings::IntimacyTuning;
use kizuna_types::state::{INTIMACY_MAX, INTIMACY_MIN};

const DAY_MS: i64 = 86_400_000;

/// Clamp an intimacy value into `[-100, 100]`.
pub fn clamp_intimacy(value: i32) -> i32 {
    value.clamp(INTIMACY_MIN, INTIMACY_MAX)
}

/// Clamp a requested delta into the configured `[max_down, max_up]` range.
pub fn clamp_delta(tuning: &IntimacyTuning, delta: i32) -> i32 {
    delta.clamp(tuning.max_delta_down, tuning.max_delta_up)
}

/// Dampen a positive delta while intimacy is negative.
///
/// Repair is deliberately slower than harm: a positive delta applied to a
/// negative relationship becomes `max(1, round(delta * repair_factor))`.
/// All other deltas pass through unchanged.
pub fn effective_delta(tuning: &IntimacyTuning, current: i32, delta: i32) -> i32 {
    if delta == 0 {
        return 0;
    }
    if delta > 0 && current < 0 {
        let dampened = (f64::from(delta) * tuning.repair_factor).round() as i32;
        return dampened.max(1);
    }
    delta
}

/// Apply a tool-requested delta: clamp the request, dampen repair, clamp
/// the result.
pub fn apply_delta(tuning: &IntimacyTuning, current: i32, requested: i32) -> i32 {
    let delta = clamp_delta(tuning, requested);
    clamp_intimacy(current + effective_delta(tuning, current, delta))
}

/// Decay an intimacy value toward zero after a period of silence.
///
/// One step per `decay_step_days` elapsed days, never changing sign and
/// never moving away from zero.
pub fn decay_intimacy(tuning: &IntimacyTuning, raw: i32, last_interaction_at: i64, now: i64) -> i32 {
    let current = clamp_intimacy(raw);
    if current == 0 {
        return 0;
    }

    let elapsed_days = (now - last_interaction_at).max(0) / DAY_MS;
    let steps = (elapsed_days / tuning.decay_step_days.max(1)) as i32;
    if steps <= 0 {
        return current;
    }

    if current > 0 {
        (current - steps).max(0)
    } else {
        (current + steps).min(0)
    }
}
