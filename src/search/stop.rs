//! When to end a search.
//!
//! Everything here is a pure function of a [`Progress`] snapshot so the
//! rules can be checked without running any threads.

use crate::time::{Limit, StopConditions};
use std::time::Duration;

/// How often the controller wakes up to look at the search.
pub const TREE_BUSYWAIT_INTERVAL: Duration = Duration::from_millis(100);
/// Playouts of the best move before an early break is considered.
pub const PLAYOUT_EARLY_BREAK_MIN: u32 = 5000;
/// Thinking time before a won position may break early.
pub const TIME_EARLY_BREAK_MIN: Duration = Duration::from_secs(1);
/// Extra simulations granted to the runner-up when estimating whether it
/// can still overtake the best move.
pub const PLAYOUT_DELTA_SAFEMARGIN: f64 = 1000.0;

/// A root child as seen by the stop rules. `value` is from the point of
/// view of the player to move at the root.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub playouts: u32,
    pub value: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct StopParams {
    pub stop: StopConditions,
    pub mingames: u32,
    pub sure_win_threshold: f32,
    /// 0 disables the best/second-best visit ratio check.
    pub best2_ratio: f32,
    /// 0 disables the best/best-reply value check.
    pub bestr_ratio: f32,
}

/// State of the running search.
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    /// Simulations completed in this search.
    pub games: u32,
    pub elapsed: Duration,
    pub best: Option<Candidate>,
    pub best2: Option<Candidate>,
    pub tree_full: bool,
}

/// Extra information needed only once the desired limit is reached.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lookahead {
    /// The opponent's most visited reply to the best move.
    pub bestr: Option<Candidate>,
    /// False when the policy rates another move higher than the most
    /// visited one.
    pub winner_is_best: bool,
}

fn is_walltime(params: &StopParams) -> bool {
    matches!(params.stop.worst, Limit::Time(_))
}

/// Whether the search can end before its desired limit.
pub fn stop_early(params: &StopParams, p: &Progress) -> bool {
    let Some(best) = p.best else {
        return false;
    };
    if p.tree_full {
        return true;
    }

    let walltime = is_walltime(params);
    if walltime && p.elapsed < TREE_BUSYWAIT_INTERVAL {
        return false;
    }

    if let (Some(best2), Limit::Time(worst)) = (p.best2, params.stop.worst) {
        if p.games >= PLAYOUT_EARLY_BREAK_MIN {
            let elapsed = p.elapsed.as_secs_f64();
            let remaining = worst.as_secs_f64() - elapsed;
            let pps = p.games as f64 / elapsed;
            let estimated = remaining * pps + PLAYOUT_DELTA_SAFEMARGIN;
            if best.playouts as f64 > best2.playouts as f64 + estimated {
                return true;
            }
        }
    }

    best.playouts >= PLAYOUT_EARLY_BREAK_MIN
        && (!walltime || p.elapsed > TIME_EARLY_BREAK_MIN)
        && best.value >= params.sure_win_threshold
}

/// Whether the search should run past its desired limit.
pub fn keep_looking(params: &StopParams, p: &Progress, look: &Lookahead) -> bool {
    let Some(best) = p.best else {
        return true;
    };

    let beta = 2.0 * (best.value - 0.5);
    if let (Limit::Time(desired), Limit::Time(worst)) = (params.stop.desired, params.stop.worst) {
        if beta > 0.0 {
            let good_enough =
                desired.as_secs_f64() * beta as f64 + worst.as_secs_f64() * (1.0 - beta as f64);
            if p.elapsed.as_secs_f64() > good_enough {
                return false;
            }
        }
    }

    if params.best2_ratio > 0.0 {
        if let Some(best2) = p.best2.filter(|b| b.playouts > 0) {
            if (best.playouts as f32 / best2.playouts as f32) < params.best2_ratio {
                return true;
            }
        }
    }

    if params.bestr_ratio > 0.0 {
        if let Some(bestr) = look.bestr.filter(|b| b.playouts > 0) {
            // The reply is valued by the opponent; flip it back.
            if (best.value - (1.0 - bestr.value)).abs() > params.bestr_ratio {
                return true;
            }
        }
    }

    !look.winner_is_best
}

/// The full decision for one polling round. `lookahead` is only evaluated
/// once the desired limit has been reached.
pub fn should_stop(
    params: &StopParams,
    p: &Progress,
    lookahead: impl FnOnce() -> Lookahead,
) -> bool {
    if p.games < params.mingames {
        return false;
    }
    if stop_early(params, p) {
        return true;
    }

    let desired_done = match (params.stop.desired, params.stop.worst) {
        (Limit::Time(desired), Limit::Time(worst)) => {
            if p.elapsed > worst {
                return true;
            }
            p.elapsed > desired
        }
        (Limit::Playouts(desired), Limit::Playouts(worst)) => {
            if p.games > worst {
                return true;
            }
            p.games > desired
        }
        // Mixed limits: the worst one alone decides.
        (_, Limit::Time(worst)) => p.elapsed > worst,
        (_, Limit::Playouts(worst)) => p.games > worst,
    };

    desired_done && !keep_looking(params, p, &lookahead())
}
