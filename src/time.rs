//! Thinking budgets and the stop conditions derived from them.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Budget used when none is given.
pub const DEFAULT_MOVE_TIME: Duration = Duration::from_secs(10);

/// How long to think about one move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeInfo {
    /// A fixed number of simulations.
    Games(u32),
    /// Wall-clock time per move.
    PerMove(Duration),
}

impl Default for TimeInfo {
    fn default() -> Self {
        TimeInfo::PerMove(DEFAULT_MOVE_TIME)
    }
}

impl FromStr for TimeInfo {
    type Err = ConfigError;

    /// `=N` means N simulations, a plain number means seconds per move.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || ConfigError::TimeInfo(s.to_string());
        if let Some(games) = s.strip_prefix('=') {
            let n: u32 = games.trim().parse().map_err(|_| bad())?;
            return Ok(TimeInfo::Games(n));
        }
        let secs: f64 = s.parse().map_err(|_| bad())?;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(bad());
        }
        Ok(TimeInfo::PerMove(Duration::from_secs_f64(secs)))
    }
}

impl fmt::Display for TimeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeInfo::Games(n) => write!(f, "={}", n),
            TimeInfo::PerMove(d) => write!(f, "{}", d.as_secs_f64()),
        }
    }
}

/// A search limit, counted from the start of the search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    Playouts(u32),
    Time(Duration),
}

/// When to stop searching: `desired` normally, `worst` at the latest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StopConditions {
    pub desired: Limit,
    pub worst: Limit,
}

impl TimeInfo {
    pub fn is_games(&self) -> bool {
        matches!(self, TimeInfo::Games(_))
    }

    /// Stop conditions for this budget. A time budget may be stretched up to
    /// `max_maintime_ratio` times when the search is undecided.
    pub fn stop_conditions(&self, max_maintime_ratio: f32) -> StopConditions {
        match *self {
            TimeInfo::Games(n) => StopConditions {
                desired: Limit::Playouts(n),
                worst: Limit::Playouts(n),
            },
            TimeInfo::PerMove(d) => StopConditions {
                desired: Limit::Time(d),
                worst: Limit::Time(d.mul_f32(max_maintime_ratio.max(1.0))),
            },
        }
    }
}
