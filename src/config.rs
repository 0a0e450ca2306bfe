//! Engine configuration.
//!
//! Three layers, later ones overriding earlier ones: built-in defaults, an
//! optional TOML file, and a `key=value,key=value` option string as given on
//! the command line. Sizes are in MiB.

use crate::dynkomi::{AdaptiveDynkomi, Dynkomi, LinearDynkomi, NoDynkomi};
use crate::error::ConfigError;
use crate::board::Board;
use crate::policy::{Policy, Ucb1, Ucb1Amaf};
use crate::prior::{EvenPrior, Prior};
use crate::tree::TreeLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

const MIB: usize = 1 << 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadModel {
    /// Shared tree, no virtual loss.
    Tree,
    /// Shared tree with virtual loss.
    TreeVl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Ucb1,
    Ucb1Amaf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynkomiKind {
    None,
    Linear,
    Adaptive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UctConfig {
    /// Worker threads per search.
    pub threads: usize,
    pub thread_model: ThreadModel,
    /// Descents added to a node while a simulation passes through it.
    pub virtual_loss: i32,
    /// Memory for the tree in MiB. With `fast_alloc` this includes the
    /// temporary tree used for pruning.
    pub max_tree_size: usize,
    pub fast_alloc: bool,
    /// Arena fill level (MiB) that triggers pruning after a move. 0 picks
    /// the default of 10% of `max_tree_size`.
    pub pruning_threshold: usize,
    /// Resign when the win rate of the best move drops below this.
    pub resign_threshold: f32,
    /// Stop early when the win rate of the best move exceeds this.
    pub sure_win_threshold: f32,
    /// Keep searching while the best move has fewer than this many times
    /// the playouts of the second best. 0 disables the check.
    pub best2_ratio: f32,
    /// Keep searching while the values of the best move and of the best
    /// reply to it differ by more than this. 0 disables the check.
    pub bestr_ratio: f32,
    /// How far past the desired time an undecided search may run.
    pub max_maintime_ratio: f32,
    pub dynkomi: DynkomiKind,
    /// Initial extra komi of the linear dynkomi; bound of the adaptive one.
    pub dynkomi_base: f32,
    /// Move at which the linear dynkomi reaches zero.
    pub dynkomi_moves: usize,
    /// Share of the average playout score the adaptive dynkomi takes on
    /// at each readjustment.
    pub dynkomi_rate: f32,
    /// Games per thread between dynkomi readjustments. 0 disables them.
    pub dynkomi_interval: u32,
    /// Colors dynkomi applies to: 1 Black, 2 White, 3 both.
    pub dynkomi_mask: u8,
    /// Keep searching during the opponent's turn.
    pub pondering: bool,
    pub policy: PolicyKind,
    pub explore_p: f32,
    pub fpu: f32,
    pub equiv_rave: f32,
    pub crit_coef: f32,
    /// Visits of a leaf before it is expanded.
    pub expand_p: u32,
    /// Games between progress reports.
    pub reportfreq: u32,
    /// Maximum playout length.
    pub gamelen: usize,
    /// Minimum simulations per search, whatever the budget.
    pub mingames: u32,
    /// Visit counts are divided by this after each move; 1 keeps them.
    pub tree_aging: f32,
    /// Count every stone as alive when deciding whether to pass.
    pub pass_all_alive: bool,
    /// Pass even when losing on the count, as long as no point is unclear.
    pub allow_losing_pass: bool,
    /// Base seed of the worker generators. Random if unset.
    pub seed: Option<u64>,
    /// Virtual even-game playouts given to every new child.
    pub eqex: u32,
}

fn default_max_tree_size() -> usize {
    if cfg!(target_pointer_width = "64") {
        600
    } else {
        300
    }
}

impl Default for UctConfig {
    fn default() -> Self {
        UctConfig {
            threads: num_cpus::get(),
            thread_model: ThreadModel::TreeVl,
            virtual_loss: 1,
            max_tree_size: default_max_tree_size(),
            fast_alloc: true,
            pruning_threshold: 0,
            resign_threshold: 0.2,
            sure_win_threshold: 0.95,
            best2_ratio: 2.5,
            bestr_ratio: 0.02,
            max_maintime_ratio: 2.0,
            dynkomi: DynkomiKind::None,
            dynkomi_base: 7.0,
            dynkomi_moves: 200,
            dynkomi_rate: 0.5,
            dynkomi_interval: 100,
            dynkomi_mask: 3,
            pondering: false,
            policy: PolicyKind::Ucb1,
            explore_p: 0.2,
            fpu: 1.1,
            equiv_rave: 3000.0,
            crit_coef: 0.0,
            expand_p: 8,
            reportfreq: 1000,
            gamelen: 600,
            mingames: 500,
            tree_aging: 1.0,
            pass_all_alive: false,
            allow_losing_pass: false,
            seed: None,
            eqex: 10,
        }
    }
}

fn parse<T: FromStr>(name: &str, value: Option<&str>) -> Result<T, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingValue {
        name: name.to_string(),
    })?;
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Flags may be given bare (`pondering`) or with a value (`pondering=0`).
fn parse_flag(name: &str, value: Option<&str>) -> Result<bool, ConfigError> {
    match value.map(str::trim) {
        None | Some("1") | Some("true") => Ok(true),
        Some("0") | Some("false") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: v.to_string(),
        }),
    }
}

fn parse_enum<T: for<'de> Deserialize<'de>>(name: &str, value: Option<&str>) -> Result<T, ConfigError> {
    let raw: String = parse(name, value)?;
    T::deserialize(serde::de::value::StrDeserializer::<serde::de::value::Error>::new(
        &raw.to_ascii_lowercase(),
    ))
    .map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: raw,
    })
}

impl UctConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Applies a comma separated `name=value` option list.
    pub fn apply_options(&mut self, options: &str) -> Result<(), ConfigError> {
        for spec in options.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, value) = match spec.split_once('=') {
                Some((n, v)) => (n.trim(), Some(v)),
                None => (spec, None),
            };
            match name.to_ascii_lowercase().as_str() {
                "threads" => self.threads = parse(name, value)?,
                "thread_model" => self.thread_model = parse_enum(name, value)?,
                "virtual_loss" => self.virtual_loss = parse(name, value)?,
                "max_tree_size" => self.max_tree_size = parse(name, value)?,
                "fast_alloc" => self.fast_alloc = parse_flag(name, value)?,
                "pruning_threshold" => self.pruning_threshold = parse(name, value)?,
                "resign_threshold" => self.resign_threshold = parse(name, value)?,
                "sure_win_threshold" => self.sure_win_threshold = parse(name, value)?,
                "best2_ratio" => self.best2_ratio = parse(name, value)?,
                "bestr_ratio" => self.bestr_ratio = parse(name, value)?,
                "max_maintime_ratio" => self.max_maintime_ratio = parse(name, value)?,
                "dynkomi" => self.dynkomi = parse_enum(name, value)?,
                "dynkomi_base" => self.dynkomi_base = parse(name, value)?,
                "dynkomi_moves" => self.dynkomi_moves = parse(name, value)?,
                "dynkomi_rate" => self.dynkomi_rate = parse(name, value)?,
                "dynkomi_interval" => self.dynkomi_interval = parse(name, value)?,
                "dynkomi_mask" => self.dynkomi_mask = parse(name, value)?,
                "pondering" => self.pondering = parse_flag(name, value)?,
                "policy" => self.policy = parse_enum(name, value)?,
                "explore_p" => self.explore_p = parse(name, value)?,
                "fpu" => self.fpu = parse(name, value)?,
                "equiv_rave" => self.equiv_rave = parse(name, value)?,
                "crit_coef" => self.crit_coef = parse(name, value)?,
                "expand_p" => self.expand_p = parse(name, value)?,
                "reportfreq" => self.reportfreq = parse(name, value)?,
                "gamelen" => self.gamelen = parse(name, value)?,
                "mingames" => self.mingames = parse(name, value)?,
                "tree_aging" => self.tree_aging = parse(name, value)?,
                "pass_all_alive" => self.pass_all_alive = parse_flag(name, value)?,
                "allow_losing_pass" => self.allow_losing_pass = parse_flag(name, value)?,
                "seed" => self.seed = Some(parse(name, value)?),
                "eqex" => self.eqex = parse(name, value)?,
                _ => return Err(ConfigError::UnknownOption(name.to_string())),
            }
            debug!(option = name, value = value.unwrap_or(""), "applied engine option");
        }
        Ok(())
    }

    /// Memory limits in bytes derived from the configured sizes.
    ///
    /// With `fast_alloc`, a fifth of the budget is set aside for the
    /// temporary tree used when pruning, and the pruning threshold is kept
    /// between 10% and 50% of the budget. Otherwise 5% is held back for
    /// subtrees the reaper has not returned yet.
    pub fn tree_limits(&self) -> TreeLimits {
        let max = self.max_tree_size.max(1) * MIB;
        let max_pruned_size = max / 5;
        if self.fast_alloc {
            TreeLimits {
                max_tree_size: max - max_pruned_size,
                pruning_threshold: (self.pruning_threshold * MIB).clamp(max / 10, max / 2),
                max_pruned_size,
                fast_alloc: true,
            }
        } else {
            TreeLimits {
                max_tree_size: max - max / 20,
                pruning_threshold: max / 2,
                max_pruned_size,
                fast_alloc: false,
            }
        }
    }

    /// Virtual loss actually applied by the thread model.
    pub fn effective_virtual_loss(&self) -> i32 {
        match self.thread_model {
            ThreadModel::Tree => 0,
            ThreadModel::TreeVl => self.virtual_loss,
        }
    }

    pub fn build_policy(&self) -> Arc<dyn Policy> {
        match self.policy {
            PolicyKind::Ucb1 => Arc::new(Ucb1 {
                explore_p: self.explore_p,
                fpu: self.fpu,
            }),
            PolicyKind::Ucb1Amaf => Arc::new(Ucb1Amaf {
                explore_p: self.explore_p,
                fpu: self.fpu,
                equiv_rave: self.equiv_rave,
                crit_coef: self.crit_coef,
            }),
        }
    }

    pub fn build_prior<B: Board>(&self) -> Arc<dyn Prior<B>> {
        Arc::new(EvenPrior { eqex: self.eqex })
    }

    pub fn build_dynkomi(&self) -> Box<dyn Dynkomi> {
        match self.dynkomi {
            DynkomiKind::None => Box::new(NoDynkomi),
            DynkomiKind::Linear => Box::new(LinearDynkomi {
                base: self.dynkomi_base,
                moves_end: self.dynkomi_moves,
            }),
            DynkomiKind::Adaptive => Box::new(AdaptiveDynkomi {
                rate: self.dynkomi_rate,
                max: self.dynkomi_base,
                ..AdaptiveDynkomi::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = UctConfig::default();
        assert!(c.threads >= 1);
        assert_eq!(c.thread_model, ThreadModel::TreeVl);
        assert_eq!(c.effective_virtual_loss(), 1);
        assert!(c.fast_alloc);
        assert_eq!(c.expand_p, 8);
        assert_eq!(c.mingames, 500);
        assert_eq!(c.resign_threshold, 0.2);
        assert_eq!(c.build_policy().name(), "ucb1");
        assert_eq!(c.build_dynkomi().name(), "none");
    }

    #[test]
    fn test_apply_options() {
        let mut c = UctConfig::default();
        c.apply_options("threads=4, policy=UCB1AMAF,pondering,thread_model=tree,seed=9,dynkomi=linear")
            .unwrap();
        assert_eq!(c.threads, 4);
        assert_eq!(c.policy, PolicyKind::Ucb1Amaf);
        assert!(c.pondering);
        assert_eq!(c.effective_virtual_loss(), 0);
        assert_eq!(c.seed, Some(9));
        assert_eq!(c.build_policy().name(), "ucb1amaf");
        assert_eq!(c.build_dynkomi().name(), "linear");

        c.apply_options("pondering=0").unwrap();
        assert!(!c.pondering);
    }

    #[test]
    fn test_bad_options_are_rejected() {
        let mut c = UctConfig::default();
        assert!(matches!(
            c.apply_options("bogus=1"),
            Err(ConfigError::UnknownOption(name)) if name == "bogus"
        ));
        assert!(matches!(
            c.apply_options("threads"),
            Err(ConfigError::MissingValue { .. })
        ));
        assert!(matches!(
            c.apply_options("threads=many"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            c.apply_options("policy=ucb2"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_memory_limits_fast_alloc() {
        let c = UctConfig {
            max_tree_size: 100,
            ..UctConfig::default()
        };
        let l = c.tree_limits();
        assert_eq!(l.max_pruned_size, 20 * MIB);
        assert_eq!(l.max_tree_size, 80 * MIB);
        assert_eq!(l.pruning_threshold, 10 * MIB, "0 defaults to 10%");

        let c = UctConfig {
            max_tree_size: 100,
            pruning_threshold: 90,
            ..UctConfig::default()
        };
        assert_eq!(c.tree_limits().pruning_threshold, 50 * MIB, "clamped to 50%");
    }

    #[test]
    fn test_memory_limits_recycling() {
        let c = UctConfig {
            max_tree_size: 100,
            fast_alloc: false,
            ..UctConfig::default()
        };
        let l = c.tree_limits();
        assert!(!l.fast_alloc);
        assert_eq!(l.max_tree_size, 95 * MIB);
    }

    #[test]
    fn test_toml_layer() {
        let c = UctConfig::from_toml_str("threads = 2\npolicy = \"ucb1amaf\"\nfast_alloc = false\n").unwrap();
        assert_eq!(c.threads, 2);
        assert_eq!(c.policy, PolicyKind::Ucb1Amaf);
        assert!(!c.fast_alloc);
        assert_eq!(c.expand_p, 8, "missing keys keep defaults");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "resign_threshold = 0.1").unwrap();
        let c = UctConfig::load_from_path(file.path()).unwrap();
        assert_eq!(c.resign_threshold, 0.1);

        assert!(matches!(
            UctConfig::load_from_path(Path::new("/nonexistent/uct.toml")),
            Err(ConfigError::Io { .. })
        ));
        assert!(matches!(
            UctConfig::from_toml_str("threads = \"x\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
