//! # Search controller
//!
//! Runs one search episode in the foreground: starts the worker pool,
//! wakes up every [`TREE_BUSYWAIT_INTERVAL`] to readjust dynamic komi,
//! report progress and decide whether to stop, then joins the workers.

pub mod stop;
pub mod threads;

pub use stop::{Candidate, Lookahead, Progress, StopParams, TREE_BUSYWAIT_INTERVAL};
pub use threads::{SearchContext, SearchReport, ThreadManager};

use crate::board::{Board, Coord};
use crate::config::UctConfig;
use crate::dynkomi::Dynkomi;
use crate::error::Result;
use crate::time::TimeInfo;
use crate::tree::{NodeId, Tree};
use crate::SearchRng;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Length of the principal variation shown in progress reports.
const PV_LENGTH: usize = 6;

/// What a finished search did.
#[derive(Clone, Debug, Default)]
pub struct SearchSummary {
    /// Playouts the root gained during the search.
    pub games: u32,
    pub elapsed: Duration,
    /// Tree size when the search stopped.
    pub nodes: usize,
    /// Mid-search dynkomi readjustments that changed the extra komi.
    pub dynkomi_changes: u32,
    pub report: SearchReport,
}

impl SearchSummary {
    pub fn games_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.report.total as f64 / secs
        } else {
            0.0
        }
    }
}

/// Absolute root playout count at which the workers of a search with
/// budget `time` stop by themselves; 0 for time budgets.
pub fn game_limit(time: TimeInfo, base_playouts: u32, mingames: u32) -> u32 {
    match time {
        TimeInfo::Games(n) => base_playouts.saturating_add(n.max(mingames)),
        TimeInfo::PerMove(_) => 0,
    }
}

fn candidate(tree: &Tree, id: NodeId, parity: i32) -> Candidate {
    let u = tree.node(id).u.load();
    Candidate {
        playouts: u.playouts,
        value: tree.node_value(parity, u.value),
    }
}

/// Runs a search on `ctx` until the stop rules say so.
///
/// Only foreground searches come through here; pondering runs the workers
/// alone and so never readjusts dynkomi.
pub fn run_search<B: Board>(
    ctx: Arc<SearchContext<B>>,
    config: &UctConfig,
    time: TimeInfo,
    dynkomi: &dyn Dynkomi,
    rng: &mut SearchRng,
) -> Result<SearchSummary> {
    let tree = Arc::clone(&ctx.tree);
    let root = tree.root();
    let base = tree.root_node().u.playouts();
    let params = StopParams {
        stop: time.stop_conditions(config.max_maintime_ratio),
        mingames: config.mingames,
        sure_win_threshold: config.sure_win_threshold,
        best2_ratio: config.best2_ratio,
        bestr_ratio: config.bestr_ratio,
    };
    if base > 0 {
        debug!(base, "search starts on a pre-simulated tree");
    }
    info!(
        color = %ctx.color,
        budget = %time,
        threads = config.threads,
        "starting search"
    );

    tree.avg_score.reset();
    let dynkomi_interval = config.dynkomi_interval.saturating_mul(config.threads as u32);
    let mut dynkomi_changes = 0;

    let start = Instant::now();
    let manager = ThreadManager::spawn(Arc::clone(&ctx), config.threads)?;
    let mut next_dynkomi = dynkomi_interval;
    let mut next_report = config.reportfreq;
    let mut fullmem_logged = false;

    loop {
        thread::sleep(TREE_BUSYWAIT_INTERVAL);
        let games = tree.root_node().u.playouts().saturating_sub(base);
        let elapsed = start.elapsed();

        if tree.use_extra_komi && dynkomi_interval > 0 && games >= next_dynkomi {
            next_dynkomi = games + dynkomi_interval;
            if let Some(komi) = dynkomi.persim(ctx.board.moves(), ctx.color, &tree) {
                let old = tree.extra_komi();
                if komi != old {
                    tree.set_extra_komi(komi);
                    dynkomi_changes += 1;
                    debug!(old, extra_komi = komi, games, "dynkomi readjusted");
                }
                // Later averages must reflect the new komi only.
                tree.avg_score.reset();
            }
        }

        let best = ctx.strategy.policy.choose(&tree, root, Coord::Resign, rng);
        let best2 = best.and_then(|b| {
            ctx.strategy
                .policy
                .choose(&tree, root, tree.node(b).coord(), rng)
        });

        if config.reportfreq > 0 && games >= next_report {
            next_report = games + config.reportfreq;
            if let Some(b) = best {
                let pv: Vec<String> = tree
                    .principal_variation(PV_LENGTH)
                    .into_iter()
                    .map(|c| ctx.board.vertex(c))
                    .collect();
                info!(
                    games,
                    best = %ctx.board.vertex(tree.node(b).coord()),
                    winrate = format_args!("{:.3}", candidate(&tree, b, 1).value),
                    pv = %pv.join(" "),
                    "search progress"
                );
            }
        }

        let tree_full = tree.is_full();
        if tree_full && !fullmem_logged {
            warn!(nodes = tree.nodes(), "tree memory exhausted, stopping search");
            fullmem_logged = true;
        }

        if manager.is_done() {
            break;
        }

        let progress = Progress {
            games,
            elapsed,
            best: best.map(|b| candidate(&tree, b, 1)),
            best2: best2.map(|b| candidate(&tree, b, 1)),
            tree_full,
        };
        let policy = &ctx.strategy.policy;
        let stop = stop::should_stop(&params, &progress, || {
            let winner = policy.winner(&tree, root, rng);
            let bestr = best
                .and_then(|b| policy.choose(&tree, b, Coord::Resign, rng))
                .map(|r| candidate(&tree, r, -1));
            Lookahead {
                bestr,
                winner_is_best: winner.map_or(true, |w| Some(w) == best),
            }
        });
        if stop {
            break;
        }
    }

    let report = manager.stop();
    let summary = SearchSummary {
        games: tree.root_node().u.playouts().saturating_sub(base),
        elapsed: start.elapsed(),
        nodes: tree.nodes(),
        dynkomi_changes,
        report,
    };
    let avg = tree.avg_score.load();
    debug!(
        avg_score = avg.value,
        scored = avg.playouts,
        extra_komi = tree.extra_komi(),
        "search finished"
    );
    info!(
        games = summary.report.total,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        games_per_sec = summary.games_per_sec() as u64,
        "search stopped"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Stone;
    use crate::dynkomi::{AdaptiveDynkomi, NoDynkomi};
    use crate::games::stones::StonesBoard;
    use crate::ownermap::OwnerMap;
    use crate::playout::LightPlayout;
    use crate::policy::Ucb1;
    use crate::prior::EvenPrior;
    use crate::tree::TreeLimits;
    use crate::walk::Strategy;
    use rand::SeedableRng;

    fn context(tree: Tree, game_limit: u32) -> Arc<SearchContext<StonesBoard>> {
        context_on(StonesBoard::new(5, 0.5), tree, game_limit)
    }

    fn context_on(board: StonesBoard, tree: Tree, game_limit: u32) -> Arc<SearchContext<StonesBoard>> {
        let color = if board.moves() % 2 == 0 {
            Stone::Black
        } else {
            Stone::White
        };
        let strategy = Strategy {
            policy: Arc::new(Ucb1::default()),
            playout: Arc::new(LightPlayout),
            prior: Arc::new(EvenPrior::default()),
            expand_p: 8,
            virtual_loss: 1,
            gamelen: 200,
        };
        tree.expand(tree.root(), &board, color, strategy.prior.as_ref());
        let ownermap = Arc::new(OwnerMap::new(board.points()));
        Arc::new(SearchContext::new(
            Arc::new(tree),
            board,
            color,
            strategy,
            ownermap,
            game_limit,
            3,
        ))
    }

    #[test]
    fn test_game_limit() {
        assert_eq!(game_limit(TimeInfo::Games(10), 0, 500), 500);
        assert_eq!(game_limit(TimeInfo::Games(2000), 100, 500), 2100);
        assert_eq!(game_limit(TimeInfo::PerMove(Duration::from_secs(1)), 100, 500), 0);
    }

    #[test]
    fn test_small_games_budget_still_plays_mingames() {
        let config = UctConfig {
            threads: 2,
            ..UctConfig::default()
        };
        let time = TimeInfo::Games(10);
        let tree = Tree::new(Stone::White, TreeLimits::with_nodes(200_000, true), 1.0).unwrap();
        let ctx = context(tree, game_limit(time, 0, config.mingames));
        let mut rng = SearchRng::seed_from_u64(1);
        let summary = run_search(Arc::clone(&ctx), &config, time, &NoDynkomi, &mut rng).unwrap();
        assert!(summary.games >= 500, "games={}", summary.games);
        assert_eq!(summary.report.total, summary.games as u64);
    }

    #[test]
    fn test_dynkomi_readjusts_during_search() {
        let config = UctConfig {
            threads: 2,
            dynkomi_interval: 25,
            ..UctConfig::default()
        };
        let mut board = StonesBoard::new(5, 0.5);
        board
            .play_sequence(&["A1", "pass", "B2", "pass", "C3", "pass", "D4", "pass", "E5", "pass"])
            .unwrap();
        let mut tree = Tree::new(Stone::White, TreeLimits::with_nodes(200_000, true), 1.0).unwrap();
        tree.use_extra_komi = true;
        let time = TimeInfo::Games(3000);
        let ctx = context_on(board, tree, game_limit(time, 0, config.mingames));
        let dynkomi = AdaptiveDynkomi {
            rate: 0.5,
            max: 20.0,
            min_games: 20,
        };
        let mut rng = SearchRng::seed_from_u64(4);
        let summary = run_search(Arc::clone(&ctx), &config, time, &dynkomi, &mut rng).unwrap();
        assert!(summary.dynkomi_changes >= 1, "changes={}", summary.dynkomi_changes);
        // Black is far ahead, so White gets extra points.
        let komi = ctx.tree.extra_komi();
        assert!(komi > 0.0 && komi <= 20.0, "extra_komi={}", komi);
    }

    #[test]
    fn test_dynkomi_left_alone_without_extra_komi() {
        let config = UctConfig {
            threads: 2,
            dynkomi_interval: 25,
            ..UctConfig::default()
        };
        let tree = Tree::new(Stone::White, TreeLimits::with_nodes(200_000, true), 1.0).unwrap();
        let time = TimeInfo::Games(1000);
        let ctx = context(tree, game_limit(time, 0, config.mingames));
        let dynkomi = AdaptiveDynkomi::default();
        let mut rng = SearchRng::seed_from_u64(5);
        let summary = run_search(Arc::clone(&ctx), &config, time, &dynkomi, &mut rng).unwrap();
        assert_eq!(summary.dynkomi_changes, 0);
        assert_eq!(ctx.tree.extra_komi(), 0.0);
    }

    #[test]
    fn test_walltime_search_respects_worst_limit() {
        let config = UctConfig {
            threads: 2,
            max_maintime_ratio: 1.5,
            ..UctConfig::default()
        };
        let time = TimeInfo::PerMove(Duration::from_millis(300));
        let tree = Tree::new(Stone::White, TreeLimits::with_nodes(500_000, true), 1.0).unwrap();
        let ctx = context(tree, 0);
        let mut rng = SearchRng::seed_from_u64(2);
        let summary = run_search(ctx, &config, time, &NoDynkomi, &mut rng).unwrap();
        assert!(summary.report.total > 0);
        // Worst limit 450 ms plus one polling interval and join slack.
        assert!(
            summary.elapsed < Duration::from_secs(2),
            "elapsed={:?}",
            summary.elapsed
        );
    }
}
