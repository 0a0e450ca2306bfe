//! # UCT engine
//!
//! Stateful facade over the search: keeps the tree between moves, promotes
//! the played move to the root, ponders during the opponent's turn, and
//! answers the end-of-game questions (is passing safe, which groups are
//! dead) from the ownership map.
//!
//! The tree is shared with worker threads through an `Arc`. Restructuring
//! it (promotion, garbage collection) goes through `Arc::get_mut`, so it
//! only succeeds once every worker has been joined.

use crate::board::{Board, Coord, Move, Stone};
use crate::config::UctConfig;
use crate::dynkomi::{self, Dynkomi};
use crate::error::{Result, UctError};
use crate::ownermap::{OwnerMap, PointJudgement, GJ_MINGAMES, GJ_THRES};
use crate::playout::PlayoutPolicy;
use crate::prior::Prior;
use crate::search::{self, SearchContext, SearchSummary, ThreadManager};
use crate::time::TimeInfo;
use crate::tree::{NodeId, Tree};
use crate::walk::Strategy;
use crate::SearchRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Official counts with more neutral points than this are not final.
const MAX_FINAL_DAME: usize = 20;

/// Snapshot of the tree root, reported after a move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineResult {
    /// Player of the root move.
    pub color: Stone,
    pub coord: Coord,
    pub playouts: u32,
    /// Win rate of `color`.
    pub value: f32,
    pub extra_komi: f32,
}

impl fmt::Display for EngineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {:.2} {:.1}",
            self.color, self.coord, self.playouts, self.value, self.extra_komi
        )
    }
}

struct Pondering {
    manager: ThreadManager,
    color: Stone,
}

pub struct UctEngine<B: Board> {
    config: UctConfig,
    tree: Option<Arc<Tree>>,
    ownermap: Arc<OwnerMap>,
    strategy: Strategy<B>,
    dynkomi: Box<dyn Dynkomi>,
    rng: SearchRng,
    /// Extra komi carried over when the tree is rebuilt.
    initial_extra_komi: f32,
    pondering: Option<Pondering>,
    dead_groups: Vec<Coord>,
    /// Move number at which `dead_groups` was computed.
    dead_groups_move: Option<usize>,
    last_search: Option<SearchSummary>,
}

impl<B: Board> UctEngine<B> {
    /// Engine with the priors described by `config`.
    pub fn from_config(config: UctConfig, playout: Arc<dyn PlayoutPolicy<B>>) -> Self {
        let prior = config.build_prior();
        Self::new(config, playout, prior)
    }

    pub fn new(
        config: UctConfig,
        playout: Arc<dyn PlayoutPolicy<B>>,
        prior: Arc<dyn Prior<B>>,
    ) -> Self {
        let strategy = Strategy {
            policy: config.build_policy(),
            playout,
            prior,
            expand_p: config.expand_p,
            virtual_loss: config.effective_virtual_loss(),
            gamelen: config.gamelen,
        };
        let rng = match config.seed {
            Some(seed) => SearchRng::seed_from_u64(seed),
            None => SearchRng::seed_from_u64(rand::random()),
        };
        info!(
            policy = strategy.policy.name(),
            threads = config.threads,
            thread_model = ?config.thread_model,
            dynkomi = ?config.dynkomi,
            "uct engine ready"
        );
        UctEngine {
            dynkomi: config.build_dynkomi(),
            config,
            tree: None,
            ownermap: Arc::new(OwnerMap::new(0)),
            strategy,
            rng,
            initial_extra_komi: 0.0,
            pondering: None,
            dead_groups: Vec::new(),
            dead_groups_move: None,
            last_search: None,
        }
    }

    pub fn config(&self) -> &UctConfig {
        &self.config
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_deref()
    }

    /// Statistics of the most recent foreground search.
    pub fn last_search(&self) -> Option<&SearchSummary> {
        self.last_search.as_ref()
    }

    pub fn is_pondering(&self) -> bool {
        self.pondering.is_some()
    }

    fn tree_mut(&mut self) -> Result<&mut Tree> {
        self.tree
            .as_mut()
            .and_then(Arc::get_mut)
            .ok_or(UctError::TreeBusy)
    }

    fn setup_state(&mut self, color: Stone) -> Result<()> {
        let tree = Tree::new(color.other(), self.config.tree_limits(), self.config.tree_aging)?;
        if self.initial_extra_komi != 0.0 {
            tree.set_extra_komi(self.initial_extra_komi);
        }
        if let Some(seed) = self.config.seed {
            self.rng = SearchRng::seed_from_u64(seed);
        }
        debug!(%color, "fresh search state");
        self.tree = Some(Arc::new(tree));
        Ok(())
    }

    fn reset_state(&mut self) {
        self.tree = None;
    }

    /// Drops the tree, carrying its extra komi over to the next one.
    fn reset_keeping_komi(&mut self) {
        if let Some(tree) = &self.tree {
            self.initial_extra_komi = tree.extra_komi();
        }
        self.reset_state();
    }

    /// Makes sure there is a tree whose root has `color` to play, and
    /// clears the ownership map.
    pub fn prepare_move(&mut self, board: &B, color: Stone) -> Result<()> {
        match &self.tree {
            Some(tree) => {
                let root_color = tree.root_color();
                if color != root_color.other() {
                    return Err(UctError::NonAlternatingPlay { color, root_color });
                }
            }
            None => self.setup_state(color)?,
        }
        if self.ownermap.points() != board.points() {
            self.ownermap = Arc::new(OwnerMap::new(board.points()));
        } else {
            self.ownermap.reset();
        }
        Ok(())
    }

    fn genmove_setup(&mut self, board: &B, color: Stone) -> Result<()> {
        self.prepare_move(board, color)?;
        let use_extra_komi = dynkomi::mask_allows(self.config.dynkomi_mask, color);
        let tree = self.tree_mut()?;
        tree.use_extra_komi = use_extra_komi;
        if use_extra_komi {
            let komi = self.dynkomi.permove(board.moves(), color, self.tree_ref()?);
            self.tree_ref()?.set_extra_komi(komi);
        } else {
            self.tree_ref()?.set_extra_komi(0.0);
        }
        Ok(())
    }

    fn tree_ref(&self) -> Result<&Tree> {
        self.tree.as_deref().ok_or(UctError::TreeBusy)
    }

    fn context(&mut self, board: B, color: Stone, game_limit: u32) -> Result<Arc<SearchContext<B>>> {
        let tree = self.tree.clone().ok_or(UctError::TreeBusy)?;
        if tree.root_node().is_leaf() {
            tree.expand(tree.root(), &board, color, self.strategy.prior.as_ref());
        }
        Ok(Arc::new(SearchContext::new(
            tree,
            board,
            color,
            self.strategy.clone(),
            Arc::clone(&self.ownermap),
            game_limit,
            self.rng.random(),
        )))
    }

    /// Searches the current tree in the foreground.
    fn search(&mut self, board: &B, time: TimeInfo, color: Stone) -> Result<SearchSummary> {
        let base = self.tree_ref()?.root_node().u.playouts();
        let limit = search::game_limit(time, base, self.config.mingames);
        let ctx = self.context(board.clone(), color, limit)?;
        let summary = search::run_search(ctx, &self.config, time, self.dynkomi.as_ref(), &mut self.rng)?;
        self.last_search = Some(summary.clone());
        Ok(summary)
    }

    /// Runs single-threaded simulations until the ownership map has seen
    /// enough games to judge the position.
    fn seed_ownermap(&mut self, board: &B, color: Stone) -> Result<()> {
        let tree = self.tree.clone().ok_or(UctError::TreeBusy)?;
        let mut attempts = 0;
        while self.ownermap.playouts() < GJ_MINGAMES {
            attempts += 1;
            if attempts > GJ_MINGAMES * 10 {
                warn!(
                    playouts = self.ownermap.playouts(),
                    "ownership map could not be seeded"
                );
                break;
            }
            self.strategy
                .simulate(&tree, board, color, &self.ownermap, &mut self.rng);
        }
        Ok(())
    }

    /// Picks the move to play after a search. Returns the chosen node too,
    /// unless the move is a pass or resignation without one.
    fn search_result(
        &mut self,
        board: &B,
        color: Stone,
        pass_all_alive: bool,
    ) -> Result<(Coord, Option<NodeId>)> {
        let tree = self.tree.as_deref().ok_or(UctError::TreeBusy)?;
        let root = tree.root();
        let Some(best) = self
            .strategy
            .policy
            .choose(tree, root, Coord::Resign, &mut self.rng)
        else {
            return Ok((Coord::Pass, None));
        };
        let node = tree.node(best);
        let coord = node.coord();
        let u = node.u.load();
        let value = tree.node_value(1, u.value);
        info!(
            best = %board.vertex(coord),
            value = format_args!("{:.4}", value),
            playouts = u.playouts,
            root_playouts = tree.root_node().u.playouts(),
            extra_komi = tree.extra_komi(),
            "search winner"
        );

        if value < self.config.resign_threshold
            && !coord.is_pass()
            && (u.playouts > GJ_MINGAMES || tree.root_node().u.playouts() > GJ_MINGAMES * 2)
            && !tree.is_untrustworthy()
        {
            info!(value, "resigning");
            return Ok((Coord::Resign, None));
        }

        let opponent_passed = board.moves() > 1 && board.last_move().is_some_and(|m| m.coord.is_pass());
        if opponent_passed {
            match self.pass_is_safe(board, color, pass_all_alive)? {
                Ok(()) => {
                    let tree = self.tree_ref()?;
                    let pass = tree.find_child(tree.root(), Coord::Pass);
                    let dead = self.dead_stones(board);
                    let black_lead = -board.official_score(&dead).white_lead;
                    info!(black_lead, "opponent passed and passing looks safe");
                    return Ok((Coord::Pass, pass));
                }
                Err(reason) => info!(reason, "refusing to pass"),
            }
        }
        Ok((coord, Some(best)))
    }

    fn dead_stones(&self, board: &B) -> Vec<Coord> {
        self.dead_groups
            .iter()
            .flat_map(|&c| board.group_stones(c))
            .collect()
    }

    /// Whether `color` can pass without losing, judging dead stones from
    /// the ownership map. The inner error names the reason for refusing.
    pub fn pass_is_safe(
        &mut self,
        board: &B,
        color: Stone,
        pass_all_alive: bool,
    ) -> Result<std::result::Result<(), &'static str>> {
        if self.tree.is_none() {
            self.prepare_move(board, color)?;
        }
        self.seed_ownermap(board, color)?;

        let (dead, unclear) = self.ownermap.dead_groups(board);
        self.dead_groups = dead;
        self.dead_groups_move = Some(board.moves());
        if !unclear.is_empty() {
            return Ok(Err("unclear groups"));
        }

        if pass_all_alive {
            if self
                .dead_groups
                .iter()
                .any(|&c| board.at(c) == color.other())
            {
                return Ok(Err("need to remove opponent dead groups first"));
            }
            // Our own dead stones are alive when everything is.
            self.dead_groups.clear();
        }

        if self.config.allow_losing_pass {
            let unclear_point = (0..board.points()).any(|p| {
                self.ownermap.judge_point(Coord::Point(p as u16), GJ_THRES) == PointJudgement::Unknown
            });
            return Ok(if unclear_point {
                Err("unclear point, clarify first")
            } else {
                Ok(())
            });
        }

        let from_color = |white_lead: f32| {
            if color == Stone::Black {
                -white_lead
            } else {
                white_lead
            }
        };
        let estimate = from_color(self.ownermap.score_est(board));
        if estimate < 0.0 {
            return Ok(Err("losing on score estimate"));
        }

        let official = board.official_score(&self.dead_stones(board));
        let score = from_color(official.white_lead);
        if !pass_all_alive {
            if score != estimate {
                return Ok(Err("score estimate and official score don't agree"));
            }
            if official.dame > MAX_FINAL_DAME {
                return Ok(Err("too many dames"));
            }
        }
        Ok(if score >= 0.0 {
            Ok(())
        } else {
            Err("losing on official score")
        })
    }

    /// Searches and returns the move for `color`. `board` is the current
    /// position; the move is not played on it.
    pub fn genmove(
        &mut self,
        board: &B,
        time: TimeInfo,
        color: Stone,
        pass_all_alive: bool,
    ) -> Result<Coord> {
        let pass_all_alive = pass_all_alive || self.config.pass_all_alive;
        self.stop_pondering();
        self.genmove_setup(board, color)?;
        let summary = self.search(board, time, color)?;
        let (coord, best) = self.search_result(board, color, pass_all_alive)?;
        info!(
            coord = %board.vertex(coord),
            games = summary.games,
            games_per_sec = summary.games_per_sec() as u64,
            "genmove"
        );

        let Some(best) = best else {
            if coord.is_pass() {
                self.reset_keeping_komi();
            } else {
                self.reset_state();
            }
            return Ok(coord);
        };

        if self.tree_ref()?.is_untrustworthy() {
            debug!("throwing away untrustworthy tree");
            self.reset_keeping_komi();
        } else {
            self.tree_mut()?.promote(best);
        }

        if self.config.pondering && self.tree.is_some() && !coord.is_pass() {
            self.start_pondering(board, color.other())?;
        }
        Ok(coord)
    }

    /// Keeps searching in the background with `color` to play. `board` is
    /// the position before the root move of the tree.
    fn start_pondering(&mut self, board: &B, color: Stone) -> Result<()> {
        let tree = self.tree_mut()?;
        let limits = *tree.limits();
        if tree.nodes_size() >= limits.pruning_threshold {
            let report = tree.garbage_collect(0);
            debug!(kept = report.kept, cut = report.cut, "garbage-collected tree before pondering");
        }
        let tree = self.tree_ref()?;
        let mut b = board.clone();
        b.play(Move::new(tree.root_node().coord(), tree.root_color()))?;

        let ctx = self.context(b, color, 0)?;
        let manager = ThreadManager::spawn(ctx, self.config.threads)?;
        debug!(%color, "pondering started");
        self.pondering = Some(Pondering { manager, color });
        Ok(())
    }

    fn stop_pondering(&mut self) {
        if let Some(pondering) = self.pondering.take() {
            let report = pondering.manager.stop();
            debug!(
                color = %pondering.color,
                games = report.total,
                "pondering stopped"
            );
        }
    }

    /// Stops background thinking. The tree is kept.
    pub fn stop(&mut self) {
        self.stop_pondering();
    }

    /// Updates the tree for a move about to be played on `board`.
    pub fn notify_play(&mut self, board: &B, mv: Move) -> Result<()> {
        self.stop_pondering();
        match &self.tree {
            None => self.prepare_move(board, mv.color)?,
            Some(tree) => {
                let root_color = tree.root_color();
                if mv.color != root_color.other() {
                    return Err(UctError::NonAlternatingPlay {
                        color: mv.color,
                        root_color,
                    });
                }
            }
        }

        if mv.coord.is_resign() {
            self.reset_state();
            return Ok(());
        }

        let tree = self.tree_mut()?;
        if tree.is_untrustworthy() {
            debug!("not promoting in an untrustworthy tree");
            self.reset_keeping_komi();
        } else if !tree.promote_at(mv.coord) {
            debug!(coord = %board.vertex(mv.coord), "no node to promote, rebuilding tree");
            self.reset_keeping_komi();
        }
        Ok(())
    }

    /// Forgets the tree after a move was taken back.
    pub fn undo(&mut self) {
        if self.tree.is_none() {
            return;
        }
        self.stop_pondering();
        self.reset_keeping_komi();
    }

    /// Root summary of the current tree.
    pub fn result(&self) -> Option<EngineResult> {
        let tree = self.tree.as_deref()?;
        let root = tree.root_node();
        Some(EngineResult {
            color: tree.root_color(),
            coord: root.coord(),
            playouts: root.u.playouts(),
            value: tree.node_value(-1, root.u.value()),
            extra_komi: if tree.use_extra_komi {
                tree.extra_komi()
            } else {
                0.0
            },
        })
    }

    /// Searches each legal move of `color` on its own and returns the win
    /// rate `color` gets by playing it, `None` when it cannot be played or
    /// the opponent has no reply.
    pub fn evaluate(
        &mut self,
        board: &B,
        time: TimeInfo,
        color: Stone,
    ) -> Result<Vec<(Coord, Option<f32>)>> {
        let mut values = Vec::new();
        for coord in board.legal_moves(color) {
            let value = self.evaluate_one(board, time, coord, color)?;
            values.push((coord, value));
        }
        Ok(values)
    }

    fn evaluate_one(
        &mut self,
        board: &B,
        time: TimeInfo,
        coord: Coord,
        color: Stone,
    ) -> Result<Option<f32>> {
        let mut b = board.clone();
        if b.play(Move::new(coord, color)).is_err() {
            return Ok(None);
        }
        let reply = color.other();
        self.stop_pondering();
        self.reset_state();
        self.prepare_move(&b, reply)?;
        self.search(&b, time, reply)?;

        let tree = self.tree.as_deref().ok_or(UctError::TreeBusy)?;
        let value = self
            .strategy
            .policy
            .choose(tree, tree.root(), Coord::Resign, &mut self.rng)
            .map(|best| 1.0 - tree.node_value(1, tree.node(best).u.value()));
        self.reset_state();
        Ok(value)
    }

    /// Searches like [`genmove`](Self::genmove) without playing, and
    /// returns up to `n` most visited moves with their win rates.
    pub fn best_moves(
        &mut self,
        board: &B,
        time: TimeInfo,
        color: Stone,
        n: usize,
    ) -> Result<Vec<(Coord, f32)>> {
        self.stop_pondering();
        self.reset_state();
        self.genmove_setup(board, color)?;
        self.search(board, time, color)?;

        let tree = self.tree_ref()?;
        let mut moves: Vec<(Coord, u32, f32)> = tree
            .children(tree.root())
            .map(|children| {
                children
                    .iter()
                    .map(|c| tree.node(c))
                    .filter(|node| !node.is_invalid() && node.u.playouts() > 0)
                    .map(|node| {
                        let u = node.u.load();
                        (node.coord(), u.playouts, tree.node_value(1, u.value))
                    })
                    .collect()
            })
            .unwrap_or_default();
        moves.sort_by(|a, b| b.1.cmp(&a.1));
        let best = moves.into_iter().take(n).map(|(c, _, v)| (c, v)).collect();
        self.reset_state();
        Ok(best)
    }

    /// Leaders of the groups the engine considers dead at the end of the
    /// game.
    pub fn dead_group_list(&mut self, board: &B) -> Result<Vec<Coord>> {
        self.stop_pondering();
        if self.config.pass_all_alive {
            return Ok(Vec::new());
        }

        // Normally the last genmove was a pass and the list is already
        // known; recomputing could give a different answer.
        if board.moves() > 0 && self.dead_groups_move == Some(board.moves() - 1) {
            return Ok(self.dead_groups.clone());
        }

        // Mock state with Black to play, discarded afterwards so that a
        // following genmove does not see a non-alternating tree.
        self.reset_state();
        self.prepare_move(board, Stone::Black)?;
        self.seed_ownermap(board, Stone::Black)?;
        let (dead, _unclear) = self.ownermap.dead_groups(board);
        for &c in &dead {
            debug!(group = %board.vertex(c), "dead group");
        }
        self.reset_state();
        Ok(dead)
    }

    /// The ownership map, seeded by fresh simulations when it has too few
    /// games to be meaningful.
    pub fn ownermap(&mut self, board: &B) -> Result<&OwnerMap> {
        if self.ownermap.points() != board.points() || self.ownermap.playouts() < GJ_MINGAMES {
            let color = board.last_move().map_or(Stone::Black, |m| m.color.other());
            self.stop_pondering();
            self.reset_state();
            self.prepare_move(board, color)?;
            self.seed_ownermap(board, color)?;
        }
        Ok(self.ownermap.as_ref())
    }

    /// Saves the current tree as a book. Returns the number of entries.
    pub fn save_book(&mut self, path: &Path, min_playouts: u32) -> Result<usize> {
        self.stop_pondering();
        match self.tree.as_deref() {
            Some(tree) => tree.save_book(path, min_playouts),
            None => {
                warn!("no tree to save");
                Ok(0)
            }
        }
    }

    /// Merges a book into the tree for `board` with `color` to play.
    pub fn load_book(&mut self, path: &Path, board: &B, color: Stone) -> Result<usize> {
        self.stop_pondering();
        self.prepare_move(board, color)?;
        let prior = Arc::clone(&self.strategy.prior);
        self.tree_ref()?.load_book(path, board, prior.as_ref())
    }
}

impl<B: Board> Drop for UctEngine<B> {
    fn drop(&mut self) {
        self.stop_pondering();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::stones::StonesBoard;
    use crate::playout::LightPlayout;
    use crate::prior::EvenPrior;

    fn engine(config: UctConfig) -> UctEngine<StonesBoard> {
        UctEngine::new(
            UctConfig {
                seed: Some(7),
                threads: 2,
                max_tree_size: 16,
                ..config
            },
            Arc::new(LightPlayout),
            Arc::new(EvenPrior::default()),
        )
    }

    #[test]
    fn test_prepare_move_rejects_same_color_twice() {
        let mut e = engine(UctConfig::default());
        let board = StonesBoard::new(5, 0.5);
        e.prepare_move(&board, Stone::Black).unwrap();
        assert_eq!(e.tree().unwrap().root_color(), Stone::White);
        let err = e.prepare_move(&board, Stone::White).unwrap_err();
        assert!(matches!(
            err,
            UctError::NonAlternatingPlay {
                color: Stone::White,
                root_color: Stone::White
            }
        ));
    }

    #[test]
    fn test_undo_keeps_extra_komi() {
        let mut e = engine(UctConfig::default());
        let board = StonesBoard::new(5, 0.5);
        e.prepare_move(&board, Stone::Black).unwrap();
        e.tree().unwrap().set_extra_komi(3.5);
        e.undo();
        assert!(e.tree().is_none());
        e.prepare_move(&board, Stone::Black).unwrap();
        assert_eq!(e.tree().unwrap().extra_komi(), 3.5);
    }

    #[test]
    fn test_notify_play_resign_drops_tree() {
        let mut e = engine(UctConfig::default());
        let board = StonesBoard::new(5, 0.5);
        e.notify_play(&board, Move::new(Coord::Resign, Stone::Black)).unwrap();
        assert!(e.tree().is_none());
        assert!(e.result().is_none());
    }

    #[test]
    fn test_notify_play_without_node_rebuilds() {
        let mut e = engine(UctConfig::default());
        let board = StonesBoard::new(5, 0.5);
        let c3 = board.parse_vertex("C3").unwrap();
        // A fresh tree has no children to promote.
        e.notify_play(&board, Move::new(c3, Stone::Black)).unwrap();
        assert!(e.tree().is_none());
    }

    #[test]
    fn test_dead_group_list_on_settled_board() {
        let mut e = engine(UctConfig::default());
        let mut board = StonesBoard::new(3, 0.5);
        board
            .play_sequence(&["B2", "A1", "B1", "pass", "A2", "pass"])
            .unwrap();
        // Without captures every stone stays on the board.
        assert!(e.dead_group_list(&board).unwrap().is_empty());
        assert!(e.tree().is_none(), "mock state must be discarded");

        let mut e = engine(UctConfig {
            pass_all_alive: true,
            ..UctConfig::default()
        });
        e.dead_groups = vec![board.parse_vertex("A1").unwrap()];
        e.dead_groups_move = Some(board.moves() - 1);
        assert!(e.dead_group_list(&board).unwrap().is_empty());
    }

    #[test]
    fn test_dead_group_list_reuses_pass_decision() {
        let mut e = engine(UctConfig::default());
        let mut board = StonesBoard::new(3, 0.5);
        board.play_sequence(&["B2", "A1", "B1", "pass"]).unwrap();
        let a1 = board.parse_vertex("A1").unwrap();
        e.dead_groups = vec![a1];
        e.dead_groups_move = Some(board.moves() - 1);
        assert_eq!(e.dead_group_list(&board).unwrap(), vec![a1]);
    }

    #[test]
    fn test_ownermap_is_seeded_on_demand() {
        let mut e = engine(UctConfig::default());
        let mut board = StonesBoard::new(3, 0.5);
        board.play_sequence(&["B2"]).unwrap();
        let map = e.ownermap(&board).unwrap();
        assert!(map.playouts() >= GJ_MINGAMES);
        assert_eq!(map.judge_point(board.parse_vertex("B2").unwrap(), GJ_THRES), PointJudgement::Black);
    }
}
