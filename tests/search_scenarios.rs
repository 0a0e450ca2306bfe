//! End-to-end checks of the search machinery: budgets, final move choice,
//! concurrent expansion and cancellation.

use rand::SeedableRng;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use uct::games::stones::StonesBoard;
use uct::ownermap::OwnerMap;
use uct::playout::LightPlayout;
use uct::policy::{Policy, Ucb1};
use uct::prior::EvenPrior;
use uct::search::stop::{self, Candidate, Lookahead, Progress, StopParams};
use uct::search::{SearchContext, ThreadManager, TREE_BUSYWAIT_INTERVAL};
use uct::time::{Limit, StopConditions};
use uct::tree::{Expansion, TreeLimits};
use uct::walk::Strategy;
use uct::{Board, Coord, SearchRng, Stone, TimeInfo, Tree, UctConfig, UctEngine};

fn strategy() -> Strategy<StonesBoard> {
    Strategy {
        policy: Arc::new(Ucb1::default()),
        playout: Arc::new(LightPlayout),
        prior: Arc::new(EvenPrior::default()),
        expand_p: 8,
        virtual_loss: 1,
        gamelen: 400,
    }
}

#[test]
fn tiny_games_budget_still_plays_mingames() {
    let mut engine = UctEngine::new(
        UctConfig {
            threads: 2,
            seed: Some(11),
            max_tree_size: 32,
            ..UctConfig::default()
        },
        Arc::new(LightPlayout),
        Arc::new(EvenPrior::default()),
    );
    let board = StonesBoard::new(5, 0.5);
    let time: TimeInfo = "=10".parse().unwrap();
    let mv = engine.genmove(&board, time, Stone::Black, false).unwrap();
    assert!(board.legal_moves(Stone::Black).contains(&mv), "mv={:?}", mv);

    let summary = engine.last_search().unwrap();
    assert!(summary.games >= 500, "games={}", summary.games);
    // Workers count their own simulations; the root counts every backup.
    assert_eq!(summary.report.total, summary.games as u64);
}

#[test]
fn most_visited_move_wins_without_ratio_checks() {
    let board = StonesBoard::new(3, 0.5);
    let tree = Tree::new(Stone::White, TreeLimits::with_nodes(1_000, true), 1.0).unwrap();
    tree.expand(tree.root(), &board, Stone::Black, &EvenPrior { eqex: 0 });
    let visited = tree.find_child(tree.root(), board.parse_vertex("B2").unwrap()).unwrap();
    let lucky = tree.find_child(tree.root(), board.parse_vertex("A3").unwrap()).unwrap();
    tree.node(visited).u.add_result(0.9, 10_000);
    tree.node(lucky).u.add_result(0.95, 10);

    let policy = Ucb1::default();
    let mut rng = SearchRng::seed_from_u64(5);
    let best = policy.choose(&tree, tree.root(), Coord::Resign, &mut rng).unwrap();
    assert_eq!(best, visited);
    let best2 = policy
        .choose(&tree, tree.root(), tree.node(best).coord(), &mut rng)
        .unwrap();
    assert_eq!(best2, lucky);

    let params = StopParams {
        stop: StopConditions {
            desired: Limit::Playouts(10_000),
            worst: Limit::Playouts(20_000),
        },
        mingames: 500,
        sure_win_threshold: 0.99,
        best2_ratio: 0.0,
        bestr_ratio: 0.0,
    };
    let candidate = |id| Candidate {
        playouts: tree.node(id).u.playouts(),
        value: tree.node_value(1, tree.node(id).u.value()),
    };
    let progress = Progress {
        games: 10_010,
        elapsed: Duration::from_secs(3),
        best: Some(candidate(best)),
        best2: Some(candidate(best2)),
        tree_full: false,
    };
    let winner = policy.winner(&tree, tree.root(), &mut rng);
    assert_eq!(winner, None, "ucb1 has no value-based winner");
    assert!(stop::should_stop(&params, &progress, || Lookahead {
        bestr: None,
        winner_is_best: true,
    }));
}

#[test]
fn racing_expansions_allocate_once() {
    let board = StonesBoard::new(3, 0.5);
    let prior = EvenPrior::default();
    for round in 0..1000 {
        let tree = Tree::new(Stone::White, TreeLimits::with_nodes(64, true), 1.0).unwrap();
        let barrier = Barrier::new(2);
        let (tree_ref, board_ref, prior_ref, barrier_ref) = (&tree, &board, &prior, &barrier);
        let outcomes: Vec<Expansion> = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(move || {
                        barrier_ref.wait();
                        tree_ref.expand(tree_ref.root(), board_ref, Stone::Black, prior_ref)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let expanded = outcomes.iter().filter(|&&o| o == Expansion::Expanded).count();
        assert_eq!(expanded, 1, "round {}: outcomes {:?}", round, outcomes);
        assert_eq!(
            tree.children(tree.root()).map(|c| c.len()),
            Some(board.points() + 1),
            "round {}",
            round
        );
        assert_eq!(tree.nodes(), board.points() + 2, "round {}", round);
    }
}

#[test]
fn halt_stops_workers_within_one_interval() {
    let board = StonesBoard::new(9, 7.5);
    let tree = Tree::new(Stone::White, TreeLimits::with_nodes(500_000, true), 1.0).unwrap();
    let s = strategy();
    tree.expand(tree.root(), &board, Stone::Black, s.prior.as_ref());
    // Playouts left over from an earlier search.
    let base = 250;
    tree.root_node().u.add_result(0.5, base);
    let ownermap = Arc::new(OwnerMap::new(board.points()));
    let ctx = Arc::new(SearchContext::new(
        Arc::new(tree),
        board,
        Stone::Black,
        s,
        ownermap,
        0,
        99,
    ));

    let manager = ThreadManager::spawn(Arc::clone(&ctx), 4).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(!manager.is_done(), "workers without a game limit run until halted");
    let start = Instant::now();
    let report = manager.stop();
    let waited = start.elapsed();

    assert!(ctx.is_halted());
    assert!(
        waited < TREE_BUSYWAIT_INTERVAL,
        "workers took {:?} to stop, interval {:?}",
        waited,
        TREE_BUSYWAIT_INTERVAL
    );
    assert_eq!(report.per_worker.len(), 4);
    assert!(
        report.per_worker.iter().all(|&n| n > 0),
        "every worker ran: {:?}",
        report.per_worker
    );
    let root_gain = (ctx.tree.root_node().u.playouts() - base) as u64;
    assert_eq!(
        report.per_worker.iter().sum::<u64>(),
        root_gain,
        "per-worker counts {:?} against root gain",
        report.per_worker
    );
    assert_eq!(report.total, root_gain);
}
