use std::sync::Arc;
use uct::games::stones::StonesBoard;
use uct::playout::LightPlayout;
use uct::prior::EvenPrior;
use uct::{Board, Coord, Move, Stone, TimeInfo, UctConfig, UctEngine, UctError};

fn engine(seed: u64) -> UctEngine<StonesBoard> {
    UctEngine::new(
        UctConfig {
            threads: 2,
            seed: Some(seed),
            max_tree_size: 32,
            ..UctConfig::default()
        },
        Arc::new(LightPlayout),
        Arc::new(EvenPrior::default()),
    )
}

#[test]
fn genmove_returns_legal_move_and_keeps_subtree() {
    let mut e = engine(1);
    let board = StonesBoard::new(5, 0.5);
    let mv = e.genmove(&board, TimeInfo::Games(2_000), Stone::Black, false).unwrap();
    assert!(board.legal_moves(Stone::Black).contains(&mv), "mv={:?}", mv);

    let tree = e.tree().expect("tree survives genmove");
    assert_eq!(tree.root_color(), Stone::Black);
    assert_eq!(tree.root_node().coord(), mv);
    // Every child left at the root hangs off the promoted node.
    let root = tree.root();
    for child in tree.children(root).expect("chosen move was expanded").iter() {
        assert_eq!(tree.node(child).parent(), Some(root));
    }
    let result = e.result().unwrap();
    assert_eq!(result.color, Stone::Black);
    assert!(result.playouts > 0);
    assert!((0.0..=1.0).contains(&result.value));
}

#[test]
fn configured_eqex_reaches_new_children() {
    let mut e = UctEngine::from_config(
        UctConfig {
            threads: 2,
            seed: Some(7),
            max_tree_size: 32,
            eqex: 3,
            ..UctConfig::default()
        },
        Arc::new(LightPlayout),
    );
    let board = StonesBoard::new(5, 0.5);
    e.genmove(&board, TimeInfo::Games(2_000), Stone::Black, false).unwrap();

    let tree = e.tree().unwrap();
    let children = tree.children(tree.root()).expect("chosen move was expanded");
    for child in children.iter() {
        assert_eq!(tree.node(child).prior.playouts(), 3);
    }
}

#[test]
fn opponent_move_promotes_its_subtree() {
    let mut e = engine(2);
    let mut board = StonesBoard::new(5, 0.5);
    let mv = e.genmove(&board, TimeInfo::Games(3_000), Stone::Black, false).unwrap();
    board.play(Move::new(mv, Stone::Black)).unwrap();

    let (reply, reply_playouts) = {
        let tree = e.tree().unwrap();
        let reply = tree.most_visited_child(tree.root()).unwrap();
        (tree.node(reply).coord(), tree.node(reply).u.playouts())
    };
    assert!(reply_playouts > 0);
    e.notify_play(&board, Move::new(reply, Stone::White)).unwrap();

    let tree = e.tree().expect("subtree kept");
    assert_eq!(tree.root_color(), Stone::White);
    assert_eq!(tree.root_node().coord(), reply);
    assert_eq!(tree.root_node().u.playouts(), reply_playouts);
}

#[test]
fn same_color_twice_is_rejected() {
    let mut e = engine(3);
    let board = StonesBoard::new(5, 0.5);
    e.genmove(&board, TimeInfo::Games(500), Stone::Black, false).unwrap();
    let err = e
        .genmove(&board, TimeInfo::Games(500), Stone::Black, false)
        .unwrap_err();
    assert!(
        matches!(err, UctError::NonAlternatingPlay { color: Stone::Black, .. }),
        "err={}",
        err
    );
}

#[test]
fn passes_when_the_board_is_settled_and_won() {
    let mut e = engine(4);
    let mut board = StonesBoard::new(3, 0.5);
    board
        .play_sequence(&[
            "B1", "pass", "C1", "pass", "A2", "pass", "B2", "pass", "C2", "pass", "A3", "pass",
            "B3", "pass",
        ])
        .unwrap();
    let mv = e.genmove(&board, TimeInfo::Games(1_000), Stone::Black, false).unwrap();
    assert_eq!(mv, Coord::Pass);
    assert!(e.dead_group_list(&board).unwrap().is_empty());
}

#[test]
fn book_carries_statistics_to_another_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("opening.book");

    let mut writer = engine(5);
    let mut board = StonesBoard::new(5, 0.5);
    let mv = writer.genmove(&board, TimeInfo::Games(2_000), Stone::Black, false).unwrap();
    board.play(Move::new(mv, Stone::Black)).unwrap();
    let saved = writer.save_book(&path, 50).unwrap();
    assert!(saved >= 1);
    let root_playouts = writer.result().unwrap().playouts;

    let mut reader = engine(6);
    let merged = reader.load_book(&path, &board, Stone::White).unwrap();
    assert_eq!(merged, saved);
    assert_eq!(reader.result().unwrap().playouts, root_playouts);
}
