//! Tree book: statistics of well-explored nodes persisted between runs.
//!
//! A book is a JSON-lines file. Every line names a node by the sequence of
//! moves leading to it from the root and carries its statistics records.
//! Loading replays each path on a copy of the board, expanding nodes on
//! demand, and merges the stored records into whatever the tree already
//! knows. Expanded nodes also record the hash of their position, so a book
//! saved for another game is refused instead of merged.

use super::{NodeId, Tree};
use crate::board::{Board, Coord, Move};
use crate::error::{Result, UctError};
use crate::prior::Prior;
use crate::stats::MoveStats;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    /// Moves from the root to the node.
    pub path: Vec<Coord>,
    /// Position hash, present for expanded nodes only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<u64>,
    pub u: MoveStats,
    pub prior: MoveStats,
    pub amaf: MoveStats,
}

fn book_error(path: &Path, message: impl ToString) -> UctError {
    UctError::Book {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

impl Tree {
    /// Writes every node with at least `min_playouts` playouts. Subtrees
    /// below the threshold are skipped whole. Returns the number of
    /// entries written.
    pub fn save_book(&self, path: &Path, min_playouts: u32) -> Result<usize> {
        let file = File::create(path).map_err(|e| book_error(path, e))?;
        let mut out = BufWriter::new(file);
        let mut written = 0;

        let mut stack: Vec<(NodeId, Vec<Coord>)> = vec![(self.root(), Vec::new())];
        while let Some((id, line)) = stack.pop() {
            let node = self.node(id);
            if id != self.root() && node.u.playouts() < min_playouts {
                continue;
            }
            let entry = BookEntry {
                path: line.clone(),
                hash: node.children().is_some().then(|| node.hash()),
                u: node.u.load(),
                prior: node.prior.load(),
                amaf: node.amaf.load(),
            };
            serde_json::to_writer(&mut out, &entry).map_err(|e| book_error(path, e))?;
            out.write_all(b"\n").map_err(|e| book_error(path, e))?;
            written += 1;

            if let Some(children) = self.children(id) {
                for child in children.iter().rev() {
                    let mut next = line.clone();
                    next.push(self.node(child).coord());
                    stack.push((child, next));
                }
            }
        }
        out.flush().map_err(|e| book_error(path, e))?;
        info!(entries = written, path = %path.display(), "saved tree book");
        Ok(written)
    }

    /// Merges a book into the tree. `board` is the root position. Entries
    /// whose path cannot be replayed, or whose position hash differs, are
    /// skipped; a root entry with a different hash fails the whole load.
    /// Returns the number of entries merged.
    pub fn load_book<B: Board>(&self, path: &Path, board: &B, prior: &dyn Prior<B>) -> Result<usize> {
        let file = File::open(path).map_err(|e| book_error(path, e))?;
        let mut merged = 0;

        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| book_error(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: BookEntry = serde_json::from_str(&line)
                .map_err(|e| book_error(path, format!("line {}: {}", lineno + 1, e)))?;

            let Some((id, position)) = self.replay(&entry.path, board, prior) else {
                warn!(line = lineno + 1, "book path does not fit the position, skipped");
                continue;
            };
            if let Some(hash) = entry.hash.filter(|&h| h != position.hash()) {
                if entry.path.is_empty() {
                    return Err(book_error(
                        path,
                        format!("saved for a different position (hash {:016x})", hash),
                    ));
                }
                warn!(line = lineno + 1, hash, "book position hash differs, skipped");
                continue;
            }
            let node = self.node(id);
            node.u.merge(entry.u);
            node.prior.merge(entry.prior);
            node.amaf.merge(entry.amaf);
            merged += 1;
        }
        info!(entries = merged, path = %path.display(), "loaded tree book");
        Ok(merged)
    }

    /// Walks `line` from the root, creating nodes as needed. Returns the
    /// node and the position it stands for.
    fn replay<B: Board>(
        &self,
        line: &[Coord],
        board: &B,
        prior: &dyn Prior<B>,
    ) -> Option<(NodeId, B)> {
        let mut board = board.clone();
        let mut color = self.root_color().other();
        let mut id = self.root();
        for &coord in line {
            id = self.get_or_create_child(id, coord, &board, color, prior)?;
            board.play(Move::new(coord, color)).ok()?;
            color = color.other();
        }
        Some((id, board))
    }
}

#[cfg(test)]
mod tests {
    use super::BookEntry;
    use crate::board::{Board, Move, Stone};
    use crate::games::stones::StonesBoard;
    use crate::prior::EvenPrior;
    use crate::stats::MoveStats;
    use crate::tree::{Tree, TreeLimits};

    fn sample_tree(board: &StonesBoard) -> Tree {
        let tree = Tree::new(Stone::White, TreeLimits::with_nodes(1_000, true), 1.0).unwrap();
        let prior = EvenPrior::default();
        tree.expand(tree.root(), board, Stone::Black, &prior);
        tree.root_node().u.store(MoveStats::new(0.55, 120));
        let a = board.parse_vertex("B2").unwrap();
        let id = tree.find_child(tree.root(), a).unwrap();
        tree.node(id).u.store(MoveStats::new(0.6, 80));
        tree.node(id).amaf.store(MoveStats::new(0.58, 90));

        let mut after = board.clone();
        after.play(Move::new(a, Stone::Black)).unwrap();
        tree.expand(id, &after, Stone::White, &prior);
        let reply = tree.find_child(id, board.parse_vertex("A1").unwrap()).unwrap();
        tree.node(reply).u.store(MoveStats::new(0.3, 40));
        tree
    }

    #[test]
    fn test_book_round_trip_restores_paths() {
        let board = StonesBoard::new(3, 0.5);
        let tree = sample_tree(&board);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.book");

        let written = tree.save_book(&path, 30).unwrap();
        assert_eq!(written, 3, "root, B2 and B2-A1");

        let fresh = Tree::new(Stone::White, TreeLimits::with_nodes(1_000, true), 1.0).unwrap();
        let merged = fresh.load_book(&path, &board, &EvenPrior::default()).unwrap();
        assert_eq!(merged, 3);
        assert_eq!(fresh.root_node().u.load(), MoveStats::new(0.55, 120));

        let b2 = fresh.find_child(fresh.root(), board.parse_vertex("B2").unwrap()).unwrap();
        assert_eq!(fresh.node(b2).u.load(), MoveStats::new(0.6, 80));
        assert_eq!(fresh.node(b2).amaf.load(), MoveStats::new(0.58, 90));
        let a1 = fresh.find_child(b2, board.parse_vertex("A1").unwrap()).unwrap();
        assert_eq!(fresh.node(a1).u.load(), MoveStats::new(0.3, 40));
        // Prior of a recreated child is the fresh prior merged with the stored one.
        assert_eq!(fresh.node(a1).prior.playouts(), 20);
    }

    #[test]
    fn test_book_threshold_skips_subtrees() {
        let board = StonesBoard::new(3, 0.5);
        let tree = sample_tree(&board);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.book");
        assert_eq!(tree.save_book(&path, 100).unwrap(), 1, "only the root");
    }

    #[test]
    fn test_book_records_expanded_positions() {
        let board = StonesBoard::new(3, 0.5);
        let tree = sample_tree(&board);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.book");
        tree.save_book(&path, 30).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<BookEntry> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let mut after = board.clone();
        after.play(Move::new(board.parse_vertex("B2").unwrap(), Stone::Black)).unwrap();
        assert_eq!(entries[0].hash, Some(board.hash()));
        assert_eq!(entries[1].hash, Some(after.hash()));
        assert_ne!(after.hash(), board.hash());
        assert_eq!(entries[2].hash, None, "leaf B2-A1 was never expanded");
    }

    #[test]
    fn test_book_for_another_position_is_refused() {
        let board = StonesBoard::new(3, 0.5);
        let tree = sample_tree(&board);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.book");
        tree.save_book(&path, 30).unwrap();

        let mut other = board.clone();
        other.play_sequence(&["C3", "pass"]).unwrap();
        let fresh = Tree::new(Stone::White, TreeLimits::with_nodes(1_000, true), 1.0).unwrap();
        let err = fresh.load_book(&path, &other, &EvenPrior::default()).unwrap_err();
        assert!(err.to_string().contains("different position"), "err={}", err);
        assert_eq!(fresh.root_node().u.playouts(), 0);
    }

    #[test]
    fn test_stale_entry_is_skipped() {
        let board = StonesBoard::new(3, 0.5);
        let tree = sample_tree(&board);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.book");
        tree.save_book(&path, 30).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut entries: Vec<BookEntry> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        entries[1].hash = Some(0xdead_beef);
        let edited: String = entries
            .iter()
            .map(|e| serde_json::to_string(e).unwrap() + "\n")
            .collect();
        std::fs::write(&path, edited).unwrap();

        let fresh = Tree::new(Stone::White, TreeLimits::with_nodes(1_000, true), 1.0).unwrap();
        let merged = fresh.load_book(&path, &board, &EvenPrior::default()).unwrap();
        assert_eq!(merged, 2, "root and B2-A1");
        let b2 = fresh.find_child(fresh.root(), board.parse_vertex("B2").unwrap()).unwrap();
        assert_eq!(fresh.node(b2).u.playouts(), 0);
    }

    #[test]
    fn test_missing_book_is_an_error() {
        let board = StonesBoard::new(3, 0.5);
        let tree = Tree::new(Stone::White, TreeLimits::with_nodes(100, true), 1.0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = tree
            .load_book(&dir.path().join("absent.book"), &board, &EvenPrior::default())
            .unwrap_err();
        assert!(err.to_string().contains("absent.book"), "err={}", err);
    }

    #[test]
    fn test_corrupt_book_reports_line() {
        let board = StonesBoard::new(3, 0.5);
        let tree = Tree::new(Stone::White, TreeLimits::with_nodes(100, true), 1.0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.book");
        std::fs::write(&path, "{not json}\n").unwrap();
        let err = tree.load_book(&path, &board, &EvenPrior::default()).unwrap_err();
        assert!(err.to_string().contains("line 1"), "err={}", err);
    }
}
