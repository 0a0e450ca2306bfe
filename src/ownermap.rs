//! Ownership statistics gathered from playout end positions.
//!
//! Every finished simulation adds the final owner of each point. With
//! enough samples this tells which points are settled, which groups are
//! dead and roughly what the score is, which is what decides whether
//! passing is safe.

use crate::board::{Board, Coord, Stone};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

/// Share of samples one color must own for a point to count as sure.
pub const GJ_THRES: f32 = 0.8;
/// Samples needed before ownership judgements are trusted.
pub const GJ_MINGAMES: u32 = 500;
/// Threshold used when judging the status of groups.
pub const GROUP_THRES: f32 = 0.67;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointJudgement {
    Dame,
    Black,
    White,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupStatus {
    Alive,
    Dead,
    Unknown,
}

/// Status of every group on a board, keyed by the group's lowest point.
#[derive(Clone, Debug, Default)]
pub struct GroupJudgement {
    pub groups: Vec<(Coord, GroupStatus)>,
}

impl GroupJudgement {
    /// Representative stones of the groups with `status`.
    pub fn of_status(&self, status: GroupStatus) -> Vec<Coord> {
        self.groups
            .iter()
            .filter(|(_, s)| *s == status)
            .map(|(c, _)| *c)
            .collect()
    }
}

/// Per-point tally of final owners. Shared by all workers of a search.
#[derive(Debug)]
pub struct OwnerMap {
    playouts: AtomicU32,
    counts: Vec<[AtomicU32; 3]>,
}

impl OwnerMap {
    pub fn new(points: usize) -> Self {
        OwnerMap {
            playouts: AtomicU32::new(0),
            counts: (0..points).map(|_| Default::default()).collect(),
        }
    }

    pub fn points(&self) -> usize {
        self.counts.len()
    }

    pub fn playouts(&self) -> u32 {
        self.playouts.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.playouts.store(0, Ordering::Relaxed);
        for point in &self.counts {
            for count in point {
                count.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Records the final owners of one simulation.
    pub fn fill(&self, owners: &[Stone]) {
        for (point, owner) in self.counts.iter().zip(owners) {
            point[owner.index()].fetch_add(1, Ordering::Relaxed);
        }
        self.playouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, c: Coord, color: Stone) -> u32 {
        c.point()
            .and_then(|p| self.counts.get(p))
            .map_or(0, |point| point[color.index()].load(Ordering::Relaxed))
    }

    /// Who owns `c` in at least `thres` of the samples.
    pub fn judge_point(&self, c: Coord, thres: f32) -> PointJudgement {
        let n = self.playouts() as f32;
        if n == 0.0 {
            return PointJudgement::Unknown;
        }
        let share = |color| self.count(c, color) as f32 / n;
        if share(Stone::None) >= thres {
            PointJudgement::Dame
        } else if share(Stone::Black) >= thres {
            PointJudgement::Black
        } else if share(Stone::White) >= thres {
            PointJudgement::White
        } else {
            PointJudgement::Unknown
        }
    }

    /// Ownership leaning of `c` in `[-1, 1]`: 1 for Black, -1 for White.
    pub fn estimate_point(&self, c: Coord) -> f32 {
        let n = self.playouts();
        if n == 0 {
            return 0.0;
        }
        (self.count(c, Stone::Black) as f32 - self.count(c, Stone::White) as f32) / n as f32
    }

    /// Judges every group on `board`: alive if its points end up owned by
    /// its own color, dead if by the opponent, unknown otherwise or when
    /// its stones disagree.
    pub fn judge_groups<B: Board>(&self, board: &B, thres: f32) -> GroupJudgement {
        let mut seen = HashSet::new();
        let mut judgement = GroupJudgement::default();

        for p in 0..board.points() {
            let c = Coord::Point(p as u16);
            let color = board.at(c);
            if color == Stone::None || seen.contains(&c) {
                continue;
            }
            let stones = board.group_stones(c);
            let mut status = None;
            for &s in &stones {
                seen.insert(s);
                let judged = match (self.judge_point(s, thres), color) {
                    (PointJudgement::Black, Stone::Black) | (PointJudgement::White, Stone::White) => {
                        GroupStatus::Alive
                    }
                    (PointJudgement::Black, _) | (PointJudgement::White, _) => GroupStatus::Dead,
                    _ => GroupStatus::Unknown,
                };
                status = match status {
                    None => Some(judged),
                    Some(prev) if prev == judged => Some(prev),
                    Some(_) => Some(GroupStatus::Unknown),
                };
            }
            let leader = stones.iter().copied().min_by_key(|s| s.point()).unwrap_or(c);
            judgement
                .groups
                .push((leader, status.unwrap_or(GroupStatus::Unknown)));
        }
        judgement
    }

    /// Groups whose stones will most likely be removed.
    pub fn dead_groups<B: Board>(&self, board: &B) -> (Vec<Coord>, Vec<Coord>) {
        let judgement = self.judge_groups(board, GROUP_THRES);
        (
            judgement.of_status(GroupStatus::Dead),
            judgement.of_status(GroupStatus::Unknown),
        )
    }

    /// Owner of `c` for score estimation. Unclear stones count as alive,
    /// unclear empty points as dame.
    pub fn score_est_point<B: Board>(&self, board: &B, c: Coord) -> PointJudgement {
        match self.judge_point(c, GJ_THRES) {
            PointJudgement::Unknown => match board.at(c) {
                Stone::Black => PointJudgement::Black,
                Stone::White => PointJudgement::White,
                Stone::None => PointJudgement::Dame,
            },
            j => j,
        }
    }

    /// Score estimate from ownership, White's lead including komi.
    pub fn score_est<B: Board>(&self, board: &B) -> f32 {
        let mut lead = board.komi();
        for p in 0..board.points() {
            match self.score_est_point(board, Coord::Point(p as u16)) {
                PointJudgement::White => lead += 1.0,
                PointJudgement::Black => lead -= 1.0,
                _ => {}
            }
        }
        lead
    }
}
