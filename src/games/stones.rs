//! Stones-only Go: stones are placed on empty points and never captured.
//! Since nothing can be captured, filling an opponent's one-point eye would
//! be suicide and is illegal.
//!
//! This keeps the rules small while preserving what the search needs from a
//! Go board: passes, area scoring with komi, one-point eyes, connected
//! groups and a well-defined final ownership of every point. Playouts end
//! once both players pass, which happens as soon as only eyes are left.

use crate::board::{Board, Coord, Move, Score, Stone};
use crate::error::BoardError;
use std::fmt;

/// Column letters, skipping `I` as is customary for Go boards.
const COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

#[derive(Clone, Debug)]
pub struct StonesBoard {
    size: usize,
    stones: Vec<Stone>,
    komi: f32,
    moves: usize,
    last_move: Option<Move>,
    last_move2: Option<Move>,
    hash: u64,
}

impl StonesBoard {
    /// Empty `size`×`size` board.
    pub fn new(size: usize, komi: f32) -> Self {
        let size = size.clamp(1, COLUMNS.len());
        StonesBoard {
            size,
            stones: vec![Stone::None; size * size],
            komi,
            moves: 0,
            last_move: None,
            last_move2: None,
            hash: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn coord(&self, x: usize, y: usize) -> Coord {
        Coord::Point((y * self.size + x) as u16)
    }

    fn xy(&self, p: usize) -> (usize, usize) {
        (p % self.size, p / self.size)
    }

    fn neighbors(&self, p: usize) -> impl Iterator<Item = usize> {
        let (x, y) = self.xy(p);
        let size = self.size;
        [
            (x > 0).then(|| p - 1),
            (x + 1 < size).then(|| p + 1),
            (y > 0).then(|| p - size),
            (y + 1 < size).then(|| p + size),
        ]
        .into_iter()
        .flatten()
    }

    fn point(&self, c: Coord) -> Option<usize> {
        c.point().filter(|&p| p < self.stones.len())
    }

    /// Parses a vertex such as `D4`, `pass` or `resign`.
    pub fn parse_vertex(&self, s: &str) -> Result<Coord, BoardError> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "pass" => return Ok(Coord::Pass),
            "resign" => return Ok(Coord::Resign),
            _ => {}
        }
        let bad = || BoardError::BadVertex(s.to_string());
        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(bad)?.to_ascii_uppercase();
        let x = COLUMNS
            .iter()
            .position(|&c| c as char == letter)
            .filter(|&x| x < self.size)
            .ok_or_else(bad)?;
        let row: usize = chars.as_str().parse().map_err(|_| bad())?;
        if row == 0 || row > self.size {
            return Err(bad());
        }
        Ok(self.coord(x, row - 1))
    }

    /// Plays a list of vertices alternately, Black first. Handy for setting
    /// up positions.
    pub fn play_sequence(&mut self, vertices: &[&str]) -> Result<(), BoardError> {
        let mut color = Stone::Black;
        for v in vertices {
            let coord = self.parse_vertex(v)?;
            self.play(Move::new(coord, color))?;
            color = color.other();
        }
        Ok(())
    }

    /// Area owner of each point, with the stones in `dead` removed.
    fn area(&self, dead: &[Coord]) -> Vec<Stone> {
        let mut stones = self.stones.clone();
        for &c in dead {
            if let Some(p) = self.point(c) {
                stones[p] = Stone::None;
            }
        }

        let mut owner = stones.clone();
        let mut seen = vec![false; stones.len()];
        for start in 0..stones.len() {
            if stones[start] != Stone::None || seen[start] {
                continue;
            }
            // Flood the empty region and record which colors border it.
            let mut region = vec![start];
            let mut borders = [false; 3];
            seen[start] = true;
            let mut i = 0;
            while i < region.len() {
                let p = region[i];
                i += 1;
                for n in self.neighbors(p) {
                    match stones[n] {
                        Stone::None if !seen[n] => {
                            seen[n] = true;
                            region.push(n);
                        }
                        Stone::None => {}
                        s => borders[s.index()] = true,
                    }
                }
            }
            let region_owner = match (borders[Stone::Black.index()], borders[Stone::White.index()]) {
                (true, false) => Stone::Black,
                (false, true) => Stone::White,
                _ => Stone::None,
            };
            for p in region {
                owner[p] = region_owner;
            }
        }
        owner
    }
}

fn zobrist(p: usize, color: Stone) -> u64 {
    let mut z = (p as u64 * 3 + color.index() as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl Board for StonesBoard {
    fn points(&self) -> usize {
        self.stones.len()
    }

    fn legal_moves(&self, color: Stone) -> Vec<Coord> {
        (0..self.stones.len())
            .map(|p| Coord::Point(p as u16))
            .filter(|&c| self.at(c) == Stone::None && !self.is_one_point_eye(c, color.other()))
            .collect()
    }

    fn play(&mut self, mv: Move) -> Result<(), BoardError> {
        match mv.coord {
            Coord::Pass => {}
            Coord::Resign => {
                return Err(BoardError::IllegalMove {
                    coord: mv.coord,
                    color: mv.color,
                })
            }
            Coord::Point(_) => {
                let p = self.point(mv.coord).ok_or(BoardError::OffBoard(mv.coord))?;
                if self.stones[p] != Stone::None
                    || mv.color == Stone::None
                    || self.is_one_point_eye(mv.coord, mv.color.other())
                {
                    return Err(BoardError::IllegalMove {
                        coord: mv.coord,
                        color: mv.color,
                    });
                }
                self.stones[p] = mv.color;
                self.hash ^= zobrist(p, mv.color);
            }
        }
        self.moves += 1;
        self.last_move2 = self.last_move;
        self.last_move = Some(mv);
        Ok(())
    }

    fn hash(&self) -> u64 {
        self.hash
    }

    fn at(&self, c: Coord) -> Stone {
        self.point(c).map_or(Stone::None, |p| self.stones[p])
    }

    fn owner(&self, c: Coord) -> Stone {
        let Some(p) = self.point(c) else {
            return Stone::None;
        };
        match self.stones[p] {
            Stone::None => {
                let mut colors = self.neighbors(p).map(|n| self.stones[n]);
                match colors.next() {
                    Some(first) if first != Stone::None && colors.all(|s| s == first) => first,
                    _ => Stone::None,
                }
            }
            s => s,
        }
    }

    fn is_one_point_eye(&self, c: Coord, color: Stone) -> bool {
        self.point(c).is_some_and(|p| {
            self.stones[p] == Stone::None && self.neighbors(p).all(|n| self.stones[n] == color)
        })
    }

    fn last_move(&self) -> Option<Move> {
        self.last_move
    }

    fn moves(&self) -> usize {
        self.moves
    }

    fn komi(&self) -> f32 {
        self.komi
    }

    fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    fn group_stones(&self, c: Coord) -> Vec<Coord> {
        let Some(start) = self.point(c) else {
            return Vec::new();
        };
        let color = self.stones[start];
        if color == Stone::None {
            return Vec::new();
        }
        let mut seen = vec![false; self.stones.len()];
        let mut group = vec![start];
        seen[start] = true;
        let mut i = 0;
        while i < group.len() {
            let p = group[i];
            i += 1;
            for n in self.neighbors(p) {
                if !seen[n] && self.stones[n] == color {
                    seen[n] = true;
                    group.push(n);
                }
            }
        }
        group.into_iter().map(|p| Coord::Point(p as u16)).collect()
    }

    fn official_score(&self, dead: &[Coord]) -> Score {
        let area = self.area(dead);
        let mut black = 0usize;
        let mut white = 0usize;
        let mut dame = 0usize;
        for s in area {
            match s {
                Stone::Black => black += 1,
                Stone::White => white += 1,
                Stone::None => dame += 1,
            }
        }
        Score {
            white_lead: white as f32 - black as f32 + self.komi,
            dame,
        }
    }

    fn is_game_over(&self) -> bool {
        matches!(
            (self.last_move, self.last_move2),
            (Some(a), Some(b)) if a.coord.is_pass() && b.coord.is_pass()
        )
    }

    fn vertex(&self, c: Coord) -> String {
        match self.point(c) {
            Some(p) => {
                let (x, y) = self.xy(p);
                format!("{}{}", COLUMNS[x] as char, y + 1)
            }
            None => c.to_string(),
        }
    }
}

impl fmt::Display for StonesBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in (0..self.size).rev() {
            write!(f, "{:>2} ", y + 1)?;
            for x in 0..self.size {
                let ch = match self.stones[y * self.size + x] {
                    Stone::None => '.',
                    Stone::Black => 'X',
                    Stone::White => 'O',
                };
                write!(f, "{} ", ch)?;
            }
            writeln!(f)?;
        }
        write!(f, "   ")?;
        for x in 0..self.size {
            write!(f, "{} ", COLUMNS[x] as char)?;
        }
        writeln!(f)
    }
}
