use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Visit count and running mean of some quantity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveStats {
    pub playouts: u32,
    pub value: f32,
}

impl MoveStats {
    pub const fn new(value: f32, playouts: u32) -> Self {
        MoveStats { playouts, value }
    }

    pub fn is_empty(&self) -> bool {
        self.playouts == 0
    }

    /// Folds `playouts` results of value `result` into the mean.
    pub fn add_result(&mut self, result: f32, playouts: u32) {
        if playouts == 0 {
            return;
        }
        self.playouts += playouts;
        self.value += (result - self.value) * playouts as f32 / self.playouts as f32;
    }

    /// Weighted average of two records.
    pub fn merge(&mut self, other: MoveStats) {
        self.add_result(other.value, other.playouts);
    }

    /// Divides the visit count, keeping the mean.
    pub fn age(&mut self, factor: f32) {
        self.playouts = (self.playouts as f32 / factor) as u32;
    }

    fn pack(self) -> u64 {
        ((self.playouts as u64) << 32) | self.value.to_bits() as u64
    }

    fn unpack(bits: u64) -> Self {
        MoveStats {
            playouts: (bits >> 32) as u32,
            value: f32::from_bits(bits as u32),
        }
    }
}

/// A [`MoveStats`] shared between worker threads.
///
/// Both fields live in one 64-bit word and every update is a
/// compare-and-swap loop, so concurrent merges never tear a record and no
/// increment is lost. Updates on different records are unordered.
#[derive(Debug, Default)]
pub struct AtomicStats(AtomicU64);

impl AtomicStats {
    pub fn new(stats: MoveStats) -> Self {
        AtomicStats(AtomicU64::new(stats.pack()))
    }

    pub fn load(&self) -> MoveStats {
        MoveStats::unpack(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, stats: MoveStats) {
        self.0.store(stats.pack(), Ordering::Relaxed);
    }

    pub fn playouts(&self) -> u32 {
        self.load().playouts
    }

    pub fn value(&self) -> f32 {
        self.load().value
    }

    pub fn add_result(&self, result: f32, playouts: u32) {
        self.update(|s| s.add_result(result, playouts));
    }

    pub fn merge(&self, other: MoveStats) {
        self.update(|s| s.merge(other));
    }

    pub fn reset(&self) {
        self.store(MoveStats::default());
    }

    fn update(&self, mut f: impl FnMut(&mut MoveStats)) {
        // The closure always yields a new value, so this cannot fail.
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let mut s = MoveStats::unpack(bits);
                f(&mut s);
                Some(s.pack())
            });
    }
}

/// An `f32` cell readable by workers while the controller adjusts it.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        AtomicF32(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}
