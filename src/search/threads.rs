//! Worker pool of one search episode.
//!
//! A manager thread spawns the workers, then sleeps on a condition variable
//! until it is asked to stop or every worker has finished on its own. It
//! then raises the halt flag, joins the workers and reports how many
//! simulations each of them completed.

use crate::board::{Board, Stone};
use crate::error::{Result, UctError};
use crate::ownermap::OwnerMap;
use crate::tree::Tree;
use crate::walk::Strategy;
use crate::SearchRng;
use parking_lot::{Condvar, Mutex};
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Everything the workers of one episode share.
pub struct SearchContext<B: Board> {
    pub tree: Arc<Tree>,
    /// Root position.
    pub board: B,
    /// Color to play at the root.
    pub color: Stone,
    pub strategy: Strategy<B>,
    pub ownermap: Arc<OwnerMap>,
    /// Workers stop once the root has this many playouts; 0 for no limit.
    pub game_limit: u32,
    /// Worker `tid` seeds its generator with `seed + tid`.
    pub seed: u64,
    halt: AtomicBool,
}

impl<B: Board> SearchContext<B> {
    pub fn new(
        tree: Arc<Tree>,
        board: B,
        color: Stone,
        strategy: Strategy<B>,
        ownermap: Arc<OwnerMap>,
        game_limit: u32,
        seed: u64,
    ) -> Self {
        SearchContext {
            tree,
            board,
            color,
            strategy,
            ownermap,
            game_limit,
            seed,
            halt: AtomicBool::new(false),
        }
    }

    pub fn halt(&self) {
        self.halt.store(true, Ordering::Relaxed);
    }

    pub fn is_halted(&self) -> bool {
        self.halt.load(Ordering::Relaxed)
    }

    fn limit_reached(&self) -> bool {
        self.game_limit > 0 && self.tree.root_node().u.playouts() >= self.game_limit
    }
}

/// Simulations completed by the workers of one episode.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchReport {
    pub per_worker: Vec<u64>,
    pub total: u64,
}

#[derive(Default)]
struct Control {
    stop: bool,
    finished: usize,
}

type Signal = Arc<(Mutex<Control>, Condvar)>;

pub struct ThreadManager {
    handle: Option<JoinHandle<SearchReport>>,
    signal: Signal,
    threads: usize,
}

impl ThreadManager {
    /// Starts `threads` workers on `ctx`.
    pub fn spawn<B: Board>(ctx: Arc<SearchContext<B>>, threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let signal: Signal = Arc::new((Mutex::new(Control::default()), Condvar::new()));
        let manager_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("uct-manager".into())
            .spawn(move || manage(ctx, threads, manager_signal))
            .map_err(UctError::Spawn)?;
        Ok(ThreadManager {
            handle: Some(handle),
            signal,
            threads,
        })
    }

    /// Whether every worker has stopped on its own.
    pub fn is_done(&self) -> bool {
        self.signal.0.lock().finished >= self.threads
    }

    /// Stops the workers and waits for them.
    pub fn stop(mut self) -> SearchReport {
        self.shutdown()
    }

    fn shutdown(&mut self) -> SearchReport {
        let (lock, cvar) = &*self.signal;
        lock.lock().stop = true;
        cvar.notify_all();
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(report)) => report,
            Some(Err(_)) => {
                warn!("search manager thread panicked");
                SearchReport::default()
            }
            None => SearchReport::default(),
        }
    }
}

impl Drop for ThreadManager {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn manage<B: Board>(ctx: Arc<SearchContext<B>>, threads: usize, signal: Signal) -> SearchReport {
    let mut workers = Vec::with_capacity(threads);
    for tid in 0..threads {
        let worker_ctx = Arc::clone(&ctx);
        let worker_signal = Arc::clone(&signal);
        let spawned = thread::Builder::new()
            .name(format!("uct-worker-{}", tid))
            .spawn(move || {
                let played = worker(&worker_ctx, tid);
                let (lock, cvar) = &*worker_signal;
                lock.lock().finished += 1;
                cvar.notify_all();
                played
            });
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                warn!(tid, "failed to spawn search worker: {}", e);
                signal.0.lock().finished += 1;
            }
        }
    }
    debug!(threads = workers.len(), "search workers started");

    {
        let (lock, cvar) = &*signal;
        let mut control = lock.lock();
        while !control.stop && control.finished < threads {
            cvar.wait(&mut control);
        }
    }
    ctx.halt();

    let per_worker: Vec<u64> = workers
        .into_iter()
        .map(|h| h.join().unwrap_or_else(|_| {
            warn!("search worker panicked");
            0
        }))
        .collect();
    let total = per_worker.iter().sum();
    debug!(total, "search workers joined");
    SearchReport { per_worker, total }
}

fn worker<B: Board>(ctx: &SearchContext<B>, tid: usize) -> u64 {
    let mut rng = SearchRng::seed_from_u64(ctx.seed.wrapping_add(tid as u64));
    let mut played = 0;
    while !ctx.is_halted() && !ctx.limit_reached() {
        let done = ctx
            .strategy
            .simulate(&ctx.tree, &ctx.board, ctx.color, &ctx.ownermap, &mut rng);
        if done.is_some() {
            played += 1;
        }
    }
    played
}
