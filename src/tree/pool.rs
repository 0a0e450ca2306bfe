use super::node::{ChildRange, Node, NodeId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::{debug, trace};

/// Nodes per lazily materialized segment.
const SEGMENT_NODES: u32 = 1 << 14;

/// Fixed-capacity storage for tree nodes addressed by [`NodeId`].
///
/// Blocks of sibling nodes are carved sequentially from the pool. The
/// capacity is fixed up front; the backing segments are only materialized
/// when first handed out, so a large budget costs nothing until it is used.
///
/// With `recycle` set, released blocks go to a per-length free list and are
/// handed out again before fresh space is carved. Without it the pool is a
/// pure bump arena, reclaimed wholesale by [`NodePool::clear`] or
/// [`NodePool::truncate`].
pub(crate) struct NodePool {
    segments: Box<[OnceLock<Box<[Node]>>]>,
    capacity: u32,
    next: AtomicU32,
    live: AtomicUsize,
    free: Mutex<HashMap<u32, Vec<u32>>>,
    recycle: bool,
}

impl NodePool {
    pub(crate) fn new(capacity: usize, recycle: bool) -> Self {
        let capacity = capacity.clamp(1, (NodeId::NONE - 1) as usize) as u32;
        let nsegments = capacity.div_ceil(SEGMENT_NODES) as usize;
        NodePool {
            segments: (0..nsegments).map(|_| OnceLock::new()).collect(),
            capacity,
            next: AtomicU32::new(0),
            live: AtomicUsize::new(0),
            free: Mutex::new(HashMap::new()),
            recycle,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Nodes currently handed out.
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// One past the highest slot ever carved.
    pub(crate) fn high_water(&self) -> usize {
        self.next.load(Ordering::Relaxed) as usize
    }

    fn segment(&self, index: usize) -> &[Node] {
        self.segments[index].get_or_init(|| {
            trace!(segment = index, "materializing node segment");
            (0..SEGMENT_NODES).map(|_| Node::default()).collect()
        })
    }

    pub(crate) fn get(&self, id: NodeId) -> &Node {
        let seg = (id.0 / SEGMENT_NODES) as usize;
        &self.segment(seg)[(id.0 % SEGMENT_NODES) as usize]
    }

    /// Reserves `len` contiguous slots, or `None` when the pool is exhausted.
    pub(crate) fn alloc(&self, len: u32) -> Option<ChildRange> {
        debug_assert!(len > 0);
        if self.recycle {
            let reused = self.free.lock().get_mut(&len).and_then(Vec::pop);
            if let Some(first) = reused {
                self.live.fetch_add(len as usize, Ordering::Relaxed);
                return Some(ChildRange { first, len });
            }
        }

        let capacity = self.capacity;
        let first = self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                cur.checked_add(len).filter(|&end| end <= capacity)
            })
            .ok()?;
        let last = first + len - 1;
        for seg in (first / SEGMENT_NODES)..=(last / SEGMENT_NODES) {
            self.segment(seg as usize);
        }
        self.live.fetch_add(len as usize, Ordering::Relaxed);
        Some(ChildRange { first, len })
    }

    /// Gives a block back. Only meaningful for recycling pools; a bump arena
    /// merely forgets about it until the next clear.
    pub(crate) fn release(&self, range: ChildRange) {
        self.live.fetch_sub(range.len as usize, Ordering::Relaxed);
        if self.recycle {
            self.free.lock().entry(range.len).or_default().push(range.first);
        }
    }

    /// Forgets every block.
    pub(crate) fn clear(&self) {
        self.truncate(0);
    }

    /// Keeps slots `0..len` and forgets everything above.
    pub(crate) fn truncate(&self, len: usize) {
        self.next.store(len as u32, Ordering::Relaxed);
        self.live.store(len, Ordering::Relaxed);
        self.free.lock().clear();
    }
}

/// Background thread returning discarded subtrees to a recycling pool.
///
/// Freeing a large tree node by node can take long enough to lose on time,
/// so promotion only hands the detached block over and returns immediately.
pub(crate) struct Reaper {
    tx: Sender<ChildRange>,
    pending: Arc<AtomicUsize>,
}

impl Reaper {
    pub(crate) fn spawn(pool: Arc<NodePool>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<ChildRange>();
        let pending = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pending);
        // The thread is detached: it drains the queue, then exits once the
        // owning tree drops the sender. The pool lives as long as it does.
        thread::Builder::new()
            .name("uct-reaper".into())
            .spawn(move || {
                for block in rx {
                    let freed = reap(&pool, block);
                    trace!(freed, "reclaimed discarded subtree");
                    counter.fetch_sub(1, Ordering::Release);
                }
                debug!("reaper finished");
            })?;
        Ok(Reaper { tx, pending })
    }

    pub(crate) fn reclaim(&self, block: ChildRange) {
        self.pending.fetch_add(1, Ordering::Acquire);
        if self.tx.send(block).is_err() {
            self.pending.fetch_sub(1, Ordering::Release);
        }
    }

    /// Whether every submitted subtree has been returned to the pool.
    pub(crate) fn is_idle(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }
}

/// Releases `block` and every block below it. Returns the node count.
fn reap(pool: &NodePool, block: ChildRange) -> usize {
    let mut stack = vec![block];
    let mut freed = 0;
    while let Some(block) = stack.pop() {
        // Collect the grandchildren before the block can be handed out again.
        for id in block.iter() {
            if let Some(children) = pool.get(id).detach_children() {
                stack.push(children);
            }
        }
        pool.release(block);
        freed += block.len();
    }
    freed
}
