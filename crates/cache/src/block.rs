//! Expiry blocks and the live block set
//!
//! A [`Block`] collects entries whose expiry falls at or before its horizon
//! and is reclaimed as a unit once that horizon passes. [`BlockSet`] tracks
//! the live blocks and which of them currently receives insertions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::Timestamp;
use crate::entry::Entry;
use crate::scheduler::TaskHandle;

/// Identifier of a block within one cache
pub type BlockId = u64;

/// Append-only group of entries sharing one reclamation deadline.
#[derive(Debug)]
pub struct Block<V> {
    id: BlockId,
    created_at: Timestamp,
    horizon: Timestamp,
    members: Mutex<Vec<Arc<Entry<V>>>>,
    reclaim_task: Mutex<Option<TaskHandle>>,
}

impl<V> Block<V> {
    pub fn new(id: BlockId, created_at: Timestamp, span_ms: u64) -> Self {
        Self {
            id,
            created_at,
            horizon: created_at.saturating_add(span_ms),
            members: Mutex::new(Vec::new()),
            reclaim_task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn horizon(&self) -> Timestamp {
        self.horizon
    }

    /// Whether an entry expiring at `expires_at` may join this block.
    #[inline]
    pub fn covers(&self, expires_at: Timestamp) -> bool {
        expires_at <= self.horizon
    }

    /// Delay from `now` until the block is due for reclamation.
    pub fn reclaim_delay(&self, now: Timestamp) -> Duration {
        Duration::from_millis(self.horizon.saturating_sub(now))
    }

    pub fn push(&self, entry: Arc<Entry<V>>) {
        debug_assert!(self.covers(entry.expires_at()));
        self.members.lock().push(entry);
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Members whose own expiry has already lapsed at `now`.
    pub fn expired_members(&self, now: Timestamp) -> usize {
        self.members
            .lock()
            .iter()
            .filter(|entry| !entry.is_live_at(now))
            .count()
    }

    pub fn set_reclaim_task(&self, handle: TaskHandle) {
        *self.reclaim_task.lock() = Some(handle);
    }

    /// Cancels the reclamation task, if one was scheduled.
    pub fn cancel_reclaim(&self) {
        if let Some(handle) = self.reclaim_task.lock().take() {
            handle.cancel();
        }
    }
}

/// The live blocks of a cache.
///
/// The current block, when present, is the most recently created one and has
/// the largest horizon.
#[derive(Debug)]
pub struct BlockSet<V> {
    live: HashMap<BlockId, Arc<Block<V>>>,
    current: Option<Arc<Block<V>>>,
    // Blocks whose reclamation task could not be scheduled
    pending: Vec<BlockId>,
    next_id: BlockId,
}

impl<V> Default for BlockSet<V> {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            current: None,
            pending: Vec::new(),
            next_id: 0,
        }
    }
}

impl<V> BlockSet<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current block, if it can take an entry expiring at `expires_at`.
    pub fn accepting(&self, expires_at: Timestamp) -> Option<&Arc<Block<V>>> {
        self.current
            .as_ref()
            .filter(|block| block.covers(expires_at))
    }

    /// Picks the block for an entry expiring at `expires_at`, opening a new
    /// current block spanning `span_ms` from `now` when needed.
    ///
    /// Returns the block and whether it was created by this call.
    pub fn place(
        &mut self,
        now: Timestamp,
        expires_at: Timestamp,
        span_ms: u64,
    ) -> (Arc<Block<V>>, bool) {
        if let Some(block) = self.accepting(expires_at) {
            return (Arc::clone(block), false);
        }

        let id = self.next_id;
        self.next_id += 1;
        let block = Arc::new(Block::new(id, now, span_ms));
        self.live.insert(id, Arc::clone(&block));
        self.current = Some(Arc::clone(&block));
        (block, true)
    }

    /// Removes a block from the set. Returns `None` if it was already gone.
    pub fn reclaim(&mut self, id: BlockId) -> Option<Arc<Block<V>>> {
        let block = self.live.remove(&id)?;
        if self.current.as_ref().is_some_and(|current| current.id == id) {
            self.current = None;
        }
        self.pending.retain(|pending| *pending != id);
        Some(block)
    }

    pub fn get(&self, id: BlockId) -> Option<&Arc<Block<V>>> {
        self.live.get(&id)
    }

    /// Parks a block that still needs a reclamation task.
    pub fn park(&mut self, id: BlockId) {
        if self.live.contains_key(&id) && !self.pending.contains(&id) {
            self.pending.push(id);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn take_pending(&mut self) -> Vec<BlockId> {
        std::mem::take(&mut self.pending)
    }

    pub fn current_id(&self) -> Option<BlockId> {
        self.current.as_ref().map(|block| block.id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Total members across live blocks, expired or not.
    pub fn member_count(&self) -> usize {
        self.live.values().map(|block| block.len()).sum()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Arc<Block<V>>> {
        self.live.values()
    }
}
