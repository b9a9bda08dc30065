//! Sequential buffer pool.
//!
//! A fixed ring of equally sized byte buffers shared by one filling task and
//! one draining task. The filler walks the ring in order and waits until the
//! slot under its cursor is free; the drainer follows behind and waits until
//! that slot is full. Different slots can be worked on at the same time, so
//! file I/O and socket I/O overlap instead of taking turns.
//!
//! Slot state changes are published through a [`tokio::sync::watch`] channel
//! per slot; waiters sleep until the state they need is posted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

/// Number of slots used by the transfer engine.
pub const DEFAULT_SLOT_COUNT: usize = 4;

/// Size of each slot used by the transfer engine (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// State a slot is handed back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Ready to be filled again.
    Free,
    /// Holds data waiting to be drained.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Free,
    Filling,
    Full,
    Draining,
}

impl From<SlotState> for Phase {
    fn from(state: SlotState) -> Self {
        match state {
            SlotState::Free => Phase::Free,
            SlotState::Full => Phase::Full,
        }
    }
}

#[derive(Debug, Default)]
struct Stored {
    buf: Vec<u8>,
    len: usize,
}

#[derive(Debug)]
struct Slot {
    phase: watch::Sender<Phase>,
    stored: Mutex<Stored>,
}

impl Slot {
    fn new(size: usize) -> Self {
        let (phase, _) = watch::channel(Phase::Free);
        Self {
            phase,
            stored: Mutex::new(Stored {
                buf: vec![0u8; size],
                len: 0,
            }),
        }
    }

    /// Waits until the slot is in `from`, then moves it to `to`.
    async fn claim(&self, from: Phase, to: Phase) {
        let mut rx = self.phase.subscribe();
        loop {
            // The sender lives inside this slot, so the wait cannot fail.
            let _ = rx.wait_for(|phase| *phase == from).await;
            let claimed = self.phase.send_if_modified(|phase| {
                if *phase == from {
                    *phase = to;
                    true
                } else {
                    false
                }
            });
            if claimed {
                return;
            }
        }
    }

    fn take(&self) -> (Vec<u8>, usize) {
        let mut stored = self.stored.lock().unwrap_or_else(PoisonError::into_inner);
        (std::mem::take(&mut stored.buf), stored.len)
    }

    fn put_back(&self, buf: Vec<u8>, len: usize, state: SlotState) {
        {
            let mut stored = self.stored.lock().unwrap_or_else(PoisonError::into_inner);
            stored.buf = buf;
            stored.len = len;
        }
        self.phase.send_replace(state.into());
    }
}

/// Exclusive access to one slot, obtained from
/// [`BufferPool::acquire_for_fill`] or [`BufferPool::acquire_for_drain`].
///
/// Hand it back with [`BufferPool::release`]. A lease that is dropped
/// instead stays claimed and the ring stalls at that slot.
#[derive(Debug)]
pub struct SlotLease {
    id: usize,
    buf: Vec<u8>,
    len: usize,
}

impl SlotLease {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Valid bytes recorded at the last release (zero for fill leases).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The whole buffer, for filling.
    pub fn space(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// The valid bytes, for draining.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Fixed ring of reusable buffers.
#[derive(Debug)]
pub struct BufferPool {
    slots: Box<[Slot]>,
    buffer_size: usize,
    fill_cursor: AtomicU64,
    drain_cursor: AtomicU64,
}

impl BufferPool {
    /// Allocates `slot_count` buffers of `buffer_size` bytes each.
    ///
    /// # Panics
    ///
    /// Panics if either argument is zero.
    pub fn new(slot_count: usize, buffer_size: usize) -> Self {
        assert!(slot_count > 0, "BufferPool needs at least one slot");
        assert!(buffer_size > 0, "BufferPool buffers must be non-empty");
        Self {
            slots: (0..slot_count).map(|_| Slot::new(buffer_size)).collect(),
            buffer_size,
            fill_cursor: AtomicU64::new(0),
            drain_cursor: AtomicU64::new(0),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Waits for the slot under the fill cursor to become free and claims it.
    ///
    /// Cancel safe: dropping the future before it resolves leaves the cursor
    /// and the slot untouched.
    pub async fn acquire_for_fill(&self) -> SlotLease {
        self.acquire(&self.fill_cursor, Phase::Free, Phase::Filling)
            .await
    }

    /// Waits for the slot under the drain cursor to become full and claims it.
    ///
    /// Cancel safe, like [`acquire_for_fill`](Self::acquire_for_fill).
    pub async fn acquire_for_drain(&self) -> SlotLease {
        self.acquire(&self.drain_cursor, Phase::Full, Phase::Draining)
            .await
    }

    /// Returns a slot to the ring in `state`, recording `used` valid bytes.
    ///
    /// `used` is clamped to the buffer size.
    pub fn release(&self, lease: SlotLease, state: SlotState, used: usize) {
        let used = used.min(lease.buf.len());
        self.slots[lease.id].put_back(lease.buf, used, state);
    }

    async fn acquire(&self, cursor: &AtomicU64, from: Phase, to: Phase) -> SlotLease {
        let ticket = cursor.load(Ordering::Acquire);
        let id = (ticket % self.slots.len() as u64) as usize;
        let slot = &self.slots[id];
        slot.claim(from, to).await;
        cursor.fetch_add(1, Ordering::AcqRel);
        let (buf, len) = slot.take();
        let len = if to == Phase::Filling { 0 } else { len };
        SlotLease { id, buf, len }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_COUNT, DEFAULT_BUFFER_SIZE)
    }
}
