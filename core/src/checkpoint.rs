//! Ring of named markers written on the recording path.
//!
//! Checkpoints are only read after a device fault to show what the GPU was last working on, so the
//! ring wraps freely and readers accept that old entries may have been overwritten.

use std::fmt;

use parking_lot::Mutex;

pub const MAX_CHECKPOINT_NAME_LEN: usize = 63;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CheckpointType {
    #[default]
    Generic,
    PushMarker,
    PopMarker,
    BeginRenderPass,
    EndRenderPass,
}

/// Identifies one allocation; stays valid until the ring wraps over it.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct CheckpointId(u64);

#[derive(Copy, Clone)]
pub struct Checkpoint {
    id: CheckpointId,
    kind: CheckpointType,
    len: u8,
    name: [u8; MAX_CHECKPOINT_NAME_LEN],
}

impl Checkpoint {
    fn new(id: CheckpointId, kind: CheckpointType, name: &str) -> Self {
        let mut len = name.len().min(MAX_CHECKPOINT_NAME_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }

        let mut buf = [0; MAX_CHECKPOINT_NAME_LEN];
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            id,
            kind,
            len: len as u8,
            name: buf,
        }
    }

    pub fn id(&self) -> CheckpointId {
        self.id
    }

    pub fn kind(&self) -> CheckpointType {
        self.kind
    }

    pub fn name(&self) -> &str {
        // Truncation happens on a char boundary, so the prefix is always valid UTF-8.
        std::str::from_utf8(&self.name[..self.len as usize]).unwrap_or_default()
    }
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name())
            .finish()
    }
}

pub struct CheckpointAllocator {
    inner: Mutex<CheckpointRing>,
}

struct CheckpointRing {
    pool: Vec<Checkpoint>,
    capacity: usize,
    next_id: u64,
}

impl CheckpointAllocator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(CheckpointRing {
                pool: Vec::with_capacity(capacity),
                capacity,
                next_id: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Writes a checkpoint into the next ring slot, overwriting the oldest one once full.
    pub fn allocate(&self, kind: CheckpointType, name: &str) -> CheckpointId {
        let mut ring = self.inner.lock();
        let id = CheckpointId(ring.next_id);
        ring.next_id += 1;

        let checkpoint = Checkpoint::new(id, kind, name);
        let slot = (id.0 % ring.capacity as u64) as usize;
        if slot < ring.pool.len() {
            ring.pool[slot] = checkpoint;
        } else {
            ring.pool.push(checkpoint);
        }
        id
    }

    /// Returns the checkpoint if it has not been overwritten yet.
    pub fn get(&self, id: CheckpointId) -> Option<Checkpoint> {
        let ring = self.inner.lock();
        let slot = (id.0 % ring.capacity as u64) as usize;
        ring.pool.get(slot).filter(|c| c.id == id).copied()
    }

    /// Up to `count` of the most recent checkpoints, newest first.
    pub fn recent(&self, count: usize) -> Vec<Checkpoint> {
        let ring = self.inner.lock();
        let available = ring.pool.len().min(count);
        (1..=available as u64)
            .map(|back| {
                let id = ring.next_id - back;
                ring.pool[(id % ring.capacity as u64) as usize]
            })
            .collect()
    }
}
