use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::QueryOverflowPolicy;
use crate::counters::CpuCounter;
use crate::dispatch::{DeviceDispatch, DriverResult};
use crate::handle::{CommandBufferHandle, QueryPoolHandle};

/// One GPU timer: a begin and an end query stored next to each other in a driver pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct QuerySlot {
    pool: QueryPoolHandle,
    index: u32,
}

impl QuerySlot {
    pub fn pool(&self) -> QueryPoolHandle {
        self.pool
    }

    pub fn begin_query(&self) -> u32 {
        self.index * 2
    }

    pub fn end_query(&self) -> u32 {
        self.index * 2 + 1
    }
}

/// Difference between two raw timestamps, taking counter wrap-around at `valid_bits` into account.
pub fn tick_delta(begin: u64, end: u64, valid_bits: u32) -> u64 {
    let delta = end.wrapping_sub(begin);
    match valid_bits {
        0 => 0,
        bits @ 1..=63 => delta & ((1u64 << bits) - 1),
        _ => delta,
    }
}

/// Free list of timer slots spread over one or more driver query pools.
///
/// Slots go back on the free list only when the [`QueryLease`] holding them is dropped, which
/// happens once the last submission referencing the recording has been read back. Slots are handed
/// out without a reset; the recording that takes them resets them on the GPU, so every submission
/// of it starts from unavailable queries.
pub struct TimestampQueryPool {
    dispatch: Arc<dyn DeviceDispatch>,
    slots_per_pool: u32,
    policy: QueryOverflowPolicy,
    inner: Mutex<FreeList>,
    exhausted: CpuCounter,
}

struct FreeList {
    pools: Vec<QueryPoolHandle>,
    free: Vec<QuerySlot>,
}

impl FreeList {
    fn add_pool(&mut self, pool: QueryPoolHandle, slots: u32) {
        self.pools.push(pool);
        self.free
            .extend((0..slots).rev().map(|index| QuerySlot { pool, index }));
    }
}

impl TimestampQueryPool {
    pub fn new(
        dispatch: Arc<dyn DeviceDispatch>,
        slots_per_pool: u32,
        policy: QueryOverflowPolicy,
    ) -> DriverResult<Arc<Self>> {
        let mut free_list = FreeList {
            pools: Vec::new(),
            free: Vec::with_capacity(slots_per_pool as usize),
        };
        let pool = dispatch.create_query_pool(slots_per_pool * 2)?;
        free_list.add_pool(pool, slots_per_pool);

        Ok(Arc::new(Self {
            dispatch,
            slots_per_pool,
            policy,
            inner: Mutex::new(free_list),
            exhausted: CpuCounter::new(),
        }))
    }

    /// Takes up to `count` slots off the free list. Fewer are returned once the pool is dry.
    pub fn acquire(&self, count: usize) -> Vec<QuerySlot> {
        let mut inner = self.inner.lock();
        let mut slots = Vec::with_capacity(count);
        while slots.len() < count {
            match inner.free.pop().or_else(|| self.on_exhausted(&mut inner)) {
                Some(slot) => slots.push(slot),
                None => break,
            }
        }
        slots
    }

    /// Records resets of both queries of every slot, merging neighbouring slots of a driver pool
    /// into one command.
    pub fn record_reset(&self, command_buffer: CommandBufferHandle, slots: &[QuerySlot]) {
        let mut slots = slots.to_vec();
        slots.sort_unstable_by_key(|slot| (slot.pool, slot.index));
        let mut run: Option<(QuerySlot, u32)> = None;
        for slot in slots {
            run = match run {
                Some((first, len))
                    if first.pool == slot.pool && first.index + len == slot.index =>
                {
                    Some((first, len + 1))
                }
                Some((first, len)) => {
                    self.dispatch.cmd_reset_query_pool(
                        command_buffer,
                        first.pool,
                        first.begin_query(),
                        len * 2,
                    );
                    Some((slot, 1))
                }
                None => Some((slot, 1)),
            };
        }
        if let Some((first, len)) = run {
            self.dispatch
                .cmd_reset_query_pool(command_buffer, first.pool, first.begin_query(), len * 2);
        }
    }

    fn on_exhausted(&self, inner: &mut FreeList) -> Option<QuerySlot> {
        if self.policy == QueryOverflowPolicy::Grow {
            match self.dispatch.create_query_pool(self.slots_per_pool * 2) {
                Ok(pool) => {
                    inner.add_pool(pool, self.slots_per_pool);
                    debug!(
                        "Timestamp query pool grown to {} slots",
                        inner.pools.len() * self.slots_per_pool as usize
                    );
                    return inner.free.pop();
                }
                Err(err) => warn!("Failed to grow timestamp query pool: {err}"),
            }
        }

        if self.exhausted.increment() == 0 {
            warn!("Timestamp query pool exhausted, commands will go unmeasured");
        }
        None
    }

    fn release(&self, slots: impl IntoIterator<Item = QuerySlot>) {
        self.inner.lock().free.extend(slots);
    }

    /// Reads the tick delta of a slot whose work is known to have completed.
    ///
    /// `Ok(None)` means the driver did not report the values as available.
    pub fn read(&self, slot: QuerySlot, valid_bits: u32) -> DriverResult<Option<u64>> {
        let mut values = [0u64; 2];
        let available =
            self.dispatch
                .get_query_pool_results(slot.pool, slot.begin_query(), &mut values)?;
        Ok(available.then(|| tick_delta(values[0], values[1], valid_bits)))
    }

    pub fn free_slots(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().pools.len() * self.slots_per_pool as usize
    }

    /// How many times a slot was requested while none were free.
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted.value()
    }
}

impl Drop for TimestampQueryPool {
    fn drop(&mut self) {
        for pool in self.inner.get_mut().pools.drain(..) {
            self.dispatch.destroy_query_pool(pool);
        }
    }
}

/// The slots owned by one recording. Returns them to the pool on drop.
pub struct QueryLease {
    pool: Arc<TimestampQueryPool>,
    slots: Vec<QuerySlot>,
}

impl QueryLease {
    pub fn new(pool: Arc<TimestampQueryPool>) -> Self {
        Self {
            pool,
            slots: Vec::new(),
        }
    }

    /// Takes up to `count` more slots and records their reset into `command_buffer`.
    pub fn reserve(
        &mut self,
        command_buffer: CommandBufferHandle,
        count: usize,
    ) -> Vec<QuerySlot> {
        let slots = self.pool.acquire(count);
        if !slots.is_empty() {
            self.pool.record_reset(command_buffer, &slots);
            self.slots.extend_from_slice(&slots);
        }
        slots
    }

    pub fn pool(&self) -> &Arc<TimestampQueryPool> {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for QueryLease {
    fn drop(&mut self) {
        if !self.slots.is_empty() {
            self.pool.release(self.slots.drain(..));
        }
    }
}
