//! A fake GPU for tests.
//!
//! Query resets and timestamp writes are remembered per command buffer and land in the query pools
//! each time the test calls [`MockDevice::execute`]. Timeline semaphores only advance through
//! [`MockDevice::signal`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::dispatch::{DeviceDispatch, DriverError, DriverResult, PipelineStage};
use crate::handle::{CommandBufferHandle, QueryPoolHandle, QueueHandle, SemaphoreHandle};

#[derive(Default)]
pub struct MockDevice {
    next_handle: AtomicU64,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    pools: HashMap<QueryPoolHandle, Vec<Option<u64>>>,
    semaphores: HashMap<SemaphoreHandle, u64>,
    recorded: HashMap<CommandBufferHandle, Vec<MockCommand>>,
    stale_writes: usize,
    clock: u64,
    tick_step: u64,
    valid_bits: u32,
    period: f32,
    fail_pool_creation: bool,
    fail_semaphore_creation: bool,
    device_lost: bool,
}

#[derive(Copy, Clone, Debug)]
enum MockCommand {
    Reset {
        pool: QueryPoolHandle,
        first_query: u32,
        query_count: u32,
    },
    Write {
        pool: QueryPoolHandle,
        query: u32,
    },
}

impl MockDevice {
    pub fn new() -> Self {
        let device = Self {
            next_handle: AtomicU64::new(0x1000),
            ..Default::default()
        };
        {
            let mut state = device.state.lock();
            state.tick_step = 10;
            state.valid_bits = 64;
            state.period = 1.0;
        }
        device
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    pub fn set_timestamp_period(&self, period: f32) {
        self.state.lock().period = period;
    }

    pub fn set_valid_bits(&self, bits: u32) {
        self.state.lock().valid_bits = bits;
    }

    pub fn set_clock(&self, ticks: u64) {
        self.state.lock().clock = ticks;
    }

    /// Ticks that pass between two consecutive timestamp writes.
    pub fn set_tick_step(&self, ticks: u64) {
        self.state.lock().tick_step = ticks;
    }

    pub fn fail_pool_creation(&self, fail: bool) {
        self.state.lock().fail_pool_creation = fail;
    }

    pub fn fail_semaphore_creation(&self, fail: bool) {
        self.state.lock().fail_semaphore_creation = fail;
    }

    pub fn lose_device(&self) {
        self.state.lock().device_lost = true;
    }

    pub fn live_query_pools(&self) -> usize {
        self.state.lock().pools.len()
    }

    pub fn live_semaphores(&self) -> usize {
        self.state.lock().semaphores.len()
    }

    pub fn recorded_writes(&self, command_buffer: CommandBufferHandle) -> usize {
        self.state.lock().recorded.get(&command_buffer).map_or(0, |commands| {
            commands
                .iter()
                .filter(|command| matches!(command, MockCommand::Write { .. }))
                .count()
        })
    }

    /// Queries reset by the command buffer, counted per reset command.
    pub fn recorded_resets(&self, command_buffer: CommandBufferHandle) -> usize {
        self.state.lock().recorded.get(&command_buffer).map_or(0, |commands| {
            commands
                .iter()
                .map(|command| match command {
                    MockCommand::Reset { query_count, .. } => *query_count as usize,
                    MockCommand::Write { .. } => 0,
                })
                .sum()
        })
    }

    /// Timestamp writes that landed on a query still holding a value from an earlier write.
    pub fn stale_writes(&self) -> usize {
        self.state.lock().stale_writes
    }

    /// Runs the command buffer in recording order. Every timestamp it writes gets the current
    /// clock value, and the clock advances by the tick step after each write.
    pub fn execute(&self, command_buffer: CommandBufferHandle) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let commands = state
            .recorded
            .get(&command_buffer)
            .cloned()
            .unwrap_or_default();
        let mask = match state.valid_bits {
            64 => u64::MAX,
            bits => (1u64 << bits) - 1,
        };
        for command in commands {
            match command {
                MockCommand::Reset {
                    pool,
                    first_query,
                    query_count,
                } => {
                    if let Some(queries) = state.pools.get_mut(&pool) {
                        let first = first_query as usize;
                        for query in &mut queries[first..first + query_count as usize] {
                            *query = None;
                        }
                    }
                }
                MockCommand::Write { pool, query } => {
                    state.clock = state.clock.wrapping_add(state.tick_step);
                    let value = state.clock & mask;
                    if let Some(slot) = state
                        .pools
                        .get_mut(&pool)
                        .and_then(|p| p.get_mut(query as usize))
                    {
                        if slot.replace(value).is_some() {
                            state.stale_writes += 1;
                        }
                    }
                }
            }
        }
    }

    /// Drops the recorded commands, as re-recording the command buffer would.
    pub fn forget(&self, command_buffer: CommandBufferHandle) {
        self.state.lock().recorded.remove(&command_buffer);
    }

    pub fn signal(&self, semaphore: SemaphoreHandle, value: u64) {
        let mut state = self.state.lock();
        let current = state.semaphores.entry(semaphore).or_default();
        *current = (*current).max(value);
    }
}

impl DeviceDispatch for MockDevice {
    fn create_query_pool(&self, query_count: u32) -> DriverResult<QueryPoolHandle> {
        let mut state = self.state.lock();
        if state.fail_pool_creation {
            return Err(DriverError::OUT_OF_DEVICE_MEMORY);
        }
        let pool = QueryPoolHandle(self.next_handle());
        state.pools.insert(pool, vec![None; query_count as usize]);
        Ok(pool)
    }

    fn destroy_query_pool(&self, pool: QueryPoolHandle) {
        self.state.lock().pools.remove(&pool);
    }

    fn cmd_reset_query_pool(
        &self,
        command_buffer: CommandBufferHandle,
        pool: QueryPoolHandle,
        first_query: u32,
        query_count: u32,
    ) {
        self.state
            .lock()
            .recorded
            .entry(command_buffer)
            .or_default()
            .push(MockCommand::Reset {
                pool,
                first_query,
                query_count,
            });
    }

    fn cmd_write_timestamp(
        &self,
        command_buffer: CommandBufferHandle,
        _stage: PipelineStage,
        pool: QueryPoolHandle,
        query: u32,
    ) {
        self.state
            .lock()
            .recorded
            .entry(command_buffer)
            .or_default()
            .push(MockCommand::Write { pool, query });
    }

    fn get_query_pool_results(
        &self,
        pool: QueryPoolHandle,
        first_query: u32,
        results: &mut [u64],
    ) -> DriverResult<bool> {
        let state = self.state.lock();
        if state.device_lost {
            return Err(DriverError::DEVICE_LOST);
        }
        let queries = state.pools.get(&pool).ok_or(DriverError(-3))?;
        let first = first_query as usize;
        for (out, query) in results.iter_mut().zip(&queries[first..]) {
            match query {
                Some(value) => *out = *value,
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn create_timeline_semaphore(&self, initial_value: u64) -> DriverResult<SemaphoreHandle> {
        let mut state = self.state.lock();
        if state.fail_semaphore_creation {
            return Err(DriverError::OUT_OF_HOST_MEMORY);
        }
        let semaphore = SemaphoreHandle(self.next_handle());
        state.semaphores.insert(semaphore, initial_value);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.state.lock().semaphores.remove(&semaphore);
    }

    fn get_semaphore_counter_value(&self, semaphore: SemaphoreHandle) -> DriverResult<u64> {
        let state = self.state.lock();
        if state.device_lost {
            return Err(DriverError::DEVICE_LOST);
        }
        state
            .semaphores
            .get(&semaphore)
            .copied()
            .ok_or(DriverError(-3))
    }

    fn timestamp_period(&self) -> f32 {
        self.state.lock().period
    }

    fn timestamp_valid_bits(&self, _queue: QueueHandle) -> u32 {
        self.state.lock().valid_bits
    }
}
