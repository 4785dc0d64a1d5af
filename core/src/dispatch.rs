use thiserror::Error;

use crate::handle::{CommandBufferHandle, QueryPoolHandle, QueueHandle, SemaphoreHandle};

/// A failed driver call, carrying the raw result code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("driver call failed with result {0}")]
pub struct DriverError(pub i32);

impl DriverError {
    pub const OUT_OF_HOST_MEMORY: Self = Self(-1);
    pub const OUT_OF_DEVICE_MEMORY: Self = Self(-2);
    pub const DEVICE_LOST: Self = Self(-4);

    pub fn is_device_lost(self) -> bool {
        self == Self::DEVICE_LOST
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    TopOfPipe,
    BottomOfPipe,
}

/// The calls the profiler makes into the next layer on its own behalf.
///
/// Implemented by the layer shim on top of its dispatch table. Every method must be callable from
/// any thread; none of them may block on GPU progress.
pub trait DeviceDispatch: Send + Sync {
    fn create_query_pool(&self, query_count: u32) -> DriverResult<QueryPoolHandle>;

    fn destroy_query_pool(&self, pool: QueryPoolHandle);

    /// Records a reset of the queries. A timestamp may only be written to a query that has been
    /// reset since its last write, and the reset must be recorded outside of a render pass.
    fn cmd_reset_query_pool(
        &self,
        command_buffer: CommandBufferHandle,
        pool: QueryPoolHandle,
        first_query: u32,
        query_count: u32,
    );

    fn cmd_write_timestamp(
        &self,
        command_buffer: CommandBufferHandle,
        stage: PipelineStage,
        pool: QueryPoolHandle,
        query: u32,
    );

    /// Reads `results.len()` consecutive queries without waiting.
    ///
    /// Returns `Ok(false)` if any of them is not available yet.
    fn get_query_pool_results(
        &self,
        pool: QueryPoolHandle,
        first_query: u32,
        results: &mut [u64],
    ) -> DriverResult<bool>;

    fn create_timeline_semaphore(&self, initial_value: u64) -> DriverResult<SemaphoreHandle>;

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    fn get_semaphore_counter_value(&self, semaphore: SemaphoreHandle) -> DriverResult<u64>;

    /// Nanoseconds per timestamp tick.
    fn timestamp_period(&self) -> f32;

    fn timestamp_valid_bits(&self, _queue: QueueHandle) -> u32 {
        64
    }
}
