use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::checkpoint::CheckpointAllocator;
use crate::config::Config;
use crate::dispatch::DeviceDispatch;
use crate::error::Result;
use crate::query_pool::TimestampQueryPool;
use crate::resources::ResourceRegistries;

/// State shared by everything that records or retires work on one device.
pub(crate) struct DeviceContext {
    pub dispatch: Arc<dyn DeviceDispatch>,
    pub config: Config,
    pub queries: Arc<TimestampQueryPool>,
    pub checkpoints: CheckpointAllocator,
    pub resources: Arc<ResourceRegistries>,
    paused: AtomicBool,
}

impl DeviceContext {
    pub fn new(dispatch: Arc<dyn DeviceDispatch>, config: Config) -> Result<Arc<Self>> {
        config.validate()?;
        let queries = TimestampQueryPool::new(
            dispatch.clone(),
            config.query_pool_size,
            config.query_overflow,
        )?;
        Ok(Arc::new(Self {
            dispatch,
            config,
            queries,
            checkpoints: CheckpointAllocator::new(config.checkpoint_count),
            resources: Arc::new(ResourceRegistries::new()),
            paused: AtomicBool::new(false),
        }))
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::AcqRel)
    }
}
