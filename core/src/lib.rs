pub use checkpoint::{Checkpoint, CheckpointAllocator, CheckpointId, CheckpointType};
pub use command_buffer::{
    CommandBufferLevel, CommandBufferState, CommandBufferTrace, CommandBufferTracker,
    PipelineBarrierInfo, RenderingScope, TraceEntry,
};
pub use config::{Config, ConfigError, FrameDelimiter, QueryOverflowPolicy, SamplingMode};
pub use counters::{CpuCounter, CpuTimestampCounter};
pub use deferred::{DeferredCallback, DeferredJoinStatus, DeferredOperations};
pub use dispatch::{DeviceDispatch, DriverError, DriverResult, PipelineStage};
pub use drawcall::{Drawcall, DrawcallStats, DrawcallType, PipelineKey, PipelineType};
pub use error::{ProfilerError, Result};
pub use frame::{CommandBufferData, FrameAggregate, FrameIndex, PipelineStats, SubmitData};
pub use history::FrameHistory;
pub use profiler::DeviceProfiler;
pub use query_pool::{QueryLease, QuerySlot, TimestampQueryPool};
pub use registry::Registry;
pub use resources::{
    BufferRecord, ImageInfo, ImageRecord, MemoryBinding, MemoryRecord, MemoryTypeUsage,
    MemoryUsage, MicromapRecord, PipelineCreateInfo, PipelineRecord, PipelineStageInfo,
    ResourceRegistries, ShaderCreateInfo, ShaderModuleRecord, ShaderRecord,
};
pub use shader::{BindPoint, ShaderCapabilities, ShaderStage, ShaderTuple};
pub use submission::{SharedTracker, SubmitAux, SubmitInfo};

mod checkpoint;
mod command_buffer;
mod config;
mod context;
mod counters;
mod deferred;
mod dispatch;
mod drawcall;
mod entrypoint;
mod error;
mod frame;
pub mod handle;
mod history;
pub mod logging;
#[cfg(test)]
mod mock;
mod profiler;
mod query_pool;
mod registry;
mod resources;
mod shader;
mod submission;
pub mod time;

pub type Timestamp = u64;
pub type Interval = u64;
