use thiserror::Error;

use crate::command_buffer::CommandBufferState;
use crate::config::ConfigError;
use crate::dispatch::DriverError;
use crate::handle::{CommandBufferHandle, Handle, ObjectType};

pub type Result<T, E = ProfilerError> = std::result::Result<T, E>;

/// Contract violations and driver failures observed by the profiler.
///
/// None of these abort the application; the layer logs them and keeps forwarding calls.
#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("{object} {handle:#018x} is not tracked")]
    UnknownHandle { object: ObjectType, handle: u64 },
    #[error("{object} {handle:#018x} is already tracked")]
    AlreadyTracked { object: ObjectType, handle: u64 },
    #[error("{command_buffer} is {state:?}: {detail}")]
    InvalidState {
        command_buffer: CommandBufferHandle,
        state: CommandBufferState,
        detail: &'static str,
    },
    #[error("{command_buffer}: unbalanced render pass scope")]
    UnbalancedRenderPass { command_buffer: CommandBufferHandle },
    #[error("{command_buffer} ignored until it is reset after an earlier usage error")]
    Desynchronized { command_buffer: CommandBufferHandle },
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProfilerError {
    pub fn unknown<H: Handle>(handle: H) -> Self {
        Self::UnknownHandle {
            object: H::OBJECT_TYPE,
            handle: handle.raw(),
        }
    }

    pub fn already_tracked<H: Handle>(handle: H) -> Self {
        Self::AlreadyTracked {
            object: H::OBJECT_TYPE,
            handle: handle.raw(),
        }
    }
}
