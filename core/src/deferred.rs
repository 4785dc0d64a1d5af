use tracing::debug;

use crate::dispatch::DriverError;
use crate::error::Result;
use crate::handle::{DeferredOperationHandle, Handle};
use crate::registry::Registry;

pub type DeferredCallback = Box<dyn FnOnce() + Send>;

/// Outcome of joining a deferred operation, as reported by the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeferredJoinStatus {
    /// The operation has completed.
    Success,
    /// This thread is done but others are still working on the operation.
    ThreadDone,
    /// No more work could be picked up by this thread right now.
    ThreadIdle,
    Failed(DriverError),
}

#[derive(Default)]
struct DeferredOperation {
    callback: Option<DeferredCallback>,
}

/// Deferred host operations and the work to run once each of them completes.
#[derive(Default)]
pub struct DeferredOperations {
    operations: Registry<DeferredOperationHandle, DeferredOperation>,
}

impl DeferredOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, operation: DeferredOperationHandle) -> Result<()> {
        self.operations
            .insert(operation, DeferredOperation::default())
    }

    /// Forgets the operation. A callback that never ran is dropped without being invoked.
    pub fn destroy(&self, operation: DeferredOperationHandle) -> Result<()> {
        if operation.is_null() {
            return Ok(());
        }
        let op = self.operations.remove(operation)?;
        if op.callback.is_some() {
            debug!("{operation} destroyed before completion");
        }
        Ok(())
    }

    pub fn set_callback(
        &self,
        operation: DeferredOperationHandle,
        callback: DeferredCallback,
    ) -> Result<()> {
        self.operations
            .with_mut(operation, |op| op.callback = Some(callback))
    }

    /// Handles a join on the operation. The callback runs on the first successful join only and
    /// is taken out of the registry first, so it may register other objects freely.
    ///
    /// Returns whether the callback ran.
    pub fn join(
        &self,
        operation: DeferredOperationHandle,
        status: DeferredJoinStatus,
    ) -> Result<bool> {
        if status != DeferredJoinStatus::Success {
            // Make sure the handle is known even if nothing happens.
            return self.operations.with(operation, |_| false);
        }
        match self.operations.with_mut(operation, |op| op.callback.take())? {
            Some(callback) => {
                callback();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
