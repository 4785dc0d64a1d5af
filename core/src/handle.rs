//! Opaque driver object handles.
//!
//! The interception layer passes every driver object to the core as its raw 64-bit handle value.
//! Each object kind gets its own newtype so registries cannot be indexed with the wrong handle.

use std::fmt;
use std::hash::Hash;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Queue,
    CommandPool,
    CommandBuffer,
    Buffer,
    Image,
    DeviceMemory,
    ShaderModule,
    Shader,
    Pipeline,
    RenderPass,
    Micromap,
    DeferredOperation,
    QueryPool,
    Semaphore,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub trait Handle: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    const OBJECT_TYPE: ObjectType;

    fn raw(self) -> u64;

    fn is_null(self) -> bool {
        self.raw() == 0
    }
}

macro_rules! define_handle {
    ($($name:ident => $object:ident),* $(,)?) => {
        $(
            #[derive(Copy, Clone, Debug, Default, PartialOrd, Ord, PartialEq, Eq, Hash)]
            #[repr(transparent)]
            pub struct $name(pub u64);

            impl $name {
                pub const NULL: Self = Self(0);
            }

            impl Handle for $name {
                const OBJECT_TYPE: ObjectType = ObjectType::$object;

                fn raw(self) -> u64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{} {:#018x}", ObjectType::$object, self.0)
                }
            }
        )*
    };
}

define_handle! {
    QueueHandle => Queue,
    CommandPoolHandle => CommandPool,
    CommandBufferHandle => CommandBuffer,
    BufferHandle => Buffer,
    ImageHandle => Image,
    DeviceMemoryHandle => DeviceMemory,
    ShaderModuleHandle => ShaderModule,
    ShaderHandle => Shader,
    PipelineHandle => Pipeline,
    RenderPassHandle => RenderPass,
    MicromapHandle => Micromap,
    DeferredOperationHandle => DeferredOperation,
    QueryPoolHandle => QueryPool,
    SemaphoreHandle => Semaphore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_object_kind() {
        assert_eq!(
            BufferHandle(0xabc).to_string(),
            "Buffer 0x0000000000000abc"
        );
        assert!(PipelineHandle::NULL.is_null());
        assert!(!QueueHandle(1).is_null());
    }
}
