//! Profiler-side shadows of driver resources.
//!
//! Records are created after the driver call succeeds and removed when the object is destroyed.
//! Buffers and images only remember the handle of the memory they are bound to; freeing that
//! memory drops the relationship.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::drawcall::{PipelineKey, PipelineType};
use crate::error::Result;
use crate::handle::{
    BufferHandle, DeviceMemoryHandle, Handle, ImageHandle, MicromapHandle, PipelineHandle,
    ShaderHandle, ShaderModuleHandle,
};
use crate::registry::Registry;
use crate::shader::{fingerprint, BindPoint, ShaderCapabilities, ShaderStage, ShaderTuple};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryBinding {
    pub memory: DeviceMemoryHandle,
    pub offset: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferRecord {
    pub size: u64,
    pub usage: u32,
    pub binding: Option<MemoryBinding>,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub extent: [u32; 3],
    pub format: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    /// Size the driver requires for the image's backing memory.
    pub memory_size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRecord {
    pub info: ImageInfo,
    pub binding: Option<MemoryBinding>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryRecord {
    pub size: u64,
    pub memory_type_index: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShaderModuleRecord {
    pub hash: u32,
    pub capabilities: ShaderCapabilities,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderRecord {
    pub stage: ShaderStage,
    pub hash: u32,
    pub capabilities: ShaderCapabilities,
    pub debug_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineRecord {
    pub bind_point: BindPoint,
    pub shader_tuple: ShaderTuple,
    pub debug_name: Option<String>,
}

impl PipelineRecord {
    pub fn pipeline_type(&self) -> PipelineType {
        match self.bind_point {
            BindPoint::Graphics => PipelineType::Graphics,
            BindPoint::Compute => PipelineType::Compute,
            BindPoint::RayTracing => PipelineType::RayTracing,
        }
    }

    pub fn name(&self) -> String {
        match &self.debug_name {
            Some(name) => name.clone(),
            None => self.shader_tuple.default_name(self.bind_point),
        }
    }

    pub fn uses_ray_query(&self) -> bool {
        self.shader_tuple.capabilities().ray_query
    }

    pub fn uses_ray_tracing(&self) -> bool {
        self.shader_tuple.capabilities().ray_tracing
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MicromapRecord {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

/// One shader stage of a pipeline being created.
#[derive(Copy, Clone, Debug)]
pub struct PipelineStageInfo<'a> {
    pub stage: ShaderStage,
    pub module: ShaderModuleHandle,
    pub entry_point: &'a str,
}

#[derive(Copy, Clone, Debug)]
pub struct PipelineCreateInfo<'a> {
    pub stages: &'a [PipelineStageInfo<'a>],
}

#[derive(Copy, Clone, Debug)]
pub struct ShaderCreateInfo<'a> {
    pub stage: ShaderStage,
    pub code: &'a [u32],
    pub entry_point: &'a str,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryTypeUsage {
    pub allocation_count: u32,
    pub allocated_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub allocation_count: u32,
    pub allocated_bytes: u64,
    pub memory_types: BTreeMap<u32, MemoryTypeUsage>,
    pub buffer_count: u32,
    pub bound_buffer_bytes: u64,
    pub image_count: u32,
    pub bound_image_bytes: u64,
}

#[derive(Default)]
pub struct ResourceRegistries {
    buffers: Registry<BufferHandle, BufferRecord>,
    images: Registry<ImageHandle, ImageRecord>,
    memory: Registry<DeviceMemoryHandle, MemoryRecord>,
    shader_modules: Registry<ShaderModuleHandle, ShaderModuleRecord>,
    shaders: Registry<ShaderHandle, ShaderRecord>,
    pipelines: Registry<PipelineHandle, PipelineRecord>,
    micromaps: Registry<MicromapHandle, MicromapRecord>,
    // Tuples of bound shader objects, kept for naming them in the histogram.
    shader_object_tuples: Mutex<AHashMap<u32, Arc<ShaderTuple>>>,
}

/// Destroying a null handle is a no-op for the driver, so it is one here too.
fn remove_unless_null<H: Handle, V>(registry: &Registry<H, V>, handle: H) -> Result<Option<V>> {
    if handle.is_null() {
        return Ok(None);
    }
    registry.remove(handle).map(Some)
}

impl ResourceRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_buffer(&self, buffer: BufferHandle, size: u64, usage: u32) -> Result<()> {
        self.buffers.insert(
            buffer,
            BufferRecord {
                size,
                usage,
                binding: None,
            },
        )
    }

    pub fn destroy_buffer(&self, buffer: BufferHandle) -> Result<()> {
        remove_unless_null(&self.buffers, buffer).map(drop)
    }

    pub fn bind_buffer_memory(
        &self,
        buffer: BufferHandle,
        memory: DeviceMemoryHandle,
        offset: u64,
    ) -> Result<()> {
        self.memory.with(memory, |_| ())?;
        self.buffers.with_mut(buffer, |record| {
            record.binding = Some(MemoryBinding { memory, offset });
        })
    }

    pub fn buffer(&self, buffer: BufferHandle) -> Result<BufferRecord> {
        self.buffers.get(buffer)
    }

    pub fn create_image(&self, image: ImageHandle, info: ImageInfo) -> Result<()> {
        self.images.insert(
            image,
            ImageRecord {
                info,
                binding: None,
            },
        )
    }

    pub fn destroy_image(&self, image: ImageHandle) -> Result<()> {
        remove_unless_null(&self.images, image).map(drop)
    }

    pub fn bind_image_memory(
        &self,
        image: ImageHandle,
        memory: DeviceMemoryHandle,
        offset: u64,
    ) -> Result<()> {
        self.memory.with(memory, |_| ())?;
        self.images.with_mut(image, |record| {
            record.binding = Some(MemoryBinding { memory, offset });
        })
    }

    pub fn image(&self, image: ImageHandle) -> Result<ImageRecord> {
        self.images.get(image)
    }

    pub fn allocate_memory(
        &self,
        memory: DeviceMemoryHandle,
        size: u64,
        memory_type_index: u32,
    ) -> Result<()> {
        self.memory.insert(
            memory,
            MemoryRecord {
                size,
                memory_type_index,
            },
        )
    }

    pub fn free_memory(&self, memory: DeviceMemoryHandle) -> Result<()> {
        if remove_unless_null(&self.memory, memory)?.is_none() {
            return Ok(());
        }

        let unbind = |binding: &mut Option<MemoryBinding>| {
            if binding.is_some_and(|b| b.memory == memory) {
                *binding = None;
            }
        };
        self.buffers
            .for_each_mut(|_, record| unbind(&mut record.binding));
        self.images
            .for_each_mut(|_, record| unbind(&mut record.binding));
        Ok(())
    }

    pub fn create_shader_module(&self, module: ShaderModuleHandle, code: &[u32]) -> Result<()> {
        self.shader_modules.insert(
            module,
            ShaderModuleRecord {
                hash: fingerprint(code),
                capabilities: ShaderCapabilities::from_spirv(code),
            },
        )
    }

    pub fn destroy_shader_module(&self, module: ShaderModuleHandle) -> Result<()> {
        remove_unless_null(&self.shader_modules, module).map(drop)
    }

    /// Registers the shader objects the driver created. A partially failed call leaves null
    /// handles for the shaders it could not create; those are skipped.
    pub fn create_shaders(
        &self,
        infos: &[ShaderCreateInfo<'_>],
        shaders: &[ShaderHandle],
    ) -> Result<()> {
        for (info, shader) in infos.iter().zip(shaders) {
            if shader.is_null() {
                continue;
            }
            self.shaders.insert(
                *shader,
                ShaderRecord {
                    stage: info.stage,
                    hash: fingerprint(info.code) ^ fingerprint(info.entry_point),
                    capabilities: ShaderCapabilities::from_spirv(info.code),
                    debug_name: None,
                },
            )?;
        }
        Ok(())
    }

    /// Tuples that used the shader are forgotten once no live shader has the same code for its
    /// stage.
    pub fn destroy_shader(&self, shader: ShaderHandle) -> Result<()> {
        let Some(record) = remove_unless_null(&self.shaders, shader)? else {
            return Ok(());
        };
        let still_used = self.shaders.fold(false, |used, _, other| {
            used || (other.stage == record.stage && other.hash == record.hash)
        });
        if !still_used {
            let mut tuples = self.shader_object_tuples.lock();
            let before = tuples.len();
            tuples.retain(|_, tuple| tuple.stage(record.stage) != Some(record.hash));
            if tuples.len() != before {
                debug!("Dropped {} shader object tuples with {shader}", before - tuples.len());
            }
        }
        Ok(())
    }

    pub fn shader(&self, shader: ShaderHandle) -> Result<ShaderRecord> {
        self.shaders.get(shader)
    }

    pub fn set_shader_name(&self, shader: ShaderHandle, name: &str) -> Result<()> {
        self.shaders
            .with_mut(shader, |record| record.debug_name = Some(name.to_owned()))
    }

    /// Builds the record for one pipeline from its stages' modules.
    pub fn pipeline_record(
        &self,
        bind_point: BindPoint,
        info: &PipelineCreateInfo<'_>,
    ) -> Result<PipelineRecord> {
        let mut capabilities = ShaderCapabilities::default();
        let mut stages = Vec::with_capacity(info.stages.len());
        for stage in info.stages {
            let module = self.shader_modules.get(stage.module)?;
            capabilities = capabilities | module.capabilities;
            stages.push((stage.stage, module.hash ^ fingerprint(stage.entry_point)));
        }
        Ok(PipelineRecord {
            bind_point,
            shader_tuple: ShaderTuple::new(stages, capabilities),
            debug_name: None,
        })
    }

    /// Registers the pipelines of a create call, skipping null handles left by partial failure.
    pub fn create_pipelines(
        &self,
        bind_point: BindPoint,
        infos: &[PipelineCreateInfo<'_>],
        pipelines: &[PipelineHandle],
    ) -> Result<()> {
        let mut records = Vec::with_capacity(pipelines.len());
        for (info, pipeline) in infos.iter().zip(pipelines) {
            if !pipeline.is_null() {
                records.push((*pipeline, self.pipeline_record(bind_point, info)?));
            }
        }
        for (pipeline, record) in records {
            debug!("Registered {pipeline} as {}", record.name());
            self.pipelines.insert(pipeline, record)?;
        }
        Ok(())
    }

    pub fn insert_pipeline(&self, pipeline: PipelineHandle, record: PipelineRecord) -> Result<()> {
        self.pipelines.insert(pipeline, record)
    }

    pub fn destroy_pipeline(&self, pipeline: PipelineHandle) -> Result<()> {
        remove_unless_null(&self.pipelines, pipeline).map(drop)
    }

    pub fn pipeline(&self, pipeline: PipelineHandle) -> Result<PipelineRecord> {
        self.pipelines.get(pipeline)
    }

    pub fn set_pipeline_name(&self, pipeline: PipelineHandle, name: &str) -> Result<()> {
        self.pipelines
            .with_mut(pipeline, |record| record.debug_name = Some(name.to_owned()))
    }

    pub fn create_micromap(&self, micromap: MicromapHandle, record: MicromapRecord) -> Result<()> {
        self.micromaps.insert(micromap, record)
    }

    pub fn destroy_micromap(&self, micromap: MicromapHandle) -> Result<()> {
        remove_unless_null(&self.micromaps, micromap).map(drop)
    }

    pub fn micromap(&self, micromap: MicromapHandle) -> Result<MicromapRecord> {
        self.micromaps.get(micromap)
    }

    /// Shader tuple of the given bound shader objects; also remembered for naming.
    pub fn shader_object_tuple(
        &self,
        shaders: impl IntoIterator<Item = ShaderHandle>,
    ) -> Result<Arc<ShaderTuple>> {
        let mut capabilities = ShaderCapabilities::default();
        let mut stages = Vec::new();
        for shader in shaders {
            let record = self.shaders.get(shader)?;
            capabilities = capabilities | record.capabilities;
            stages.push((record.stage, record.hash));
        }
        let tuple = ShaderTuple::new(stages, capabilities);
        Ok(self
            .shader_object_tuples
            .lock()
            .entry(tuple.hash())
            .or_insert_with(|| Arc::new(tuple))
            .clone())
    }

    /// Human-readable name for a histogram entry.
    pub fn pipeline_name(&self, key: &PipelineKey) -> String {
        if let Some(name) = key.pipeline_type.internal_name() {
            return name.to_owned();
        }
        if !key.handle.is_null() {
            return match self.pipelines.find(key.handle) {
                Some(record) => record.name(),
                None => format!("{:#x}", key.handle.0),
            };
        }

        let bind_point = match key.pipeline_type {
            PipelineType::Compute => BindPoint::Compute,
            PipelineType::RayTracing => BindPoint::RayTracing,
            _ => BindPoint::Graphics,
        };
        match self.shader_object_tuples.lock().get(&key.shader_hash) {
            Some(tuple) => tuple.default_name(bind_point),
            None => "Unknown".to_owned(),
        }
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = self.memory.fold(MemoryUsage::default(), |mut usage, _, record| {
            usage.allocation_count += 1;
            usage.allocated_bytes += record.size;
            let ty = usage.memory_types.entry(record.memory_type_index).or_default();
            ty.allocation_count += 1;
            ty.allocated_bytes += record.size;
            usage
        });
        (usage.buffer_count, usage.bound_buffer_bytes) =
            self.buffers.fold((0, 0), |(count, bytes), _, record| {
                let bound = record.binding.map_or(0, |_| record.size);
                (count + 1, bytes + bound)
            });
        (usage.image_count, usage.bound_image_bytes) =
            self.images.fold((0, 0), |(count, bytes), _, record| {
                let bound = record.binding.map_or(0, |_| record.info.memory_size);
                (count + 1, bytes + bound)
            });
        usage
    }
}
