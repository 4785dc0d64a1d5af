//! C entry points the layer shim calls around the application's own driver calls.
//!
//! Every function returns false if the profiler rejected the call; the reason has been logged by
//! then. Enum arguments carry the driver's raw values.

use std::ffi::{c_char, CStr};
use std::slice;

use tracing::warn;

use super::raw_slice;
use crate::command_buffer::{
    CommandBufferLevel, CommandBufferTracker, PipelineBarrierInfo, RenderingScope,
};
use crate::drawcall::DrawcallType;
use crate::error::Result;
use crate::handle::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DeviceMemoryHandle, Handle, ImageHandle,
    PipelineHandle, RenderPassHandle, ShaderHandle, ShaderModuleHandle,
};
use crate::profiler::DeviceProfiler;
use crate::resources::{ImageInfo, PipelineCreateInfo, PipelineStageInfo, ShaderCreateInfo};
use crate::shader::{BindPoint, ShaderStage};

pub const VKP_COMMAND_INSERT_DEBUG_LABEL: u32 = 0;
pub const VKP_COMMAND_BEGIN_DEBUG_LABEL: u32 = 1;
pub const VKP_COMMAND_END_DEBUG_LABEL: u32 = 2;
pub const VKP_COMMAND_DRAW: u32 = 3;
pub const VKP_COMMAND_DRAW_INDEXED: u32 = 4;
pub const VKP_COMMAND_DRAW_INDIRECT: u32 = 5;
pub const VKP_COMMAND_DRAW_INDEXED_INDIRECT: u32 = 6;
pub const VKP_COMMAND_DRAW_INDIRECT_COUNT: u32 = 7;
pub const VKP_COMMAND_DRAW_INDEXED_INDIRECT_COUNT: u32 = 8;
pub const VKP_COMMAND_DRAW_MESH_TASKS: u32 = 9;
pub const VKP_COMMAND_DISPATCH: u32 = 10;
pub const VKP_COMMAND_DISPATCH_INDIRECT: u32 = 11;
pub const VKP_COMMAND_TRACE_RAYS: u32 = 12;
pub const VKP_COMMAND_TRACE_RAYS_INDIRECT: u32 = 13;
pub const VKP_COMMAND_COPY_BUFFER: u32 = 14;
pub const VKP_COMMAND_COPY_BUFFER_TO_IMAGE: u32 = 15;
pub const VKP_COMMAND_COPY_IMAGE: u32 = 16;
pub const VKP_COMMAND_COPY_IMAGE_TO_BUFFER: u32 = 17;
pub const VKP_COMMAND_BLIT_IMAGE: u32 = 18;
pub const VKP_COMMAND_RESOLVE_IMAGE: u32 = 19;
pub const VKP_COMMAND_CLEAR_ATTACHMENTS: u32 = 20;
pub const VKP_COMMAND_CLEAR_COLOR_IMAGE: u32 = 21;
pub const VKP_COMMAND_CLEAR_DEPTH_STENCIL_IMAGE: u32 = 22;
pub const VKP_COMMAND_FILL_BUFFER: u32 = 23;
pub const VKP_COMMAND_UPDATE_BUFFER: u32 = 24;
pub const VKP_COMMAND_BUILD_ACCELERATION_STRUCTURES: u32 = 25;
pub const VKP_COMMAND_BUILD_MICROMAPS: u32 = 26;

/// A command being recorded. `args` holds the command's parameters in declaration order, with
/// handles as their raw values and signed values sign-extended.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct VkpCommand {
    pub kind: u32,
    pub args: [u64; 6],
    /// Name of a debug label. May be null.
    pub label: *const c_char,
    /// Label or clear color. A depth clear value goes in the first element.
    pub values: [f32; 4],
}

unsafe fn string(text: *const c_char) -> String {
    if text.is_null() {
        String::new()
    } else {
        CStr::from_ptr(text).to_string_lossy().into_owned()
    }
}

impl VkpCommand {
    unsafe fn decode(&self) -> Option<DrawcallType> {
        let [a, b, c, d, e, f] = self.args;
        let (a32, b32, c32, d32, e32) = (a as u32, b as u32, c as u32, d as u32, e as u32);
        Some(match self.kind {
            VKP_COMMAND_INSERT_DEBUG_LABEL => DrawcallType::InsertDebugLabel {
                name: string(self.label),
                color: self.values,
            },
            VKP_COMMAND_BEGIN_DEBUG_LABEL => DrawcallType::BeginDebugLabel {
                name: string(self.label),
                color: self.values,
            },
            VKP_COMMAND_END_DEBUG_LABEL => DrawcallType::EndDebugLabel,
            VKP_COMMAND_DRAW => DrawcallType::Draw {
                vertex_count: a32,
                instance_count: b32,
                first_vertex: c32,
                first_instance: d32,
            },
            VKP_COMMAND_DRAW_INDEXED => DrawcallType::DrawIndexed {
                index_count: a32,
                instance_count: b32,
                first_index: c32,
                vertex_offset: d as i32,
                first_instance: e32,
            },
            VKP_COMMAND_DRAW_INDIRECT => DrawcallType::DrawIndirect {
                buffer: BufferHandle(a),
                offset: b,
                draw_count: c32,
                stride: d32,
            },
            VKP_COMMAND_DRAW_INDEXED_INDIRECT => DrawcallType::DrawIndexedIndirect {
                buffer: BufferHandle(a),
                offset: b,
                draw_count: c32,
                stride: d32,
            },
            VKP_COMMAND_DRAW_INDIRECT_COUNT => DrawcallType::DrawIndirectCount {
                buffer: BufferHandle(a),
                offset: b,
                count_buffer: BufferHandle(c),
                count_offset: d,
                max_draw_count: e32,
                stride: f as u32,
            },
            VKP_COMMAND_DRAW_INDEXED_INDIRECT_COUNT => DrawcallType::DrawIndexedIndirectCount {
                buffer: BufferHandle(a),
                offset: b,
                count_buffer: BufferHandle(c),
                count_offset: d,
                max_draw_count: e32,
                stride: f as u32,
            },
            VKP_COMMAND_DRAW_MESH_TASKS => DrawcallType::DrawMeshTasks {
                group_count_x: a32,
                group_count_y: b32,
                group_count_z: c32,
            },
            VKP_COMMAND_DISPATCH => DrawcallType::Dispatch {
                group_count_x: a32,
                group_count_y: b32,
                group_count_z: c32,
            },
            VKP_COMMAND_DISPATCH_INDIRECT => DrawcallType::DispatchIndirect {
                buffer: BufferHandle(a),
                offset: b,
            },
            VKP_COMMAND_TRACE_RAYS => DrawcallType::TraceRays {
                width: a32,
                height: b32,
                depth: c32,
            },
            VKP_COMMAND_TRACE_RAYS_INDIRECT => DrawcallType::TraceRaysIndirect {
                indirect_address: a,
            },
            VKP_COMMAND_COPY_BUFFER => DrawcallType::CopyBuffer {
                src_buffer: BufferHandle(a),
                dst_buffer: BufferHandle(b),
                region_count: c32,
            },
            VKP_COMMAND_COPY_BUFFER_TO_IMAGE => DrawcallType::CopyBufferToImage {
                src_buffer: BufferHandle(a),
                dst_image: ImageHandle(b),
                region_count: c32,
            },
            VKP_COMMAND_COPY_IMAGE => DrawcallType::CopyImage {
                src_image: ImageHandle(a),
                dst_image: ImageHandle(b),
                region_count: c32,
            },
            VKP_COMMAND_COPY_IMAGE_TO_BUFFER => DrawcallType::CopyImageToBuffer {
                src_image: ImageHandle(a),
                dst_buffer: BufferHandle(b),
                region_count: c32,
            },
            VKP_COMMAND_BLIT_IMAGE => DrawcallType::BlitImage {
                src_image: ImageHandle(a),
                dst_image: ImageHandle(b),
                region_count: c32,
            },
            VKP_COMMAND_RESOLVE_IMAGE => DrawcallType::ResolveImage {
                src_image: ImageHandle(a),
                dst_image: ImageHandle(b),
                region_count: c32,
            },
            VKP_COMMAND_CLEAR_ATTACHMENTS => DrawcallType::ClearAttachments {
                color_attachment_count: a32,
                depth_stencil_attachment_count: b32,
                rect_count: c32,
            },
            VKP_COMMAND_CLEAR_COLOR_IMAGE => DrawcallType::ClearColorImage {
                image: ImageHandle(a),
                value: self.values,
            },
            VKP_COMMAND_CLEAR_DEPTH_STENCIL_IMAGE => DrawcallType::ClearDepthStencilImage {
                image: ImageHandle(a),
                depth: self.values[0],
                stencil: b32,
            },
            VKP_COMMAND_FILL_BUFFER => DrawcallType::FillBuffer {
                buffer: BufferHandle(a),
                offset: b,
                size: c,
                data: d32,
            },
            VKP_COMMAND_UPDATE_BUFFER => DrawcallType::UpdateBuffer {
                buffer: BufferHandle(a),
                offset: b,
                size: c,
            },
            VKP_COMMAND_BUILD_ACCELERATION_STRUCTURES => {
                DrawcallType::BuildAccelerationStructures { info_count: a32 }
            }
            VKP_COMMAND_BUILD_MICROMAPS => DrawcallType::BuildMicromaps { info_count: a32 },
            _ => return None,
        })
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct VkpShaderCreateInfo {
    /// A single `VkShaderStageFlagBits` value.
    pub stage: u32,
    pub code: *const u32,
    /// In bytes, as the driver takes it.
    pub code_size: usize,
    pub entry_point: *const c_char,
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct VkpPipelineStageInfo {
    pub stage: u32,
    pub module: ShaderModuleHandle,
    pub entry_point: *const c_char,
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct VkpPipelineCreateInfo {
    pub stage_count: u32,
    pub stages: *const VkpPipelineStageInfo,
}

unsafe fn tracked(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    f: impl FnOnce(&mut CommandBufferTracker) -> Result<()>,
) -> bool {
    let result = (*profiler)
        .command_buffer(command_buffer)
        .and_then(|tracker| f(&mut *tracker.lock()));
    if let Err(err) = &result {
        warn!("Rejected call on {command_buffer}: {err}");
    }
    result.is_ok()
}

fn stage(raw: u32) -> Option<ShaderStage> {
    let stage = ShaderStage::from_vk(raw);
    if stage.is_none() {
        warn!("Unknown shader stage {raw:#x}");
    }
    stage
}

unsafe fn code<'a>(code: *const u32, code_size: usize) -> &'a [u32] {
    if code.is_null() {
        &[]
    } else {
        slice::from_raw_parts(code, code_size / 4)
    }
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerCreateCommandPool(
    profiler: *const DeviceProfiler,
    pool: CommandPoolHandle,
) -> bool {
    (*profiler).create_command_pool(pool).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerDestroyCommandPool(
    profiler: *const DeviceProfiler,
    pool: CommandPoolHandle,
) -> bool {
    (*profiler).destroy_command_pool(pool).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerResetCommandPool(
    profiler: *const DeviceProfiler,
    pool: CommandPoolHandle,
) -> bool {
    (*profiler).reset_command_pool(pool).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerAllocateCommandBuffers(
    profiler: *const DeviceProfiler,
    pool: CommandPoolHandle,
    secondary: bool,
    count: u32,
    command_buffers: *const CommandBufferHandle,
) -> bool {
    let level = if secondary {
        CommandBufferLevel::Secondary
    } else {
        CommandBufferLevel::Primary
    };
    (*profiler)
        .allocate_command_buffers(pool, level, raw_slice(command_buffers, count))
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerFreeCommandBuffers(
    profiler: *const DeviceProfiler,
    pool: CommandPoolHandle,
    count: u32,
    command_buffers: *const CommandBufferHandle,
) -> bool {
    (*profiler)
        .free_command_buffers(pool, raw_slice(command_buffers, count))
        .is_ok()
}

/// `continues_render_pass` is set for secondary command buffers recorded to run inside a render
/// pass of their primary.
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerBeginCommandBuffer(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    continues_render_pass: bool,
) -> bool {
    tracked(profiler, command_buffer, |tracker| {
        if continues_render_pass {
            tracker.begin_render_pass_continuation();
        } else {
            tracker.begin();
        }
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerEndCommandBuffer(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
) -> bool {
    tracked(profiler, command_buffer, CommandBufferTracker::end)
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerResetCommandBuffer(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
) -> bool {
    tracked(profiler, command_buffer, |tracker| {
        tracker.reset();
        Ok(())
    })
}

unsafe fn command_hook(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    command: *const VkpCommand,
    hook: fn(&mut CommandBufferTracker, &DrawcallType) -> Result<()>,
) -> bool {
    let Some(drawcall) = command.as_ref().and_then(|command| command.decode()) else {
        warn!("Unknown command recorded into {command_buffer}");
        return false;
    };
    tracked(profiler, command_buffer, |tracker| hook(tracker, &drawcall))
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPreCommand(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    command: *const VkpCommand,
) -> bool {
    command_hook(profiler, command_buffer, command, CommandBufferTracker::pre_command)
}

/// Takes the same command that was passed to [`vkpProfilerPreCommand`].
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPostCommand(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    command: *const VkpCommand,
) -> bool {
    command_hook(profiler, command_buffer, command, CommandBufferTracker::post_command)
}

/// A null `render_pass` stands for dynamic rendering.
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPreBeginRendering(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    render_pass: RenderPassHandle,
) -> bool {
    let scope = if render_pass.is_null() {
        RenderingScope::Dynamic
    } else {
        RenderingScope::RenderPass(render_pass)
    };
    tracked(profiler, command_buffer, |tracker| {
        tracker.pre_begin_rendering(scope)
    })
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPostBeginRendering(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
) -> bool {
    tracked(
        profiler,
        command_buffer,
        CommandBufferTracker::post_begin_rendering,
    )
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPreEndRendering(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
) -> bool {
    tracked(profiler, command_buffer, CommandBufferTracker::pre_end_rendering)
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPostEndRendering(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
) -> bool {
    tracked(profiler, command_buffer, CommandBufferTracker::post_end_rendering)
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerBindPipeline(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    bind_point: u32,
    pipeline: PipelineHandle,
) -> bool {
    let Some(bind_point) = BindPoint::from_vk(bind_point) else {
        warn!("Unknown pipeline bind point {bind_point}");
        return false;
    };
    tracked(profiler, command_buffer, |tracker| {
        tracker.bind_pipeline(bind_point, pipeline)
    })
}

/// `stages` holds one `VkShaderStageFlagBits` value per shader; null shaders unbind.
#[no_mangle]
pub unsafe extern "C" fn vkpProfilerBindShaders(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    count: u32,
    stages: *const u32,
    shaders: *const ShaderHandle,
) -> bool {
    let Some(stages) = raw_slice(stages, count)
        .iter()
        .map(|&raw| stage(raw))
        .collect::<Option<Vec<_>>>()
    else {
        return false;
    };
    let shaders = raw_slice(shaders, count);
    tracked(profiler, command_buffer, |tracker| {
        tracker.bind_shaders(&stages, shaders)
    })
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerPipelineBarrier(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    info: *const PipelineBarrierInfo,
) -> bool {
    let info = info.as_ref().copied().unwrap_or_default();
    tracked(profiler, command_buffer, |tracker| {
        tracker.pipeline_barrier(&info)
    })
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerExecuteCommands(
    profiler: *const DeviceProfiler,
    command_buffer: CommandBufferHandle,
    count: u32,
    command_buffers: *const CommandBufferHandle,
) -> bool {
    let secondaries = raw_slice(command_buffers, count);
    tracked(profiler, command_buffer, |tracker| {
        tracker.execute_commands(secondaries)
    })
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerCreateShaderModule(
    profiler: *const DeviceProfiler,
    module: ShaderModuleHandle,
    code_size: usize,
    code_words: *const u32,
) -> bool {
    (*profiler)
        .resources()
        .create_shader_module(module, code(code_words, code_size))
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerDestroyShaderModule(
    profiler: *const DeviceProfiler,
    module: ShaderModuleHandle,
) -> bool {
    (*profiler).resources().destroy_shader_module(module).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerCreateShaders(
    profiler: *const DeviceProfiler,
    count: u32,
    infos: *const VkpShaderCreateInfo,
    shaders: *const ShaderHandle,
) -> bool {
    let raw = raw_slice(infos, count);
    let entry_points: Vec<_> = raw.iter().map(|info| string(info.entry_point)).collect();
    let Some(infos) = raw
        .iter()
        .zip(&entry_points)
        .map(|(info, entry_point)| {
            Some(ShaderCreateInfo {
                stage: stage(info.stage)?,
                code: code(info.code, info.code_size),
                entry_point,
            })
        })
        .collect::<Option<Vec<_>>>()
    else {
        return false;
    };
    (*profiler)
        .resources()
        .create_shaders(&infos, raw_slice(shaders, count))
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerDestroyShader(
    profiler: *const DeviceProfiler,
    shader: ShaderHandle,
) -> bool {
    (*profiler).resources().destroy_shader(shader).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerSetShaderName(
    profiler: *const DeviceProfiler,
    shader: ShaderHandle,
    name: *const c_char,
) -> bool {
    (*profiler)
        .resources()
        .set_shader_name(shader, &string(name))
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerCreatePipelines(
    profiler: *const DeviceProfiler,
    bind_point: u32,
    count: u32,
    infos: *const VkpPipelineCreateInfo,
    pipelines: *const PipelineHandle,
) -> bool {
    let Some(bind_point) = BindPoint::from_vk(bind_point) else {
        warn!("Unknown pipeline bind point {bind_point}");
        return false;
    };
    let raw = raw_slice(infos, count);
    let mut stage_lists = Vec::with_capacity(raw.len());
    for info in raw {
        let raw_stages = raw_slice(info.stages, info.stage_count);
        let mut stages = Vec::with_capacity(raw_stages.len());
        for raw_stage in raw_stages {
            let Some(stage) = stage(raw_stage.stage) else {
                return false;
            };
            stages.push((stage, raw_stage.module, string(raw_stage.entry_point)));
        }
        stage_lists.push(stages);
    }
    let stage_infos: Vec<Vec<_>> = stage_lists
        .iter()
        .map(|stages| {
            stages
                .iter()
                .map(|(stage, module, entry_point)| PipelineStageInfo {
                    stage: *stage,
                    module: *module,
                    entry_point,
                })
                .collect()
        })
        .collect();
    let infos: Vec<_> = stage_infos
        .iter()
        .map(|stages| PipelineCreateInfo { stages })
        .collect();
    (*profiler)
        .resources()
        .create_pipelines(bind_point, &infos, raw_slice(pipelines, count))
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerDestroyPipeline(
    profiler: *const DeviceProfiler,
    pipeline: PipelineHandle,
) -> bool {
    (*profiler).resources().destroy_pipeline(pipeline).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerSetPipelineName(
    profiler: *const DeviceProfiler,
    pipeline: PipelineHandle,
    name: *const c_char,
) -> bool {
    (*profiler)
        .resources()
        .set_pipeline_name(pipeline, &string(name))
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerAllocateMemory(
    profiler: *const DeviceProfiler,
    memory: DeviceMemoryHandle,
    size: u64,
    memory_type_index: u32,
) -> bool {
    (*profiler)
        .resources()
        .allocate_memory(memory, size, memory_type_index)
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerFreeMemory(
    profiler: *const DeviceProfiler,
    memory: DeviceMemoryHandle,
) -> bool {
    (*profiler).resources().free_memory(memory).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerCreateBuffer(
    profiler: *const DeviceProfiler,
    buffer: BufferHandle,
    size: u64,
    usage: u32,
) -> bool {
    (*profiler)
        .resources()
        .create_buffer(buffer, size, usage)
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerDestroyBuffer(
    profiler: *const DeviceProfiler,
    buffer: BufferHandle,
) -> bool {
    (*profiler).resources().destroy_buffer(buffer).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerBindBufferMemory(
    profiler: *const DeviceProfiler,
    buffer: BufferHandle,
    memory: DeviceMemoryHandle,
    offset: u64,
) -> bool {
    (*profiler)
        .resources()
        .bind_buffer_memory(buffer, memory, offset)
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerCreateImage(
    profiler: *const DeviceProfiler,
    image: ImageHandle,
    info: *const ImageInfo,
) -> bool {
    let Some(info) = info.as_ref() else {
        return false;
    };
    (*profiler).resources().create_image(image, *info).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerDestroyImage(
    profiler: *const DeviceProfiler,
    image: ImageHandle,
) -> bool {
    (*profiler).resources().destroy_image(image).is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn vkpProfilerBindImageMemory(
    profiler: *const DeviceProfiler,
    image: ImageHandle,
    memory: DeviceMemoryHandle,
    offset: u64,
) -> bool {
    (*profiler)
        .resources()
        .bind_image_memory(image, memory, offset)
        .is_ok()
}
