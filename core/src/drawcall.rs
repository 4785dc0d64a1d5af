use std::ops::AddAssign;

use crate::checkpoint::CheckpointId;
use crate::handle::{BufferHandle, Handle, ImageHandle, PipelineHandle, RenderPassHandle};
use crate::query_pool::QuerySlot;

/// Every GPU command the tracker can time, with the arguments worth showing to a user.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawcallType {
    InsertDebugLabel {
        name: String,
        color: [f32; 4],
    },
    BeginDebugLabel {
        name: String,
        color: [f32; 4],
    },
    EndDebugLabel,
    /// Render pass begin, including its load operations. Null for dynamic rendering.
    BeginRenderPass {
        render_pass: RenderPassHandle,
    },
    /// Render pass end, including its store and resolve operations.
    EndRenderPass,
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    DrawIndirectCount {
        buffer: BufferHandle,
        offset: u64,
        count_buffer: BufferHandle,
        count_offset: u64,
        max_draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirectCount {
        buffer: BufferHandle,
        offset: u64,
        count_buffer: BufferHandle,
        count_offset: u64,
        max_draw_count: u32,
        stride: u32,
    },
    DrawMeshTasks {
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    },
    Dispatch {
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    },
    DispatchIndirect {
        buffer: BufferHandle,
        offset: u64,
    },
    TraceRays {
        width: u32,
        height: u32,
        depth: u32,
    },
    TraceRaysIndirect {
        indirect_address: u64,
    },
    CopyBuffer {
        src_buffer: BufferHandle,
        dst_buffer: BufferHandle,
        region_count: u32,
    },
    CopyBufferToImage {
        src_buffer: BufferHandle,
        dst_image: ImageHandle,
        region_count: u32,
    },
    CopyImage {
        src_image: ImageHandle,
        dst_image: ImageHandle,
        region_count: u32,
    },
    CopyImageToBuffer {
        src_image: ImageHandle,
        dst_buffer: BufferHandle,
        region_count: u32,
    },
    BlitImage {
        src_image: ImageHandle,
        dst_image: ImageHandle,
        region_count: u32,
    },
    ResolveImage {
        src_image: ImageHandle,
        dst_image: ImageHandle,
        region_count: u32,
    },
    ClearAttachments {
        color_attachment_count: u32,
        depth_stencil_attachment_count: u32,
        rect_count: u32,
    },
    ClearColorImage {
        image: ImageHandle,
        value: [f32; 4],
    },
    ClearDepthStencilImage {
        image: ImageHandle,
        depth: f32,
        stencil: u32,
    },
    FillBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        data: u32,
    },
    UpdateBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    BuildAccelerationStructures {
        info_count: u32,
    },
    BuildMicromaps {
        info_count: u32,
    },
}

impl DrawcallType {
    pub fn name(&self) -> &'static str {
        match self {
            DrawcallType::InsertDebugLabel { .. } => "InsertDebugLabel",
            DrawcallType::BeginDebugLabel { .. } => "BeginDebugLabel",
            DrawcallType::EndDebugLabel => "EndDebugLabel",
            DrawcallType::BeginRenderPass { render_pass } if render_pass.is_null() => {
                "BeginRendering"
            }
            DrawcallType::BeginRenderPass { .. } => "BeginRenderPass",
            DrawcallType::EndRenderPass => "EndRenderPass",
            DrawcallType::Draw { .. } => "Draw",
            DrawcallType::DrawIndexed { .. } => "DrawIndexed",
            DrawcallType::DrawIndirect { .. } => "DrawIndirect",
            DrawcallType::DrawIndexedIndirect { .. } => "DrawIndexedIndirect",
            DrawcallType::DrawIndirectCount { .. } => "DrawIndirectCount",
            DrawcallType::DrawIndexedIndirectCount { .. } => "DrawIndexedIndirectCount",
            DrawcallType::DrawMeshTasks { .. } => "DrawMeshTasks",
            DrawcallType::Dispatch { .. } => "Dispatch",
            DrawcallType::DispatchIndirect { .. } => "DispatchIndirect",
            DrawcallType::TraceRays { .. } => "TraceRays",
            DrawcallType::TraceRaysIndirect { .. } => "TraceRaysIndirect",
            DrawcallType::CopyBuffer { .. } => "CopyBuffer",
            DrawcallType::CopyBufferToImage { .. } => "CopyBufferToImage",
            DrawcallType::CopyImage { .. } => "CopyImage",
            DrawcallType::CopyImageToBuffer { .. } => "CopyImageToBuffer",
            DrawcallType::BlitImage { .. } => "BlitImage",
            DrawcallType::ResolveImage { .. } => "ResolveImage",
            DrawcallType::ClearAttachments { .. } => "ClearAttachments",
            DrawcallType::ClearColorImage { .. } => "ClearColorImage",
            DrawcallType::ClearDepthStencilImage { .. } => "ClearDepthStencilImage",
            DrawcallType::FillBuffer { .. } => "FillBuffer",
            DrawcallType::UpdateBuffer { .. } => "UpdateBuffer",
            DrawcallType::BuildAccelerationStructures { .. } => "BuildAccelerationStructures",
            DrawcallType::BuildMicromaps { .. } => "BuildMicromaps",
        }
    }

    /// Which pipeline the command executes on. Commands that do not use an application pipeline
    /// map to an internal one.
    pub fn pipeline_type(&self) -> PipelineType {
        match self {
            DrawcallType::InsertDebugLabel { .. }
            | DrawcallType::BeginDebugLabel { .. }
            | DrawcallType::EndDebugLabel => PipelineType::Debug,
            DrawcallType::BeginRenderPass { .. } => PipelineType::BeginRenderPass,
            DrawcallType::EndRenderPass => PipelineType::EndRenderPass,
            DrawcallType::Draw { .. }
            | DrawcallType::DrawIndexed { .. }
            | DrawcallType::DrawIndirect { .. }
            | DrawcallType::DrawIndexedIndirect { .. }
            | DrawcallType::DrawIndirectCount { .. }
            | DrawcallType::DrawIndexedIndirectCount { .. }
            | DrawcallType::DrawMeshTasks { .. } => PipelineType::Graphics,
            DrawcallType::Dispatch { .. } | DrawcallType::DispatchIndirect { .. } => {
                PipelineType::Compute
            }
            DrawcallType::TraceRays { .. } | DrawcallType::TraceRaysIndirect { .. } => {
                PipelineType::RayTracing
            }
            DrawcallType::CopyBuffer { .. } => PipelineType::CopyBuffer,
            DrawcallType::CopyBufferToImage { .. } => PipelineType::CopyBufferToImage,
            DrawcallType::CopyImage { .. } => PipelineType::CopyImage,
            DrawcallType::CopyImageToBuffer { .. } => PipelineType::CopyImageToBuffer,
            DrawcallType::BlitImage { .. } => PipelineType::BlitImage,
            DrawcallType::ResolveImage { .. } => PipelineType::ResolveImage,
            DrawcallType::ClearAttachments { .. } => PipelineType::ClearAttachments,
            DrawcallType::ClearColorImage { .. } => PipelineType::ClearColorImage,
            DrawcallType::ClearDepthStencilImage { .. } => PipelineType::ClearDepthStencilImage,
            DrawcallType::FillBuffer { .. } => PipelineType::FillBuffer,
            DrawcallType::UpdateBuffer { .. } => PipelineType::UpdateBuffer,
            DrawcallType::BuildAccelerationStructures { .. } => {
                PipelineType::BuildAccelerationStructure
            }
            DrawcallType::BuildMicromaps { .. } => PipelineType::BuildMicromap,
        }
    }

    /// Debug labels are structural markers; they get checkpoints but no timer.
    pub fn is_debug_label(&self) -> bool {
        self.pipeline_type() == PipelineType::Debug
    }

    /// Render pass boundaries are recorded by the render pass hooks, never as plain commands.
    pub fn is_render_pass_boundary(&self) -> bool {
        matches!(
            self,
            DrawcallType::BeginRenderPass { .. } | DrawcallType::EndRenderPass
        )
    }
}

#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub enum PipelineType {
    Graphics,
    Compute,
    RayTracing,
    Debug,
    BeginRenderPass,
    EndRenderPass,
    CopyBuffer,
    CopyBufferToImage,
    CopyImage,
    CopyImageToBuffer,
    BlitImage,
    ResolveImage,
    ClearAttachments,
    ClearColorImage,
    ClearDepthStencilImage,
    FillBuffer,
    UpdateBuffer,
    BuildAccelerationStructure,
    BuildMicromap,
}

impl PipelineType {
    pub fn is_internal(self) -> bool {
        !matches!(
            self,
            PipelineType::Graphics | PipelineType::Compute | PipelineType::RayTracing
        )
    }

    /// Display name of the internal pipeline, `None` for application pipelines.
    pub fn internal_name(self) -> Option<&'static str> {
        Some(match self {
            PipelineType::Graphics | PipelineType::Compute | PipelineType::RayTracing => {
                return None
            }
            PipelineType::Debug => "Debug",
            PipelineType::BeginRenderPass => "BeginRenderPass",
            PipelineType::EndRenderPass => "EndRenderPass",
            PipelineType::CopyBuffer => "CopyBuffer",
            PipelineType::CopyBufferToImage => "CopyBufferToImage",
            PipelineType::CopyImage => "CopyImage",
            PipelineType::CopyImageToBuffer => "CopyImageToBuffer",
            PipelineType::BlitImage => "BlitImage",
            PipelineType::ResolveImage => "ResolveImage",
            PipelineType::ClearAttachments => "ClearAttachments",
            PipelineType::ClearColorImage => "ClearColorImage",
            PipelineType::ClearDepthStencilImage => "ClearDepthStencilImage",
            PipelineType::FillBuffer => "FillBuffer",
            PipelineType::UpdateBuffer => "UpdateBuffer",
            PipelineType::BuildAccelerationStructure => "BuildAccelerationStructure",
            PipelineType::BuildMicromap => "BuildMicromap",
        })
    }
}

/// Identifies the pipeline (or shader object combination) a drawcall ran with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub pipeline_type: PipelineType,
    /// Null for internal pipelines and shader objects.
    pub handle: PipelineHandle,
    pub shader_hash: u32,
}

impl PipelineKey {
    pub fn internal(pipeline_type: PipelineType) -> Self {
        Self {
            pipeline_type,
            handle: PipelineHandle::NULL,
            shader_hash: 0,
        }
    }

    pub fn pipeline(pipeline_type: PipelineType, handle: PipelineHandle, shader_hash: u32) -> Self {
        Self {
            pipeline_type,
            handle,
            shader_hash,
        }
    }

    pub fn shader_objects(pipeline_type: PipelineType, shader_hash: u32) -> Self {
        Self {
            pipeline_type,
            handle: PipelineHandle::NULL,
            shader_hash,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Drawcall {
    pub kind: DrawcallType,
    pub pipeline: PipelineKey,
    /// Timer bracketing the command, `None` when the pool was exhausted or for labels. In
    /// per-pipeline sampling the first command of a run holds the timer of the whole run.
    pub query: Option<QuerySlot>,
    pub checkpoint: Option<CheckpointId>,
    /// Device ticks measured by the timer. `None` until read back, and stays `None` for
    /// unmeasured commands.
    pub ticks: Option<u64>,
    /// Timed only as part of a coarser timer, so missing ticks are expected.
    pub batched: bool,
}

impl Drawcall {
    pub fn is_measured(&self) -> bool {
        self.ticks.is_some()
    }

    /// A command that should have had its own timer but did not get one.
    pub fn is_unmeasured(&self) -> bool {
        !self.batched && !self.kind.is_debug_label() && self.ticks.is_none()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrawcallStats {
    pub draw_count: u32,
    pub draw_indirect_count: u32,
    pub dispatch_count: u32,
    pub dispatch_indirect_count: u32,
    pub trace_rays_count: u32,
    pub trace_rays_indirect_count: u32,
    pub copy_buffer_count: u32,
    pub copy_buffer_to_image_count: u32,
    pub copy_image_count: u32,
    pub copy_image_to_buffer_count: u32,
    pub clear_color_count: u32,
    pub clear_depth_stencil_count: u32,
    pub resolve_count: u32,
    pub blit_image_count: u32,
    pub fill_buffer_count: u32,
    pub update_buffer_count: u32,
    pub build_acceleration_structures_count: u32,
    pub build_micromaps_count: u32,
    pub pipeline_barrier_count: u32,
}

impl DrawcallStats {
    pub fn record(&mut self, drawcall: &DrawcallType) {
        match drawcall {
            DrawcallType::InsertDebugLabel { .. }
            | DrawcallType::BeginDebugLabel { .. }
            | DrawcallType::EndDebugLabel
            | DrawcallType::BeginRenderPass { .. }
            | DrawcallType::EndRenderPass => {}
            DrawcallType::Draw { .. }
            | DrawcallType::DrawIndexed { .. }
            | DrawcallType::DrawMeshTasks { .. } => self.draw_count += 1,
            DrawcallType::DrawIndirect { .. }
            | DrawcallType::DrawIndexedIndirect { .. }
            | DrawcallType::DrawIndirectCount { .. }
            | DrawcallType::DrawIndexedIndirectCount { .. } => self.draw_indirect_count += 1,
            DrawcallType::Dispatch { .. } => self.dispatch_count += 1,
            DrawcallType::DispatchIndirect { .. } => self.dispatch_indirect_count += 1,
            DrawcallType::TraceRays { .. } => self.trace_rays_count += 1,
            DrawcallType::TraceRaysIndirect { .. } => self.trace_rays_indirect_count += 1,
            DrawcallType::CopyBuffer { .. } => self.copy_buffer_count += 1,
            DrawcallType::CopyBufferToImage { .. } => self.copy_buffer_to_image_count += 1,
            DrawcallType::CopyImage { .. } => self.copy_image_count += 1,
            DrawcallType::CopyImageToBuffer { .. } => self.copy_image_to_buffer_count += 1,
            DrawcallType::BlitImage { .. } => self.blit_image_count += 1,
            DrawcallType::ResolveImage { .. } => self.resolve_count += 1,
            DrawcallType::ClearAttachments {
                color_attachment_count,
                depth_stencil_attachment_count,
                ..
            } => {
                self.clear_color_count += color_attachment_count;
                self.clear_depth_stencil_count += depth_stencil_attachment_count;
            }
            DrawcallType::ClearColorImage { .. } => self.clear_color_count += 1,
            DrawcallType::ClearDepthStencilImage { .. } => self.clear_depth_stencil_count += 1,
            DrawcallType::FillBuffer { .. } => self.fill_buffer_count += 1,
            DrawcallType::UpdateBuffer { .. } => self.update_buffer_count += 1,
            DrawcallType::BuildAccelerationStructures { .. } => {
                self.build_acceleration_structures_count += 1
            }
            DrawcallType::BuildMicromaps { .. } => self.build_micromaps_count += 1,
        }
    }

    pub fn copy_count(&self) -> u32 {
        self.copy_buffer_count
            + self.copy_buffer_to_image_count
            + self.copy_image_count
            + self.copy_image_to_buffer_count
    }
}

impl AddAssign for DrawcallStats {
    fn add_assign(&mut self, rhs: Self) {
        self.draw_count += rhs.draw_count;
        self.draw_indirect_count += rhs.draw_indirect_count;
        self.dispatch_count += rhs.dispatch_count;
        self.dispatch_indirect_count += rhs.dispatch_indirect_count;
        self.trace_rays_count += rhs.trace_rays_count;
        self.trace_rays_indirect_count += rhs.trace_rays_indirect_count;
        self.copy_buffer_count += rhs.copy_buffer_count;
        self.copy_buffer_to_image_count += rhs.copy_buffer_to_image_count;
        self.copy_image_count += rhs.copy_image_count;
        self.copy_image_to_buffer_count += rhs.copy_image_to_buffer_count;
        self.clear_color_count += rhs.clear_color_count;
        self.clear_depth_stencil_count += rhs.clear_depth_stencil_count;
        self.resolve_count += rhs.resolve_count;
        self.blit_image_count += rhs.blit_image_count;
        self.fill_buffer_count += rhs.fill_buffer_count;
        self.update_buffer_count += rhs.update_buffer_count;
        self.build_acceleration_structures_count += rhs.build_acceleration_structures_count;
        self.build_micromaps_count += rhs.build_micromaps_count;
        self.pipeline_barrier_count += rhs.pipeline_barrier_count;
    }
}
