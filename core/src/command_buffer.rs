//! Per-command-buffer recording state.
//!
//! While a command buffer records, timed commands are bracketed with timestamp writes as the
//! sampling mode asks and appended to a trace. Every query is reset by the command buffer itself
//! before it is written, so the same recording can be submitted again. Ending the recording freezes the trace behind an `Arc`; each
//! submission holds a reference to it, so re-recording or freeing the command buffer never pulls
//! query slots out from under work the GPU has not finished yet.

use std::collections::BTreeMap;
use std::mem::{self, Discriminant};
use std::sync::Arc;

use tracing::{debug, error};

use crate::checkpoint::{CheckpointId, CheckpointType};
use crate::config::SamplingMode;
use crate::context::DeviceContext;
use crate::dispatch::PipelineStage;
use crate::drawcall::{Drawcall, DrawcallStats, DrawcallType, PipelineKey, PipelineType};
use crate::error::{ProfilerError, Result};
use crate::handle::{
    CommandBufferHandle, CommandPoolHandle, Handle, PipelineHandle, RenderPassHandle,
    ShaderHandle,
};
use crate::query_pool::{QueryLease, QuerySlot};
use crate::shader::{BindPoint, ShaderStage};

/// Timer slots reserved and reset when a recording begins, and again before each render pass.
/// Recordings that needed more last time reserve that many instead.
const MIN_RESERVATION: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandBufferLevel {
    Primary,
    Secondary,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandBufferState {
    NotRecording,
    Recording,
    Executable,
    Pending,
    Retired,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RenderingScope {
    RenderPass(RenderPassHandle),
    Dynamic,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineBarrierInfo {
    pub memory_barrier_count: u32,
    pub buffer_barrier_count: u32,
    pub image_barrier_count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TraceEntry {
    Drawcall(Drawcall),
    BeginRendering {
        scope: RenderingScope,
        query: Option<QuerySlot>,
        /// Device ticks spent in the whole scope, filled in on readback.
        ticks: Option<u64>,
    },
    EndRendering,
    ExecuteCommands(Vec<CommandBufferHandle>),
}

/// The frozen result of one recording.
pub struct CommandBufferTrace {
    handle: CommandBufferHandle,
    level: CommandBufferLevel,
    generation: u64,
    entries: Vec<TraceEntry>,
    stats: DrawcallStats,
    render_pass_count: u32,
    span: Option<QuerySlot>,
    secondaries: Vec<CommandBufferHandle>,
    queries: QueryLease,
}

impl CommandBufferTrace {
    pub fn handle(&self) -> CommandBufferHandle {
        self.handle
    }

    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    /// Which recording of the command buffer this is.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn drawcalls(&self) -> impl Iterator<Item = &Drawcall> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            TraceEntry::Drawcall(drawcall) => Some(drawcall),
            _ => None,
        })
    }

    pub fn stats(&self) -> &DrawcallStats {
        &self.stats
    }

    pub fn render_pass_count(&self) -> u32 {
        self.render_pass_count
    }

    /// Timer around the whole command buffer, if the sampling mode asks for one and a slot was
    /// free.
    pub fn span(&self) -> Option<QuerySlot> {
        self.span
    }

    pub fn secondary_command_buffers(&self) -> &[CommandBufferHandle] {
        &self.secondaries
    }

    /// Slots held by the recording, including reserved ones it never wrote to.
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ScopePhase {
    Beginning,
    Open,
    Ending,
}

struct OpenScope {
    query: Option<QuerySlot>,
    /// The begin or end operation being timed.
    boundary: Option<Drawcall>,
    phase: ScopePhase,
}

struct OpenCommand {
    kind: Discriminant<DrawcallType>,
    drawcall: Option<Drawcall>,
}

/// Consecutive commands on one pipeline sharing a timer.
struct PipelineRun {
    pipeline: PipelineKey,
    query: QuerySlot,
}

struct Recording {
    profiled: bool,
    sampling: SamplingMode,
    queries: Option<QueryLease>,
    /// Slots already reset by this recording and not handed out yet.
    reserved: Vec<QuerySlot>,
    /// Timers asked for, including those that got no slot.
    timers: usize,
    scope_timers: usize,
    max_scope_timers: usize,
    /// Timers the largest render pass of the previous recording asked for.
    render_pass_demand: usize,
    run: Option<PipelineRun>,
    entries: Vec<TraceEntry>,
    stats: DrawcallStats,
    render_pass_count: u32,
    span: Option<QuerySlot>,
    secondaries: Vec<CommandBufferHandle>,
    open: Option<OpenCommand>,
    scopes: Vec<OpenScope>,
    graphics: Option<PipelineKey>,
    compute: Option<PipelineKey>,
    ray_tracing: Option<PipelineKey>,
    shaders: BTreeMap<ShaderStage, ShaderHandle>,
}

impl Recording {
    fn new(
        queries: Option<QueryLease>,
        sampling: SamplingMode,
        render_pass_demand: usize,
    ) -> Self {
        Self {
            profiled: queries.is_some(),
            sampling,
            queries,
            reserved: Vec::new(),
            timers: 0,
            scope_timers: 0,
            max_scope_timers: 0,
            render_pass_demand,
            run: None,
            entries: Vec::new(),
            stats: DrawcallStats::default(),
            render_pass_count: 0,
            span: None,
            secondaries: Vec::new(),
            open: None,
            scopes: Vec::new(),
            graphics: None,
            compute: None,
            ray_tracing: None,
            shaders: BTreeMap::new(),
        }
    }

    fn binding_mut(&mut self, bind_point: BindPoint) -> &mut Option<PipelineKey> {
        match bind_point {
            BindPoint::Graphics => &mut self.graphics,
            BindPoint::Compute => &mut self.compute,
            BindPoint::RayTracing => &mut self.ray_tracing,
        }
    }

    fn pipeline_for(&self, pipeline_type: PipelineType) -> PipelineKey {
        let bound = match pipeline_type {
            PipelineType::Graphics => self.graphics,
            PipelineType::Compute => self.compute,
            PipelineType::RayTracing => self.ray_tracing,
            internal => return PipelineKey::internal(internal),
        };
        bound.unwrap_or(PipelineKey::pipeline(
            pipeline_type,
            PipelineHandle::NULL,
            0,
        ))
    }

    /// Tops the reserve up to `target` slots. Must not be called inside a render pass.
    fn reserve(&mut self, command_buffer: CommandBufferHandle, target: usize) {
        let Some(queries) = self.queries.as_mut() else {
            return;
        };
        if self.reserved.len() < target {
            let slots = queries.reserve(command_buffer, target - self.reserved.len());
            self.reserved.extend(slots.into_iter().rev());
        }
    }

    /// Takes a reserved timer and records its begin timestamp.
    ///
    /// Outside of render passes a dry reserve is refilled on the spot. Inside one the command
    /// stays unmeasured, as resets are not allowed there.
    fn begin_timer(
        &mut self,
        context: &DeviceContext,
        command_buffer: CommandBufferHandle,
    ) -> Option<QuerySlot> {
        if !self.profiled {
            return None;
        }
        self.timers += 1;
        if self.scopes.is_empty() {
            if self.reserved.is_empty() {
                self.reserve(command_buffer, MIN_RESERVATION.max(self.timers));
            }
        } else {
            self.scope_timers += 1;
        }
        let slot = self.reserved.pop()?;
        context.dispatch.cmd_write_timestamp(
            command_buffer,
            PipelineStage::TopOfPipe,
            slot.pool(),
            slot.begin_query(),
        );
        Some(slot)
    }

    fn close_run(&mut self, context: &DeviceContext, command_buffer: CommandBufferHandle) {
        if let Some(run) = self.run.take() {
            end_timer(context, command_buffer, run.query);
        }
    }

    /// Picks the timer for a command according to the sampling mode. The flag tells whether the
    /// command is timed as part of something coarser.
    fn command_timer(
        &mut self,
        context: &DeviceContext,
        command_buffer: CommandBufferHandle,
        pipeline: PipelineKey,
    ) -> (Option<QuerySlot>, bool) {
        match self.sampling {
            SamplingMode::PerDrawcall => (self.begin_timer(context, command_buffer), false),
            SamplingMode::PerPipeline => {
                if self.run.as_ref().is_some_and(|run| run.pipeline == pipeline) {
                    return (None, true);
                }
                self.close_run(context, command_buffer);
                let query = self.begin_timer(context, command_buffer);
                self.run = query.map(|query| PipelineRun { pipeline, query });
                (query, query.is_some())
            }
            SamplingMode::PerRenderPass | SamplingMode::PerFrame => (None, true),
        }
    }

    fn boundary(
        &mut self,
        context: &DeviceContext,
        command_buffer: CommandBufferHandle,
        kind: DrawcallType,
        checkpoint: CheckpointId,
    ) -> Option<Drawcall> {
        if !self.sampling.times_commands() {
            return None;
        }
        Some(Drawcall {
            pipeline: PipelineKey::internal(kind.pipeline_type()),
            query: self.begin_timer(context, command_buffer),
            checkpoint: Some(checkpoint),
            ticks: None,
            batched: false,
            kind,
        })
    }
}

fn end_timer(context: &DeviceContext, command_buffer: CommandBufferHandle, slot: QuerySlot) {
    context.dispatch.cmd_write_timestamp(
        command_buffer,
        PipelineStage::BottomOfPipe,
        slot.pool(),
        slot.end_query(),
    );
}

fn misuse(command_buffer: CommandBufferHandle, detail: &'static str) -> ProfilerError {
    let err = ProfilerError::InvalidState {
        command_buffer,
        state: CommandBufferState::Recording,
        detail,
    };
    error!("{err}");
    err
}

pub struct CommandBufferTracker {
    context: Arc<DeviceContext>,
    handle: CommandBufferHandle,
    pool: CommandPoolHandle,
    level: CommandBufferLevel,
    state: CommandBufferState,
    generation: u64,
    recording: Option<Recording>,
    trace: Option<Arc<CommandBufferTrace>>,
    pending_submissions: u32,
    desynchronized: bool,
    timer_demand: usize,
    render_pass_demand: usize,
}

impl CommandBufferTracker {
    pub(crate) fn new(
        context: Arc<DeviceContext>,
        handle: CommandBufferHandle,
        pool: CommandPoolHandle,
        level: CommandBufferLevel,
    ) -> Self {
        Self {
            context,
            handle,
            pool,
            level,
            state: CommandBufferState::NotRecording,
            generation: 0,
            recording: None,
            trace: None,
            pending_submissions: 0,
            desynchronized: false,
            timer_demand: 0,
            render_pass_demand: 0,
        }
    }

    pub fn handle(&self) -> CommandBufferHandle {
        self.handle
    }

    pub fn pool(&self) -> CommandPoolHandle {
        self.pool
    }

    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Whether the current recording is measured. Recordings begun while paused are not.
    pub fn is_profiled(&self) -> bool {
        self.recording.as_ref().is_some_and(|rec| rec.profiled) || self.trace.is_some()
    }

    /// The trace of the last finished recording.
    pub fn trace(&self) -> Option<&Arc<CommandBufferTrace>> {
        self.trace.as_ref()
    }

    /// Number of entries recorded so far in the current recording.
    pub fn recorded_entries(&self) -> usize {
        match (&self.recording, &self.trace) {
            (Some(rec), _) => rec.entries.len(),
            (None, Some(trace)) => trace.entries.len(),
            (None, None) => 0,
        }
    }

    fn active(&mut self) -> Result<(&DeviceContext, &mut Recording)> {
        if self.desynchronized {
            let err = ProfilerError::Desynchronized {
                command_buffer: self.handle,
            };
            debug!("{err}");
            return Err(err);
        }
        match self.recording.as_mut() {
            Some(rec) => Ok((&*self.context, rec)),
            None => {
                let err = ProfilerError::InvalidState {
                    command_buffer: self.handle,
                    state: self.state,
                    detail: "command buffer is not recording",
                };
                error!("{err}");
                Err(err)
            }
        }
    }

    /// Marks the command buffer unusable until the next begin or reset.
    fn desynchronize(&mut self) -> ProfilerError {
        self.desynchronized = true;
        let err = ProfilerError::UnbalancedRenderPass {
            command_buffer: self.handle,
        };
        error!("{err}");
        err
    }

    /// Starts a new recording, implicitly resetting the previous one.
    pub fn begin(&mut self) {
        self.start(true);
    }

    /// Starts recording a secondary command buffer that continues a render pass of its primary.
    /// Its queries could not be reset, so the recording is not measured.
    pub fn begin_render_pass_continuation(&mut self) {
        debug!("{} continues a render pass and is not measured", self.handle);
        self.start(false);
    }

    fn start(&mut self, measurable: bool) {
        self.reset();
        self.generation += 1;
        self.state = CommandBufferState::Recording;

        let config = &self.context.config;
        let queries = (measurable && !self.context.is_paused())
            .then(|| QueryLease::new(self.context.queries.clone()));
        let mut recording =
            Recording::new(queries, config.sampling_mode, self.render_pass_demand);
        recording.reserve(self.handle, MIN_RESERVATION.max(self.timer_demand));
        if config.sampling_mode.times_command_buffers(config.scope_timing) {
            recording.span = recording.begin_timer(&self.context, self.handle);
        }
        self.recording = Some(recording);
    }

    pub fn end(&mut self) -> Result<()> {
        let handle = self.handle;
        let (context, rec) = self.active()?;
        if rec.open.is_some() {
            return Err(misuse(handle, "command still open at end of recording"));
        }
        if !rec.scopes.is_empty() {
            return Err(self.desynchronize());
        }
        rec.close_run(context, handle);
        if let Some(slot) = rec.span {
            end_timer(context, handle, slot);
        }

        let Some(rec) = self.recording.take() else {
            return Ok(());
        };
        self.state = CommandBufferState::Executable;
        if rec.profiled {
            self.timer_demand = rec.timers;
            self.render_pass_demand = rec.max_scope_timers;
        }
        let (level, generation) = (self.level, self.generation);
        self.trace = rec.queries.map(|queries| {
            Arc::new(CommandBufferTrace {
                handle,
                level,
                generation,
                entries: rec.entries,
                stats: rec.stats,
                render_pass_count: rec.render_pass_count,
                span: rec.span,
                secondaries: rec.secondaries,
                queries,
            })
        });
        Ok(())
    }

    /// Drops the recording. Submissions still in flight keep their own reference to the trace,
    /// so its query slots go back to the pool only after those submissions are read back.
    pub fn reset(&mut self) {
        self.state = CommandBufferState::NotRecording;
        self.recording = None;
        self.trace = None;
        self.pending_submissions = 0;
        self.desynchronized = false;
    }

    pub fn pre_command(&mut self, drawcall: &DrawcallType) -> Result<()> {
        let handle = self.handle;
        let (context, rec) = self.active()?;
        if rec.open.is_some() {
            return Err(misuse(handle, "previous command was not finished"));
        }
        if drawcall.is_render_pass_boundary() {
            return Err(misuse(handle, "render pass boundaries go through the rendering hooks"));
        }

        let kind = mem::discriminant(drawcall);
        if !rec.profiled {
            rec.open = Some(OpenCommand {
                kind,
                drawcall: None,
            });
            return Ok(());
        }

        let (checkpoint_type, checkpoint_name) = match drawcall {
            DrawcallType::BeginDebugLabel { name, .. } => {
                (CheckpointType::PushMarker, name.as_str())
            }
            DrawcallType::EndDebugLabel => (CheckpointType::PopMarker, drawcall.name()),
            DrawcallType::InsertDebugLabel { name, .. } => (CheckpointType::Generic, name.as_str()),
            _ => (CheckpointType::Generic, drawcall.name()),
        };
        let checkpoint = context
            .checkpoints
            .allocate(checkpoint_type, checkpoint_name);

        let pipeline = rec.pipeline_for(drawcall.pipeline_type());
        let (query, batched) = if drawcall.is_debug_label() {
            (None, false)
        } else {
            rec.command_timer(context, handle, pipeline)
        };
        rec.open = Some(OpenCommand {
            kind,
            drawcall: Some(Drawcall {
                kind: drawcall.clone(),
                pipeline,
                query,
                checkpoint: Some(checkpoint),
                ticks: None,
                batched,
            }),
        });
        Ok(())
    }

    pub fn post_command(&mut self, drawcall: &DrawcallType) -> Result<()> {
        let handle = self.handle;
        let (context, rec) = self.active()?;
        let open = match rec.open.take() {
            Some(open) if open.kind == mem::discriminant(drawcall) => open,
            Some(open) => {
                rec.open = Some(open);
                return Err(misuse(handle, "command does not match the one in progress"));
            }
            None => return Err(misuse(handle, "no command in progress")),
        };

        if let Some(drawcall) = open.drawcall {
            // Runs are closed by whatever ends them, not by their first command.
            if let (Some(slot), false) = (drawcall.query, drawcall.batched) {
                end_timer(context, handle, slot);
            }
            rec.stats.record(&drawcall.kind);
            rec.entries.push(TraceEntry::Drawcall(drawcall));
        }
        Ok(())
    }

    pub fn pre_begin_rendering(&mut self, scope: RenderingScope) -> Result<()> {
        let handle = self.handle;
        let (context, rec) = self.active()?;
        if rec.open.is_some() {
            return Err(misuse(handle, "render pass begun inside a command"));
        }
        if rec
            .scopes
            .last()
            .is_some_and(|s| s.phase != ScopePhase::Open)
        {
            return Err(misuse(handle, "render pass boundary already in progress"));
        }

        let mut query = None;
        let mut boundary = None;
        if rec.profiled {
            rec.close_run(context, handle);
            if rec.scopes.is_empty() {
                // Everything timed until the pass ends comes out of this reserve.
                rec.reserve(handle, MIN_RESERVATION.max(rec.render_pass_demand) + 2);
                rec.scope_timers = 0;
            }
            let (name, render_pass) = match scope {
                RenderingScope::RenderPass(render_pass) => ("BeginRenderPass", render_pass),
                RenderingScope::Dynamic => ("BeginRendering", RenderPassHandle::NULL),
            };
            let checkpoint = context
                .checkpoints
                .allocate(CheckpointType::BeginRenderPass, name);
            if rec
                .sampling
                .times_render_passes(context.config.scope_timing)
            {
                query = rec.begin_timer(context, handle);
            }
            rec.render_pass_count += 1;
            rec.entries.push(TraceEntry::BeginRendering {
                scope,
                query,
                ticks: None,
            });
            boundary = rec.boundary(
                context,
                handle,
                DrawcallType::BeginRenderPass { render_pass },
                checkpoint,
            );
        }
        rec.scopes.push(OpenScope {
            query,
            boundary,
            phase: ScopePhase::Beginning,
        });
        Ok(())
    }

    pub fn post_begin_rendering(&mut self) -> Result<()> {
        let handle = self.handle;
        let (context, rec) = self.active()?;
        match rec.scopes.last_mut() {
            Some(scope) if scope.phase == ScopePhase::Beginning => {
                scope.phase = ScopePhase::Open;
                if let Some(drawcall) = scope.boundary.take() {
                    if let Some(slot) = drawcall.query {
                        end_timer(context, handle, slot);
                    }
                    rec.entries.push(TraceEntry::Drawcall(drawcall));
                }
                Ok(())
            }
            _ => Err(misuse(handle, "no render pass begin in progress")),
        }
    }

    pub fn pre_end_rendering(&mut self) -> Result<()> {
        let handle = self.handle;
        let (context, rec) = self.active()?;
        match rec.scopes.last_mut() {
            Some(scope) if scope.phase == ScopePhase::Open => scope.phase = ScopePhase::Ending,
            _ => return Err(self.desynchronize()),
        }

        if rec.profiled {
            rec.close_run(context, handle);
            let checkpoint = context
                .checkpoints
                .allocate(CheckpointType::EndRenderPass, "EndRenderPass");
            let boundary = rec.boundary(context, handle, DrawcallType::EndRenderPass, checkpoint);
            if let Some(scope) = rec.scopes.last_mut() {
                scope.boundary = boundary;
            }
        }
        Ok(())
    }

    pub fn post_end_rendering(&mut self) -> Result<()> {
        let handle = self.handle;
        let (context, rec) = self.active()?;
        let scope = match rec.scopes.pop() {
            Some(scope) if scope.phase == ScopePhase::Ending => scope,
            Some(scope) => {
                rec.scopes.push(scope);
                return Err(self.desynchronize());
            }
            None => return Err(self.desynchronize()),
        };

        if rec.profiled {
            if let Some(drawcall) = scope.boundary {
                if let Some(slot) = drawcall.query {
                    end_timer(context, handle, slot);
                }
                rec.entries.push(TraceEntry::Drawcall(drawcall));
            }
            if let Some(slot) = scope.query {
                end_timer(context, handle, slot);
            }
            rec.entries.push(TraceEntry::EndRendering);
            if rec.scopes.is_empty() {
                rec.max_scope_timers = rec.max_scope_timers.max(rec.scope_timers);
            }
        }
        Ok(())
    }

    pub fn bind_pipeline(&mut self, bind_point: BindPoint, pipeline: PipelineHandle) -> Result<()> {
        let (context, rec) = self.active()?;
        if !rec.profiled {
            return Ok(());
        }
        let record = context.resources.pipeline(pipeline)?;
        let key = PipelineKey::pipeline(
            record.pipeline_type(),
            pipeline,
            record.shader_tuple.hash(),
        );
        rec.shaders
            .retain(|stage, _| stage.bind_point() != bind_point);
        *rec.binding_mut(bind_point) = Some(key);
        Ok(())
    }

    /// Binds shader objects to stages; a null shader unbinds the stage. The last bind per stage
    /// decides how following drawcalls are attributed.
    pub fn bind_shaders(&mut self, stages: &[ShaderStage], shaders: &[ShaderHandle]) -> Result<()> {
        let (context, rec) = self.active()?;
        if !rec.profiled {
            return Ok(());
        }

        let mut touched = Vec::with_capacity(3);
        for (stage, shader) in stages.iter().zip(shaders) {
            if shader.is_null() {
                rec.shaders.remove(stage);
            } else {
                rec.shaders.insert(*stage, *shader);
            }
            if !touched.contains(&stage.bind_point()) {
                touched.push(stage.bind_point());
            }
        }

        for bind_point in touched {
            let bound: Vec<_> = rec
                .shaders
                .iter()
                .filter(|(stage, _)| stage.bind_point() == bind_point)
                .map(|(_, shader)| *shader)
                .collect();
            let key = if bound.is_empty() {
                None
            } else {
                let tuple = context.resources.shader_object_tuple(bound)?;
                let pipeline_type = match bind_point {
                    BindPoint::Graphics => PipelineType::Graphics,
                    BindPoint::Compute => PipelineType::Compute,
                    BindPoint::RayTracing => PipelineType::RayTracing,
                };
                Some(PipelineKey::shader_objects(pipeline_type, tuple.hash()))
            };
            *rec.binding_mut(bind_point) = key;
        }
        Ok(())
    }

    /// Barriers are counted, not timed.
    pub fn pipeline_barrier(&mut self, info: &PipelineBarrierInfo) -> Result<()> {
        let (_, rec) = self.active()?;
        if rec.profiled {
            rec.stats.pipeline_barrier_count +=
                info.memory_barrier_count + info.buffer_barrier_count + info.image_barrier_count;
        }
        Ok(())
    }

    pub fn execute_commands(&mut self, command_buffers: &[CommandBufferHandle]) -> Result<()> {
        let handle = self.handle;
        let level = self.level;
        let (context, rec) = self.active()?;
        if level == CommandBufferLevel::Secondary {
            return Err(misuse(handle, "secondary command buffers cannot execute others"));
        }
        if rec.profiled {
            rec.close_run(context, handle);
            for secondary in command_buffers {
                if !rec.secondaries.contains(secondary) {
                    rec.secondaries.push(*secondary);
                }
            }
            rec.entries
                .push(TraceEntry::ExecuteCommands(command_buffers.to_vec()));
        }
        Ok(())
    }

    /// Called when the command buffer goes to a queue. Returns the trace to read back later, or
    /// `None` if the recording was not profiled.
    pub(crate) fn submit(&mut self) -> Result<Option<Arc<CommandBufferTrace>>> {
        if self.desynchronized {
            return Err(ProfilerError::Desynchronized {
                command_buffer: self.handle,
            });
        }
        if self.state == CommandBufferState::NotRecording || self.recording.is_some() {
            let err = ProfilerError::InvalidState {
                command_buffer: self.handle,
                state: self.state,
                detail: "submitted without a finished recording",
            };
            error!("{err}");
            return Err(err);
        }

        let Some(trace) = self.trace.clone() else {
            return Ok(None);
        };
        self.state = CommandBufferState::Pending;
        self.pending_submissions += 1;
        Ok(Some(trace))
    }

    /// Called once a submission of the given recording has been read back.
    pub(crate) fn retire(&mut self, generation: u64) {
        if generation != self.generation || self.pending_submissions == 0 {
            return;
        }
        self.pending_submissions -= 1;
        if self.pending_submissions == 0 {
            self.state = CommandBufferState::Retired;
        }
    }
}
