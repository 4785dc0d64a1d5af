//! The per-device profiler object.
//!
//! A [`DeviceProfiler`] is created together with the device and dropped with it. The layer calls
//! into it around every intercepted driver call; the overlay or any other consumer reads frames
//! back out of it.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::checkpoint::Checkpoint;
use crate::command_buffer::{CommandBufferLevel, CommandBufferTracker};
use crate::config::{Config, FrameDelimiter};
use crate::context::DeviceContext;
use crate::deferred::{DeferredJoinStatus, DeferredOperations};
use crate::dispatch::{DeviceDispatch, DriverResult};
use crate::drawcall::PipelineKey;
use crate::error::Result;
use crate::frame::{FrameAggregate, FrameIndex};
use crate::handle::{
    CommandBufferHandle, CommandPoolHandle, DeferredOperationHandle, Handle, PipelineHandle,
    QueueHandle,
};
use crate::registry::Registry;
use crate::resources::{MemoryUsage, PipelineCreateInfo, ResourceRegistries};
use crate::shader::BindPoint;
use crate::submission::{SharedTracker, SubmissionEngine, SubmitAux, SubmitInfo};

pub struct DeviceProfiler {
    context: Arc<DeviceContext>,
    command_pools: Registry<CommandPoolHandle, Vec<CommandBufferHandle>>,
    command_buffers: Arc<Registry<CommandBufferHandle, SharedTracker>>,
    deferred: DeferredOperations,
    submissions: SubmissionEngine,
}

impl DeviceProfiler {
    pub fn new(dispatch: Arc<dyn DeviceDispatch>, config: Config) -> Result<Self> {
        let context = DeviceContext::new(dispatch, config)?;
        let command_buffers = Arc::new(Registry::new());
        let submissions = SubmissionEngine::new(context.clone(), command_buffers.clone());
        info!(
            "Profiler created: {} timer slots, {} frames of history",
            context.queries.capacity(),
            config.history_size
        );
        Ok(Self {
            context,
            command_pools: Registry::new(),
            command_buffers,
            deferred: DeferredOperations::new(),
            submissions,
        })
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Buffers, images, memory, shaders, pipelines and micromaps of the device.
    pub fn resources(&self) -> &ResourceRegistries {
        &self.context.resources
    }

    pub fn create_command_pool(&self, pool: CommandPoolHandle) -> Result<()> {
        self.command_pools.insert(pool, Vec::new())
    }

    /// Frees every command buffer still allocated from the pool.
    pub fn destroy_command_pool(&self, pool: CommandPoolHandle) -> Result<()> {
        if pool.is_null() {
            return Ok(());
        }
        for command_buffer in self.command_pools.remove(pool)? {
            self.forget_command_buffer(command_buffer);
        }
        Ok(())
    }

    pub fn reset_command_pool(&self, pool: CommandPoolHandle) -> Result<()> {
        for command_buffer in self.command_pools.get(pool)? {
            if let Some(tracker) = self.command_buffers.find(command_buffer) {
                tracker.lock().reset();
            }
        }
        Ok(())
    }

    pub fn allocate_command_buffers(
        &self,
        pool: CommandPoolHandle,
        level: CommandBufferLevel,
        command_buffers: &[CommandBufferHandle],
    ) -> Result<()> {
        let allocated: Vec<_> = command_buffers
            .iter()
            .copied()
            .filter(|handle| !handle.is_null())
            .collect();
        // Fails for unknown pools before anything is registered.
        self.command_pools
            .with_mut(pool, |owned| owned.extend_from_slice(&allocated))?;
        for command_buffer in allocated {
            let tracker =
                CommandBufferTracker::new(self.context.clone(), command_buffer, pool, level);
            self.command_buffers
                .insert(command_buffer, Arc::new(Mutex::new(tracker)))?;
        }
        Ok(())
    }

    /// Drops the trackers. Pending submissions of these command buffers are discarded.
    pub fn free_command_buffers(
        &self,
        pool: CommandPoolHandle,
        command_buffers: &[CommandBufferHandle],
    ) -> Result<()> {
        self.command_pools.with_mut(pool, |owned| {
            owned.retain(|handle| !command_buffers.contains(handle))
        })?;
        for &command_buffer in command_buffers {
            if command_buffer.is_null() {
                continue;
            }
            self.command_buffers.remove(command_buffer)?;
            self.submissions.discard(command_buffer);
        }
        Ok(())
    }

    fn forget_command_buffer(&self, command_buffer: CommandBufferHandle) {
        if self.command_buffers.remove(command_buffer).is_ok() {
            self.submissions.discard(command_buffer);
        }
    }

    /// The live tracker of a command buffer.
    pub fn command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<SharedTracker> {
        self.command_buffers.get(command_buffer)
    }

    pub fn create_deferred_operation(&self, operation: DeferredOperationHandle) -> Result<()> {
        self.deferred.create(operation)
    }

    pub fn destroy_deferred_operation(&self, operation: DeferredOperationHandle) -> Result<()> {
        self.deferred.destroy(operation)
    }

    /// Returns whether the operation's completion callback ran.
    pub fn deferred_operation_join(
        &self,
        operation: DeferredOperationHandle,
        status: DeferredJoinStatus,
    ) -> Result<bool> {
        self.deferred.join(operation, status)
    }

    /// Registers ray tracing pipelines whose creation was deferred to `operation`.
    ///
    /// The records are built right away, while the shader modules are still alive. `resolve`
    /// runs once the operation completes and returns the handles the driver wrote by then.
    pub fn create_deferred_ray_tracing_pipelines(
        &self,
        operation: DeferredOperationHandle,
        infos: &[PipelineCreateInfo<'_>],
        resolve: impl FnOnce() -> Vec<PipelineHandle> + Send + 'static,
    ) -> Result<()> {
        let records = infos
            .iter()
            .map(|info| self.resources().pipeline_record(BindPoint::RayTracing, info))
            .collect::<Result<Vec<_>>>()?;
        let resources = self.context.resources.clone();
        self.deferred.set_callback(
            operation,
            Box::new(move || {
                for (pipeline, record) in resolve().into_iter().zip(records) {
                    if pipeline.is_null() {
                        continue;
                    }
                    debug!("Registered deferred {pipeline} as {}", record.name());
                    // Duplicates are logged by the registry.
                    let _ = resources.insert_pipeline(pipeline, record);
                }
            }),
        )
    }

    /// Called before the application's submission is forwarded. The returned signal, if any,
    /// must be appended to the submission.
    pub fn pre_submit_command_buffers(&self, queue: QueueHandle) -> Result<Option<SubmitAux>> {
        self.submissions.pre_submit(queue)
    }

    /// Called with the driver's result once the submission was forwarded.
    pub fn post_submit_command_buffers(
        &self,
        queue: QueueHandle,
        submits: &[SubmitInfo<'_>],
        aux: Option<SubmitAux>,
        result: DriverResult<()>,
    ) -> Result<()> {
        self.submissions.post_submit(queue, submits, aux, result)
    }

    /// Called after a present was forwarded. Ends the frame if frames are delimited by presents,
    /// then retires whatever completed.
    pub fn present(&self, queue: QueueHandle) -> Result<()> {
        if !self.is_paused() && self.config().frame_delimiter == FrameDelimiter::Present {
            let next = self.submissions.end_frame();
            debug!("{queue} presented, {next:?} begins");
        }
        self.poll().map(drop)
    }

    /// Retires completed submissions without waiting. Returns how many were retired.
    pub fn poll(&self) -> Result<usize> {
        self.submissions.poll()
    }

    /// The newest finished frame, or an empty aggregate before the first one.
    pub fn latest_frame(&self) -> Arc<FrameAggregate> {
        self.submissions.latest_frame()
    }

    /// Finished frames still in the history, oldest first.
    pub fn frames(&self) -> Vec<Arc<FrameAggregate>> {
        self.submissions.frames()
    }

    pub fn current_frame(&self) -> FrameIndex {
        self.submissions.current_frame()
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.submissions.frame_rate()
    }

    pub fn smoothed_frame_time_ns(&self) -> Option<f64> {
        self.submissions.smoothed_frame_time_ns()
    }

    pub fn pending_submissions(&self) -> usize {
        self.submissions.pending_count()
    }

    pub fn is_paused(&self) -> bool {
        self.context.is_paused()
    }

    /// Pauses or resumes measurement. Returns the previous state.
    pub fn set_paused(&self, paused: bool) -> bool {
        let was_paused = self.context.set_paused(paused);
        if was_paused != paused {
            info!("Profiling {}", if paused { "paused" } else { "resumed" });
        }
        was_paused
    }

    pub fn pipeline_name(&self, key: &PipelineKey) -> String {
        self.resources().pipeline_name(key)
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.resources().memory_usage()
    }

    /// Up to `count` of the most recent checkpoints, newest first.
    pub fn dump_checkpoints(&self, count: usize) -> Vec<Checkpoint> {
        self.context.checkpoints.recent(count)
    }
}

impl Drop for DeviceProfiler {
    fn drop(&mut self) {
        let pending = self.submissions.pending_count();
        if pending > 0 {
            warn!("Device destroyed with {pending} submissions still pending");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::command_buffer::tests::{draw, record_draw};
    use crate::command_buffer::{CommandBufferState, RenderingScope};
    use crate::config::SamplingMode;
    use crate::dispatch::DriverError;
    use crate::drawcall::{DrawcallType, PipelineType};
    use crate::error::ProfilerError;
    use crate::handle::ShaderModuleHandle;
    use crate::mock::MockDevice;
    use crate::resources::PipelineStageInfo;
    use crate::shader::ShaderStage;

    const POOL: CommandPoolHandle = CommandPoolHandle(1);
    const QUEUE: QueueHandle = QueueHandle(1);

    fn setup(config: Config) -> (Arc<MockDevice>, DeviceProfiler) {
        let device = Arc::new(MockDevice::new());
        let profiler = DeviceProfiler::new(device.clone(), config).unwrap();
        profiler.create_command_pool(POOL).unwrap();
        (device, profiler)
    }

    fn allocate(
        profiler: &DeviceProfiler,
        handle: u64,
        level: CommandBufferLevel,
    ) -> SharedTracker {
        let handle = CommandBufferHandle(handle);
        profiler
            .allocate_command_buffers(POOL, level, &[handle])
            .unwrap();
        profiler.command_buffer(handle).unwrap()
    }

    fn record(device: &MockDevice, tracker: &SharedTracker, draws: u32) {
        let mut tracker = tracker.lock();
        device.forget(tracker.handle());
        tracker.begin();
        for i in 0..draws {
            record_draw(&mut tracker, i + 1);
        }
        tracker.end().unwrap();
    }

    /// Submits and runs the command buffers, returning the signal without firing it.
    fn submit(
        profiler: &DeviceProfiler,
        device: &MockDevice,
        queue: QueueHandle,
        command_buffers: &[CommandBufferHandle],
    ) -> Option<SubmitAux> {
        let aux = profiler.pre_submit_command_buffers(queue).unwrap();
        profiler
            .post_submit_command_buffers(queue, &[SubmitInfo { command_buffers }], aux, Ok(()))
            .unwrap();
        for &command_buffer in command_buffers {
            device.execute(command_buffer);
        }
        aux
    }

    fn signal(device: &MockDevice, aux: Option<SubmitAux>) {
        if let Some(aux) = aux {
            device.signal(aux.signal_semaphore, aux.signal_value);
        }
    }

    fn no_scope_timing() -> Config {
        Config {
            scope_timing: false,
            ..Config::default()
        }
    }

    #[test]
    fn pipeline_histogram_covers_every_draw() {
        let (device, profiler) = setup(Config::default());
        let code = [0x0723_0203, 0x0001_0000, 0, 1, 0];
        profiler
            .resources()
            .create_shader_module(ShaderModuleHandle(1), &code)
            .unwrap();
        let entry_points = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let pipelines: Vec<_> = (0..8).map(|i| PipelineHandle(100 + i)).collect();
        for (pipeline, entry_point) in pipelines.iter().zip(entry_points) {
            let stages = [PipelineStageInfo {
                stage: ShaderStage::Vertex,
                module: ShaderModuleHandle(1),
                entry_point,
            }];
            profiler
                .resources()
                .create_pipelines(
                    BindPoint::Graphics,
                    &[PipelineCreateInfo { stages: &stages }],
                    &[*pipeline],
                )
                .unwrap();
        }

        let cb = allocate(&profiler, 10, CommandBufferLevel::Primary);
        {
            let mut tracker = cb.lock();
            tracker.begin();
            for i in 0..10 {
                tracker
                    .bind_pipeline(BindPoint::Graphics, pipelines[i % 8])
                    .unwrap();
                record_draw(&mut tracker, 3);
            }
            tracker.end().unwrap();
        }
        let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(10)]);
        signal(&device, aux);
        profiler.present(QUEUE).unwrap();

        let frame = profiler.latest_frame();
        assert_eq!(frame.index, FrameIndex(0));
        assert_eq!(frame.drawcall_count, 10);
        assert_eq!(frame.stats.draw_count, 10);
        assert_eq!(frame.submit_count, 1);
        assert_eq!(frame.command_buffer_count, 1);
        assert_eq!(frame.pipelines.len(), 8);
        assert_eq!(
            frame.pipelines.iter().map(|p| p.drawcall_count).sum::<u32>(),
            10
        );
        // Every timestamp write advances the mock clock by 10 ticks.
        assert_eq!(frame.gpu_ticks, 100);
        assert_eq!(frame.gpu_time_ns(), 100);
        assert_eq!(frame.command_buffer_ticks, 210);
        assert_eq!(frame.pipelines[0].ticks, 20);
        assert_eq!(
            frame.gpu_ticks,
            frame.submits[0].command_buffers[0].drawcall_ticks()
        );
        assert_eq!(cb.lock().state(), CommandBufferState::Retired);
    }

    #[test]
    fn exhausted_pool_passes_commands_through_unmeasured() {
        let (device, profiler) = setup(Config {
            query_pool_size: 1,
            ..no_scope_timing()
        });
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        {
            let mut tracker = cb.lock();
            tracker.begin();
            record_draw(&mut tracker, 3);
            // The only slot is taken, but the command is still recorded.
            let drawcall = draw(4);
            tracker.pre_command(&drawcall).unwrap();
            tracker.post_command(&drawcall).unwrap();
            tracker.end().unwrap();
            assert_eq!(tracker.trace().unwrap().query_count(), 1);
        }
        let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        signal(&device, aux);
        profiler.present(QUEUE).unwrap();

        let frame = profiler.latest_frame();
        assert_eq!(frame.drawcall_count, 2);
        assert_eq!(frame.unmeasured_count, 1);
        assert_eq!(frame.gpu_ticks, 10);
    }

    #[test]
    fn work_belongs_to_the_frame_it_was_submitted_in() {
        let (device, profiler) = setup(no_scope_timing());
        let first = allocate(&profiler, 1, CommandBufferLevel::Primary);
        let second = allocate(&profiler, 2, CommandBufferLevel::Primary);

        record(&device, &first, 1);
        let first_aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        profiler.present(QUEUE).unwrap();
        // Frame 0 is closed but its submission has not completed yet.
        assert!(profiler.latest_frame().is_empty());
        assert_eq!(profiler.pending_submissions(), 1);

        record(&device, &second, 2);
        let second_aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(2)]);
        signal(&device, first_aux);
        signal(&device, second_aux);
        profiler.present(QUEUE).unwrap();

        let frames = profiler.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].index, FrameIndex(0));
        assert_eq!(frames[0].drawcall_count, 1);
        assert_eq!(frames[1].index, FrameIndex(1));
        assert_eq!(frames[1].drawcall_count, 2);
        assert_eq!(profiler.pending_submissions(), 0);
        assert!(profiler.frame_rate().is_some());
    }

    #[test]
    fn unsignalled_submissions_are_left_for_later() {
        let (device, profiler) = setup(no_scope_timing());
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        record(&device, &cb, 1);
        let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        assert_eq!(cb.lock().state(), CommandBufferState::Pending);

        assert_eq!(profiler.poll().unwrap(), 0);
        assert_eq!(profiler.poll().unwrap(), 0);
        signal(&device, aux);
        assert_eq!(profiler.poll().unwrap(), 1);
        assert_eq!(cb.lock().state(), CommandBufferState::Retired);
    }

    #[test]
    fn concurrent_submissions_are_counted_once() {
        const THREADS: u64 = 4;
        const ITERATIONS: u32 = 50;
        let (device, profiler) = setup(Config::default());
        let trackers: Vec<_> = (0..THREADS)
            .map(|i| allocate(&profiler, 100 + i, CommandBufferLevel::Primary))
            .collect();

        thread::scope(|scope| {
            for (i, tracker) in trackers.iter().enumerate() {
                let profiler = &profiler;
                let device = &device;
                scope.spawn(move || {
                    let queue = QueueHandle(10 + i as u64);
                    let handle = tracker.lock().handle();
                    for _ in 0..ITERATIONS {
                        record(device, tracker, 2);
                        let aux = submit(profiler, device, queue, &[handle]);
                        signal(device, aux);
                        profiler.poll().unwrap();
                    }
                });
            }
        });
        profiler.present(QUEUE).unwrap();

        let frame = profiler.latest_frame();
        let expected = THREADS as u32 * ITERATIONS;
        assert_eq!(frame.submit_count, expected);
        assert_eq!(frame.command_buffer_count, expected);
        assert_eq!(frame.drawcall_count, 2 * expected);
        assert_eq!(frame.unmeasured_count, 0);
        assert_eq!(frame.gpu_ticks, 2 * expected as u64 * 10);
        assert_eq!(profiler.pending_submissions(), 0);

        for tracker in &trackers {
            tracker.lock().reset();
        }
        let queries = &profiler.context.queries;
        assert_eq!(queries.free_slots(), queries.capacity());
    }

    #[test]
    fn secondaries_retire_with_their_primary() {
        let (device, profiler) = setup(no_scope_timing());
        let secondary = allocate(&profiler, 2, CommandBufferLevel::Secondary);
        let primary = allocate(&profiler, 1, CommandBufferLevel::Primary);
        record(&device, &secondary, 3);
        {
            let mut tracker = primary.lock();
            tracker.begin();
            record_draw(&mut tracker, 1);
            tracker.execute_commands(&[CommandBufferHandle(2)]).unwrap();
            tracker.end().unwrap();
        }

        let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        device.execute(CommandBufferHandle(2));
        assert_eq!(secondary.lock().state(), CommandBufferState::Pending);
        signal(&device, aux);
        profiler.present(QUEUE).unwrap();

        let frame = profiler.latest_frame();
        assert_eq!(frame.command_buffer_count, 2);
        assert_eq!(frame.drawcall_count, 4);
        assert_eq!(frame.gpu_ticks, 40);
        assert_eq!(frame.submits[0].command_buffers[0].secondaries.len(), 1);
        assert_eq!(secondary.lock().state(), CommandBufferState::Retired);
    }

    #[test]
    fn render_pass_time_is_reported() {
        let (device, profiler) = setup(Config::default());
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        {
            let mut tracker = cb.lock();
            tracker.begin();
            tracker.pre_begin_rendering(RenderingScope::Dynamic).unwrap();
            tracker.post_begin_rendering().unwrap();
            record_draw(&mut tracker, 3);
            tracker.pre_end_rendering().unwrap();
            tracker.post_end_rendering().unwrap();
            tracker.end().unwrap();
        }
        let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        signal(&device, aux);
        profiler.present(QUEUE).unwrap();

        let frame = profiler.latest_frame();
        assert_eq!(frame.render_pass_count, 1);
        // The draw plus the timed begin and end of the pass.
        assert_eq!(frame.drawcall_count, 3);
        assert_eq!(frame.stats.draw_count, 1);
        assert_eq!(frame.gpu_ticks, 30);
        assert_eq!(frame.render_pass_ticks, 70);
        assert_eq!(frame.command_buffer_ticks, 90);
        let boundaries: Vec<_> = frame
            .pipelines
            .iter()
            .filter(|p| p.key.pipeline_type.is_internal())
            .map(|p| (p.name.as_str(), p.drawcall_count, p.ticks))
            .collect();
        assert_eq!(boundaries.len(), 2);
        assert!(boundaries.contains(&("BeginRenderPass", 1, 10)));
        assert!(boundaries.contains(&("EndRenderPass", 1, 10)));
    }

    #[test]
    fn resubmission_while_pending_reads_fresh_timestamps() {
        let (device, profiler) = setup(Config::default());
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        record(&device, &cb, 2);
        let first = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        let second = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        assert_eq!(profiler.pending_submissions(), 2);
        signal(&device, first);
        signal(&device, second);
        profiler.present(QUEUE).unwrap();

        assert_eq!(device.stale_writes(), 0);
        let frame = profiler.latest_frame();
        assert_eq!(frame.submit_count, 2);
        assert_eq!(frame.drawcall_count, 4);
        assert_eq!(frame.unmeasured_count, 0);
        assert_eq!(frame.gpu_ticks, 40);
        assert_eq!(frame.command_buffer_ticks, 2 * 50);
        assert_eq!(cb.lock().state(), CommandBufferState::Retired);
    }

    #[test]
    fn submissions_overlapping_other_queues_are_flagged() {
        let (device, profiler) = setup(no_scope_timing());
        let graphics = allocate(&profiler, 1, CommandBufferLevel::Primary);
        let compute = allocate(&profiler, 2, CommandBufferLevel::Primary);
        record(&device, &graphics, 1);
        record(&device, &compute, 1);

        let first = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        // Same queue as the pending one, so not an overlap.
        let again = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        let other = submit(&profiler, &device, QueueHandle(2), &[CommandBufferHandle(2)]);
        signal(&device, first);
        signal(&device, again);
        signal(&device, other);
        profiler.present(QUEUE).unwrap();

        let frame = profiler.latest_frame();
        assert_eq!(frame.submit_count, 3);
        assert_eq!(frame.overlapping_submit_count, 1);
        let flags: Vec<_> = frame
            .submits
            .iter()
            .map(|s| (s.queue, s.overlapping))
            .collect();
        assert!(flags.contains(&(QueueHandle(2), true)));
        assert!(!flags.contains(&(QUEUE, true)));
    }

    #[test]
    fn per_pipeline_sampling_times_runs() {
        let (device, profiler) = setup(Config {
            sampling_mode: SamplingMode::PerPipeline,
            ..no_scope_timing()
        });
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        {
            let mut tracker = cb.lock();
            tracker.begin();
            for i in 0..3 {
                record_draw(&mut tracker, i + 1);
            }
            let dispatch = DrawcallType::Dispatch {
                group_count_x: 1,
                group_count_y: 1,
                group_count_z: 1,
            };
            tracker.pre_command(&dispatch).unwrap();
            tracker.post_command(&dispatch).unwrap();
            tracker.end().unwrap();
        }
        assert_eq!(device.recorded_writes(CommandBufferHandle(1)), 4);
        let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        signal(&device, aux);
        profiler.present(QUEUE).unwrap();

        let frame = profiler.latest_frame();
        assert_eq!(frame.drawcall_count, 4);
        assert_eq!(frame.unmeasured_count, 0);
        assert_eq!(frame.gpu_ticks, 20);
        let pipelines: Vec<_> = frame
            .pipelines
            .iter()
            .map(|p| (p.key.pipeline_type, p.drawcall_count, p.ticks))
            .collect();
        assert!(pipelines.contains(&(PipelineType::Graphics, 3, 10)));
        assert!(pipelines.contains(&(PipelineType::Compute, 1, 10)));
    }

    #[test]
    fn submit_delimiter_ends_a_frame_per_submission() {
        let (device, profiler) = setup(Config {
            frame_delimiter: FrameDelimiter::Submit,
            ..no_scope_timing()
        });
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        for _ in 0..3 {
            record(&device, &cb, 1);
            let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
            signal(&device, aux);
            profiler.poll().unwrap();
        }
        let frames = profiler.frames();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.submit_count == 1));
        assert_eq!(profiler.current_frame(), FrameIndex(3));
    }

    #[test]
    fn paused_profiler_measures_nothing() {
        let (device, profiler) = setup(Config::default());
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        assert!(!profiler.set_paused(true));
        assert!(profiler.is_paused());

        record(&device, &cb, 2);
        assert_eq!(device.recorded_writes(CommandBufferHandle(1)), 0);
        let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        assert_eq!(aux, None);
        profiler.present(QUEUE).unwrap();
        assert_eq!(profiler.current_frame(), FrameIndex(0));
        assert!(profiler.frames().is_empty());

        assert!(profiler.set_paused(false));
        record(&device, &cb, 2);
        let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        assert!(aux.is_some());
        signal(&device, aux);
        profiler.present(QUEUE).unwrap();
        assert_eq!(profiler.latest_frame().drawcall_count, 2);
    }

    #[test]
    fn freeing_pending_command_buffer_returns_slots() {
        let (device, profiler) = setup(Config::default());
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        record(&device, &cb, 3);
        drop(cb);
        let aux = submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        profiler
            .free_command_buffers(POOL, &[CommandBufferHandle(1)])
            .unwrap();
        assert!(profiler.command_buffer(CommandBufferHandle(1)).is_err());

        let queries = &profiler.context.queries;
        assert_eq!(queries.free_slots(), queries.capacity());

        signal(&device, aux);
        profiler.present(QUEUE).unwrap();
        let frame = profiler.latest_frame();
        assert_eq!(frame.submit_count, 1);
        assert_eq!(frame.command_buffer_count, 0);
    }

    #[test]
    fn destroying_pool_frees_its_command_buffers() {
        let (_, profiler) = setup(Config::default());
        allocate(&profiler, 1, CommandBufferLevel::Primary);
        allocate(&profiler, 2, CommandBufferLevel::Secondary);
        profiler.reset_command_pool(POOL).unwrap();
        profiler.destroy_command_pool(POOL).unwrap();
        assert!(profiler.command_buffer(CommandBufferHandle(1)).is_err());
        assert!(profiler.command_buffer(CommandBufferHandle(2)).is_err());
        assert!(profiler
            .allocate_command_buffers(POOL, CommandBufferLevel::Primary, &[CommandBufferHandle(3)])
            .is_err());
        profiler.destroy_command_pool(CommandPoolHandle::NULL).unwrap();
    }

    #[test]
    fn failed_submission_registers_nothing() {
        let (device, profiler) = setup(Config::default());
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        record(&device, &cb, 1);
        let aux = profiler.pre_submit_command_buffers(QUEUE).unwrap();
        profiler
            .post_submit_command_buffers(
                QUEUE,
                &[SubmitInfo {
                    command_buffers: &[CommandBufferHandle(1)],
                }],
                aux,
                Err(DriverError::OUT_OF_HOST_MEMORY),
            )
            .unwrap();
        assert_eq!(profiler.pending_submissions(), 0);
        assert_eq!(cb.lock().state(), CommandBufferState::Executable);
    }

    #[test]
    fn unknown_command_buffer_in_submission_is_reported() {
        let (device, profiler) = setup(Config::default());
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        record(&device, &cb, 1);
        let aux = profiler.pre_submit_command_buffers(QUEUE).unwrap();
        let err = profiler
            .post_submit_command_buffers(
                QUEUE,
                &[SubmitInfo {
                    command_buffers: &[CommandBufferHandle(1), CommandBufferHandle(9)],
                }],
                aux,
                Ok(()),
            )
            .unwrap_err();
        assert!(matches!(err, ProfilerError::UnknownHandle { .. }));
        // The known command buffer is still tracked.
        assert_eq!(profiler.pending_submissions(), 1);
    }

    #[test]
    fn device_loss_is_reported_with_checkpoints() {
        let (device, profiler) = setup(Config::default());
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        record(&device, &cb, 2);
        submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        device.lose_device();

        let err = profiler.poll().unwrap_err();
        assert!(matches!(err, ProfilerError::Driver(e) if e.is_device_lost()));
        let checkpoints = profiler.dump_checkpoints(8);
        assert_eq!(checkpoints.len(), 2);
        assert!(checkpoints[0].id() > checkpoints[1].id());
    }

    #[test]
    fn deferred_ray_tracing_pipelines_register_on_completion() {
        let (_, profiler) = setup(Config::default());
        let operation = DeferredOperationHandle(5);
        let code = [0x0723_0203, 0x0001_0000, 0, 1, 0];
        profiler
            .resources()
            .create_shader_module(ShaderModuleHandle(1), &code)
            .unwrap();
        profiler.create_deferred_operation(operation).unwrap();

        let stages = [
            PipelineStageInfo {
                stage: ShaderStage::RayGeneration,
                module: ShaderModuleHandle(1),
                entry_point: "raygen",
            },
            PipelineStageInfo {
                stage: ShaderStage::ClosestHit,
                module: ShaderModuleHandle(1),
                entry_point: "hit",
            },
        ];
        profiler
            .create_deferred_ray_tracing_pipelines(
                operation,
                &[PipelineCreateInfo { stages: &stages }],
                || vec![PipelineHandle(77)],
            )
            .unwrap();
        // The module may go away before the operation completes.
        profiler
            .resources()
            .destroy_shader_module(ShaderModuleHandle(1))
            .unwrap();

        assert!(!profiler
            .deferred_operation_join(operation, DeferredJoinStatus::ThreadIdle)
            .unwrap());
        assert!(profiler.resources().pipeline(PipelineHandle(77)).is_err());
        assert!(profiler
            .deferred_operation_join(operation, DeferredJoinStatus::Success)
            .unwrap());

        let pipeline = profiler.resources().pipeline(PipelineHandle(77)).unwrap();
        assert_eq!(pipeline.bind_point, BindPoint::RayTracing);
        assert!(pipeline.name().starts_with("RGEN="));
        profiler.destroy_deferred_operation(operation).unwrap();
    }

    #[test]
    fn dropping_profiler_releases_driver_objects() {
        let (device, profiler) = setup(Config::default());
        let cb = allocate(&profiler, 1, CommandBufferLevel::Primary);
        record(&device, &cb, 1);
        submit(&profiler, &device, QUEUE, &[CommandBufferHandle(1)]);
        assert_eq!(device.live_semaphores(), 1);
        drop(cb);
        drop(profiler);
        assert_eq!(device.live_semaphores(), 0);
        assert_eq!(device.live_query_pools(), 0);
    }
}
