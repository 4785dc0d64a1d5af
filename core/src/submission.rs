//! Queue submissions and their readback.
//!
//! Every profiled submission signals a per-queue timeline semaphore. Polling compares the
//! semaphore values against what each pending submission signals and reads back the timers of
//! everything that has completed, without ever waiting on the GPU. Read-back submissions are
//! folded into the frame that was current when they were submitted; a frame is published once it
//! has been closed and all of its submissions have been read back.

use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use ahash::AHashMap;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::command_buffer::{CommandBufferTrace, CommandBufferTracker, TraceEntry};
use crate::config::FrameDelimiter;
use crate::context::DeviceContext;
use crate::dispatch::DriverResult;
use crate::drawcall::Drawcall;
use crate::error::{ProfilerError, Result};
use crate::frame::{CommandBufferData, FrameAggregate, FrameBuilder, FrameIndex, SubmitData};
use crate::handle::{CommandBufferHandle, QueueHandle, SemaphoreHandle};
use crate::history::FrameHistory;
use crate::query_pool::QuerySlot;
use crate::registry::Registry;
use crate::{time, Timestamp};

const DEVICE_LOST_CHECKPOINTS: usize = 32;

pub type SharedTracker = Arc<Mutex<CommandBufferTracker>>;

/// One batch of a queue submission.
#[derive(Copy, Clone, Debug)]
pub struct SubmitInfo<'a> {
    pub command_buffers: &'a [CommandBufferHandle],
}

/// Signal operation the layer appends to the application's submission.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SubmitAux {
    pub signal_semaphore: SemaphoreHandle,
    pub signal_value: u64,
}

struct QueueTimeline {
    semaphore: SemaphoreHandle,
    next_value: u64,
    valid_bits: u32,
}

struct SubmittedCommandBuffer {
    trace: Arc<CommandBufferTrace>,
    secondaries: Vec<SubmittedCommandBuffer>,
}

impl SubmittedCommandBuffer {
    fn for_each(&self, f: &mut impl FnMut(&CommandBufferTrace)) {
        f(&self.trace);
        for secondary in &self.secondaries {
            secondary.for_each(f);
        }
    }

    fn discard(&mut self, command_buffer: CommandBufferHandle) {
        self.secondaries
            .retain(|secondary| secondary.trace.handle() != command_buffer);
        for secondary in &mut self.secondaries {
            secondary.discard(command_buffer);
        }
    }
}

struct PendingSubmission {
    queue: QueueHandle,
    frame: FrameIndex,
    semaphore: SemaphoreHandle,
    value: u64,
    valid_bits: u32,
    cpu_timestamp: Timestamp,
    overlapping: bool,
    submits: Vec<Vec<SubmittedCommandBuffer>>,
}

impl PendingSubmission {
    fn for_each_trace(&self, mut f: impl FnMut(&CommandBufferTrace)) {
        for command_buffer in self.submits.iter().flatten() {
            command_buffer.for_each(&mut f);
        }
    }
}

struct FrameState {
    current: FrameIndex,
    open: BTreeMap<FrameIndex, FrameBuilder>,
}

impl FrameState {
    fn current_mut(&mut self) -> &mut FrameBuilder {
        let index = self.current;
        self.open
            .entry(index)
            .or_insert_with(|| FrameBuilder::new(index, time::timestamp_now()))
    }
}

pub(crate) struct SubmissionEngine {
    context: Arc<DeviceContext>,
    command_buffers: Arc<Registry<CommandBufferHandle, SharedTracker>>,
    queues: Mutex<AHashMap<QueueHandle, QueueTimeline>>,
    pending: Mutex<Vec<PendingSubmission>>,
    frames: Mutex<FrameState>,
    /// Held for a whole retirement pass, so passes never interleave.
    retire_lock: Mutex<()>,
    history: RwLock<FrameHistory>,
}

impl SubmissionEngine {
    pub fn new(
        context: Arc<DeviceContext>,
        command_buffers: Arc<Registry<CommandBufferHandle, SharedTracker>>,
    ) -> Self {
        let first = FrameIndex::default();
        let history = FrameHistory::new(context.config.history_size);
        Self {
            context,
            command_buffers,
            queues: Mutex::new(AHashMap::new()),
            pending: Mutex::new(Vec::new()),
            frames: Mutex::new(FrameState {
                current: first,
                open: BTreeMap::from([(first, FrameBuilder::new(first, time::timestamp_now()))]),
            }),
            retire_lock: Mutex::new(()),
            history: RwLock::new(history),
        }
    }

    /// Reserves the semaphore signal for an upcoming submission to `queue`.
    ///
    /// Returns `None` while profiling is paused; the submission then goes through untouched.
    pub fn pre_submit(&self, queue: QueueHandle) -> Result<Option<SubmitAux>> {
        if self.context.is_paused() {
            return Ok(None);
        }
        let mut queues = self.queues.lock();
        let timeline = match queues.entry(queue) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let semaphore = self.context.dispatch.create_timeline_semaphore(0)?;
                let valid_bits = self.context.dispatch.timestamp_valid_bits(queue);
                debug!("Tracking {queue} with {semaphore}, {valid_bits} valid timestamp bits");
                entry.insert(QueueTimeline {
                    semaphore,
                    next_value: 1,
                    valid_bits,
                })
            }
        };
        let aux = SubmitAux {
            signal_semaphore: timeline.semaphore,
            signal_value: timeline.next_value,
        };
        timeline.next_value += 1;
        Ok(Some(aux))
    }

    /// Registers a submission after the driver accepted it.
    ///
    /// Command buffers that cannot be submitted are skipped; the first such error is returned
    /// once the rest of the submission has been registered.
    pub fn post_submit(
        &self,
        queue: QueueHandle,
        submits: &[SubmitInfo<'_>],
        aux: Option<SubmitAux>,
        result: DriverResult<()>,
    ) -> Result<()> {
        if let Err(err) = result {
            if err.is_device_lost() {
                self.report_device_lost();
            }
            debug!("Submission to {queue} failed: {err}");
            return Ok(());
        }

        let cpu_timestamp = time::timestamp_now();
        let mut first_error = None;
        let submitted: Vec<Vec<_>> = submits
            .iter()
            .map(|submit| {
                submit
                    .command_buffers
                    .iter()
                    .filter_map(|&handle| self.submit_command_buffer(handle, &mut first_error))
                    .collect()
            })
            .collect();
        let has_work = submitted.iter().any(|batch| !batch.is_empty());

        match aux {
            Some(aux) if has_work => {
                let overlapping = self.pending.lock().iter().any(|p| p.queue != queue);
                let valid_bits = self
                    .queues
                    .lock()
                    .get(&queue)
                    .map_or(64, |timeline| timeline.valid_bits);
                let frame = {
                    let mut frames = self.frames.lock();
                    frames.current_mut().add_outstanding();
                    frames.current
                };
                trace!(
                    "{queue} submission signals {} on {}",
                    aux.signal_value,
                    aux.signal_semaphore
                );
                self.pending.lock().push(PendingSubmission {
                    queue,
                    frame,
                    semaphore: aux.signal_semaphore,
                    value: aux.signal_value,
                    valid_bits,
                    cpu_timestamp,
                    overlapping,
                    submits: submitted,
                });
            }
            Some(_) => {
                self.frames
                    .lock()
                    .current_mut()
                    .add_unprofiled_submits(submits.len() as u32);
            }
            None => {
                // Nothing will ever signal completion, so the recordings retire right away.
                for command_buffer in submitted.iter().flatten() {
                    command_buffer.for_each(&mut |trace| self.retire_trace(trace));
                }
            }
        }

        if aux.is_some() && self.context.config.frame_delimiter == FrameDelimiter::Submit {
            self.end_frame();
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn submit_command_buffer(
        &self,
        handle: CommandBufferHandle,
        first_error: &mut Option<ProfilerError>,
    ) -> Option<SubmittedCommandBuffer> {
        let submitted = self
            .command_buffers
            .get(handle)
            .and_then(|tracker| {
                let mut tracker = tracker.lock();
                tracker.submit()
            });
        let trace = match submitted {
            Ok(trace) => trace?,
            Err(err) => {
                warn!("Not profiling submission of {handle}: {err}");
                first_error.get_or_insert(err);
                return None;
            }
        };
        let secondaries = trace
            .secondary_command_buffers()
            .iter()
            .filter_map(|&secondary| self.submit_command_buffer(secondary, first_error))
            .collect();
        Some(SubmittedCommandBuffer { trace, secondaries })
    }

    /// Closes the current frame and opens the next one.
    pub fn end_frame(&self) -> FrameIndex {
        let now = time::timestamp_now();
        let mut frames = self.frames.lock();
        frames.current_mut().close(now);
        let next = frames.current.next();
        frames.current = next;
        frames.open.insert(next, FrameBuilder::new(next, now));
        next
    }

    pub fn current_frame(&self) -> FrameIndex {
        self.frames.lock().current
    }

    /// Reads back every submission whose semaphore has been signalled and publishes the frames
    /// that became complete. Never waits for the GPU.
    ///
    /// Returns the number of submissions retired.
    pub fn poll(&self) -> Result<usize> {
        let _pass = self.retire_lock.lock();
        let started = time::timestamp_now();
        let completed = self.take_completed()?;
        let count = completed.len();

        let mut completed = completed.into_iter();
        while let Some(submission) = completed.next() {
            let submits = match self.read_back(&submission) {
                Ok(submits) => submits,
                Err(err) => {
                    if err.is_device_lost() {
                        self.report_device_lost();
                    }
                    self.abandon(submission);
                    completed.for_each(|rest| self.abandon(rest));
                    self.publish_complete_frames();
                    return Err(err.into());
                }
            };
            submission.for_each_trace(|trace| self.retire_trace(trace));
            match self.frames.lock().open.get_mut(&submission.frame) {
                Some(frame) => frame.complete_submission(submits),
                None => warn!("Submission read back for unknown {:?}", submission.frame),
            }
            // Dropping the traces here returns their query slots.
        }

        self.publish_complete_frames();
        if count > 0 {
            trace!("Retired {count} submissions in {}ns", time::elapsed_since(started));
        }
        Ok(count)
    }

    fn take_completed(&self) -> Result<Vec<PendingSubmission>> {
        let semaphores: Vec<_> = {
            let pending = self.pending.lock();
            let mut semaphores: Vec<_> = pending.iter().map(|p| p.semaphore).collect();
            semaphores.sort_unstable_by_key(|s| s.0);
            semaphores.dedup();
            semaphores
        };
        if semaphores.is_empty() {
            return Ok(Vec::new());
        }

        let mut signalled = AHashMap::with_capacity(semaphores.len());
        for semaphore in semaphores {
            match self.context.dispatch.get_semaphore_counter_value(semaphore) {
                Ok(value) => {
                    signalled.insert(semaphore, value);
                }
                Err(err) => {
                    if err.is_device_lost() {
                        self.report_device_lost();
                    }
                    return Err(err.into());
                }
            }
        }

        let mut pending = self.pending.lock();
        let (completed, outstanding): (Vec<_>, Vec<_>) =
            mem::take(&mut *pending).into_iter().partition(|p| {
                signalled
                    .get(&p.semaphore)
                    .is_some_and(|value| *value >= p.value)
            });
        *pending = outstanding;
        Ok(completed)
    }

    fn read_back(&self, submission: &PendingSubmission) -> DriverResult<Vec<SubmitData>> {
        submission
            .submits
            .iter()
            .map(|batch| {
                Ok(SubmitData {
                    queue: submission.queue,
                    cpu_timestamp: submission.cpu_timestamp,
                    overlapping: submission.overlapping,
                    command_buffers: batch
                        .iter()
                        .map(|cb| self.resolve(cb, submission.valid_bits))
                        .collect::<DriverResult<_>>()?,
                })
            })
            .collect()
    }

    fn resolve(
        &self,
        command_buffer: &SubmittedCommandBuffer,
        valid_bits: u32,
    ) -> DriverResult<CommandBufferData> {
        let queries = &self.context.queries;
        let read = |slot: Option<QuerySlot>| -> DriverResult<Option<u64>> {
            let Some(slot) = slot else {
                return Ok(None);
            };
            let ticks = queries.read(slot, valid_bits)?;
            if ticks.is_none() {
                debug!("Timestamps of a completed submission are unavailable");
            }
            Ok(ticks)
        };

        let trace = &command_buffer.trace;
        let mut entries = Vec::with_capacity(trace.entries().len());
        for entry in trace.entries() {
            entries.push(match entry {
                TraceEntry::Drawcall(drawcall) => TraceEntry::Drawcall(Drawcall {
                    ticks: read(drawcall.query)?,
                    ..drawcall.clone()
                }),
                TraceEntry::BeginRendering { scope, query, .. } => TraceEntry::BeginRendering {
                    scope: *scope,
                    query: *query,
                    ticks: read(*query)?,
                },
                other => other.clone(),
            });
        }

        Ok(CommandBufferData {
            handle: trace.handle(),
            level: trace.level(),
            generation: trace.generation(),
            entries,
            stats: *trace.stats(),
            render_pass_count: trace.render_pass_count(),
            span_ticks: read(trace.span())?,
            secondaries: command_buffer
                .secondaries
                .iter()
                .map(|secondary| self.resolve(secondary, valid_bits))
                .collect::<DriverResult<_>>()?,
        })
    }

    fn retire_trace(&self, trace: &CommandBufferTrace) {
        if let Some(tracker) = self.command_buffers.find(trace.handle()) {
            tracker.lock().retire(trace.generation());
        }
    }

    /// Gives up on a submission that will never be read back.
    fn abandon(&self, submission: PendingSubmission) {
        submission.for_each_trace(|trace| self.retire_trace(trace));
        if let Some(frame) = self.frames.lock().open.get_mut(&submission.frame) {
            frame.abandon_submission();
        }
    }

    fn publish_complete_frames(&self) {
        let complete: Vec<FrameBuilder> = {
            let mut frames = self.frames.lock();
            let mut complete = Vec::new();
            while let Some(entry) = frames.open.first_entry() {
                if !entry.get().is_complete() {
                    break;
                }
                complete.push(entry.remove());
            }
            complete
        };
        if complete.is_empty() {
            return;
        }

        let period = self.context.dispatch.timestamp_period();
        let mut history = self.history.write();
        for builder in complete {
            let aggregate = builder.finish(&self.context.resources, period, Utc::now());
            trace!(
                "{:?}: cpu {}ns, gpu {}ns, {} drawcalls",
                aggregate.index,
                aggregate.cpu_time_ns,
                aggregate.gpu_time_ns(),
                aggregate.drawcall_count
            );
            history.push(aggregate);
        }
    }

    /// Drops a freed command buffer from every pending submission.
    pub fn discard(&self, command_buffer: CommandBufferHandle) {
        let mut pending = self.pending.lock();
        for batch in pending.iter_mut().flat_map(|p| p.submits.iter_mut()) {
            batch.retain(|cb| cb.trace.handle() != command_buffer);
            for cb in batch.iter_mut() {
                cb.discard(command_buffer);
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn latest_frame(&self) -> Arc<FrameAggregate> {
        self.history.read().latest()
    }

    pub fn frames(&self) -> Vec<Arc<FrameAggregate>> {
        self.history.read().frames()
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.history.read().frame_rate()
    }

    pub fn smoothed_frame_time_ns(&self) -> Option<f64> {
        self.history.read().smoothed_frame_time_ns()
    }

    fn report_device_lost(&self) {
        error!("Device lost, most recent checkpoints:");
        for checkpoint in self.context.checkpoints.recent(DEVICE_LOST_CHECKPOINTS) {
            error!("  {:?}", checkpoint);
        }
    }
}

impl Drop for SubmissionEngine {
    fn drop(&mut self) {
        self.pending.get_mut().clear();
        for (_, timeline) in self.queues.get_mut().drain() {
            self.context.dispatch.destroy_semaphore(timeline.semaphore);
        }
    }
}
