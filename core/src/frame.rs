use std::cmp::Reverse;

use ahash::AHashMap;
use chrono::{DateTime, Utc};

use crate::command_buffer::{CommandBufferLevel, TraceEntry};
use crate::counters::CpuTimestampCounter;
use crate::drawcall::{DrawcallStats, PipelineKey};
use crate::handle::{CommandBufferHandle, QueueHandle};
use crate::resources::ResourceRegistries;
use crate::{Interval, Timestamp};

#[derive(Copy, Clone, Debug, Default, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A command buffer whose timers have been read back.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandBufferData {
    pub handle: CommandBufferHandle,
    pub level: CommandBufferLevel,
    pub generation: u64,
    /// Trace entries with the measured ticks filled in.
    pub entries: Vec<TraceEntry>,
    pub stats: DrawcallStats,
    pub render_pass_count: u32,
    /// Ticks between the command buffer's begin and end timestamps.
    pub span_ticks: Option<u64>,
    pub secondaries: Vec<CommandBufferData>,
}

impl CommandBufferData {
    /// Ticks of measured drawcalls, including those in executed secondaries.
    pub fn drawcall_ticks(&self) -> u64 {
        let own: u64 = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                TraceEntry::Drawcall(drawcall) => drawcall.ticks,
                _ => None,
            })
            .sum();
        own + self
            .secondaries
            .iter()
            .map(CommandBufferData::drawcall_ticks)
            .sum::<u64>()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmitData {
    pub queue: QueueHandle,
    pub cpu_timestamp: Timestamp,
    /// Another queue still had work in flight when this one was submitted.
    pub overlapping: bool,
    pub command_buffers: Vec<CommandBufferData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineStats {
    pub key: PipelineKey,
    pub name: String,
    pub drawcall_count: u32,
    pub unmeasured_count: u32,
    pub ticks: u64,
    pub nanoseconds: u64,
}

/// Statistics of one finished frame. Never modified once published.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameAggregate {
    pub index: FrameIndex,
    pub captured_at: Option<DateTime<Utc>>,
    pub timestamp_period: f32,
    /// CPU time between the frame's opening and closing delimiters.
    pub cpu_time_ns: Interval,
    /// Sum of measured drawcall durations.
    pub gpu_ticks: u64,
    pub command_buffer_ticks: u64,
    pub render_pass_ticks: u64,
    pub stats: DrawcallStats,
    pub submit_count: u32,
    pub command_buffer_count: u32,
    pub render_pass_count: u32,
    pub drawcall_count: u32,
    pub unmeasured_count: u32,
    pub overlapping_submit_count: u32,
    /// Sorted by measured time, longest first.
    pub pipelines: Vec<PipelineStats>,
    pub submits: Vec<SubmitData>,
}

impl FrameAggregate {
    /// True for the placeholder returned before any frame finished.
    pub fn is_empty(&self) -> bool {
        self.captured_at.is_none()
    }

    pub fn ticks_to_ns(&self, ticks: u64) -> u64 {
        ticks_to_ns(ticks, self.timestamp_period)
    }

    pub fn gpu_time_ns(&self) -> u64 {
        self.ticks_to_ns(self.gpu_ticks)
    }

    pub fn command_buffer_time_ns(&self) -> u64 {
        self.ticks_to_ns(self.command_buffer_ticks)
    }
}

pub fn ticks_to_ns(ticks: u64, period: f32) -> u64 {
    (ticks as f64 * period as f64) as u64
}

#[derive(Default)]
struct PipelineAccum {
    drawcall_count: u32,
    unmeasured_count: u32,
    ticks: u64,
}

/// A frame that is still open or still waiting for submissions to complete.
pub(crate) struct FrameBuilder {
    index: FrameIndex,
    cpu: CpuTimestampCounter,
    closed: bool,
    outstanding: u32,
    aggregate: FrameAggregate,
    pipelines: AHashMap<PipelineKey, PipelineAccum>,
}

impl FrameBuilder {
    pub fn new(index: FrameIndex, begin: Timestamp) -> Self {
        let mut cpu = CpuTimestampCounter::default();
        cpu.begin_at(begin);
        Self {
            index,
            cpu,
            closed: false,
            outstanding: 0,
            aggregate: FrameAggregate {
                index,
                ..Default::default()
            },
            pipelines: AHashMap::new(),
        }
    }

    /// Counts submits that carried nothing to read back.
    pub fn add_unprofiled_submits(&mut self, count: u32) {
        self.aggregate.submit_count += count;
    }

    pub fn add_outstanding(&mut self) {
        self.outstanding += 1;
    }

    pub fn close(&mut self, end: Timestamp) {
        self.cpu.end_at(end);
        self.closed = true;
    }

    /// Closed, with every submission attributed to it read back.
    pub fn is_complete(&self) -> bool {
        self.closed && self.outstanding == 0
    }

    /// Folds one read-back submission into the frame.
    pub fn complete_submission(&mut self, submits: Vec<SubmitData>) {
        self.outstanding = self.outstanding.saturating_sub(1);
        for submit in submits {
            self.aggregate.submit_count += 1;
            if submit.overlapping {
                self.aggregate.overlapping_submit_count += 1;
            }
            for command_buffer in &submit.command_buffers {
                self.fold_command_buffer(command_buffer);
            }
            self.aggregate.submits.push(submit);
        }
    }

    /// Drops a submission that will never be read back.
    pub fn abandon_submission(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    fn fold_command_buffer(&mut self, data: &CommandBufferData) {
        let aggregate = &mut self.aggregate;
        aggregate.command_buffer_count += 1;
        aggregate.render_pass_count += data.render_pass_count;
        aggregate.command_buffer_ticks += data.span_ticks.unwrap_or(0);
        aggregate.stats += data.stats;

        for entry in &data.entries {
            match entry {
                TraceEntry::Drawcall(drawcall) if !drawcall.kind.is_debug_label() => {
                    aggregate.drawcall_count += 1;
                    let pipeline = self.pipelines.entry(drawcall.pipeline).or_default();
                    pipeline.drawcall_count += 1;
                    if let Some(ticks) = drawcall.ticks {
                        aggregate.gpu_ticks += ticks;
                        pipeline.ticks += ticks;
                    } else if drawcall.is_unmeasured() {
                        aggregate.unmeasured_count += 1;
                        pipeline.unmeasured_count += 1;
                    }
                }
                TraceEntry::BeginRendering {
                    ticks: Some(ticks), ..
                } => aggregate.render_pass_ticks += ticks,
                _ => {}
            }
        }

        for secondary in &data.secondaries {
            self.fold_command_buffer(secondary);
        }
    }

    pub fn finish(
        self,
        resources: &ResourceRegistries,
        timestamp_period: f32,
        captured_at: DateTime<Utc>,
    ) -> FrameAggregate {
        let mut aggregate = self.aggregate;
        aggregate.captured_at = Some(captured_at);
        aggregate.timestamp_period = timestamp_period;
        aggregate.cpu_time_ns = self.cpu.elapsed().unwrap_or(0);

        let mut pipelines: Vec<_> = self
            .pipelines
            .into_iter()
            .map(|(key, accum)| PipelineStats {
                key,
                name: resources.pipeline_name(&key),
                drawcall_count: accum.drawcall_count,
                unmeasured_count: accum.unmeasured_count,
                ticks: accum.ticks,
                nanoseconds: ticks_to_ns(accum.ticks, timestamp_period),
            })
            .collect();
        pipelines.sort_by(|a, b| {
            (Reverse(a.ticks), Reverse(a.drawcall_count), &a.name)
                .cmp(&(Reverse(b.ticks), Reverse(b.drawcall_count), &b.name))
        });
        aggregate.pipelines = pipelines;
        aggregate
    }
}
