use std::collections::VecDeque;
use std::sync::Arc;

use crate::frame::FrameAggregate;

const FRAME_TIME_SMOOTHING: f64 = 0.1;

/// Exponentially weighted moving average, bias-corrected so early samples are not pulled
/// towards zero.
#[derive(Copy, Clone, Debug)]
struct Ewma {
    value: f64,
    weight: f64,
    alpha: f64,
}

impl Ewma {
    fn new(alpha: f64) -> Self {
        Self {
            value: 0.,
            weight: 0.,
            alpha,
        }
    }

    fn update(&mut self, sample: f64) {
        self.value = (1. - self.alpha) * self.value + self.alpha * sample;
        self.weight = (1. - self.alpha) * self.weight + self.alpha;
    }

    fn get(&self) -> Option<f64> {
        (self.weight > 0.).then(|| self.value / self.weight)
    }
}

/// The most recent finished frames, oldest first.
pub struct FrameHistory {
    frames: VecDeque<Arc<FrameAggregate>>,
    capacity: usize,
    empty: Arc<FrameAggregate>,
    frame_time: Ewma,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            empty: Arc::default(),
            frame_time: Ewma::new(FRAME_TIME_SMOOTHING),
        }
    }

    pub fn push(&mut self, frame: FrameAggregate) {
        if frame.cpu_time_ns > 0 {
            self.frame_time.update(frame.cpu_time_ns as f64);
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(Arc::new(frame));
    }

    /// The newest finished frame, or an empty aggregate if there is none yet.
    pub fn latest(&self) -> Arc<FrameAggregate> {
        self.frames.back().unwrap_or(&self.empty).clone()
    }

    pub fn frames(&self) -> Vec<Arc<FrameAggregate>> {
        self.frames.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Smoothed CPU frame time in nanoseconds.
    pub fn smoothed_frame_time_ns(&self) -> Option<f64> {
        self.frame_time.get()
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.smoothed_frame_time_ns()
            .filter(|ns| *ns > 0.)
            .map(|ns| 1e9 / ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameIndex;

    fn frame(index: u64, cpu_time_ns: u64) -> FrameAggregate {
        FrameAggregate {
            index: FrameIndex(index),
            cpu_time_ns,
            ..Default::default()
        }
    }

    #[test]
    fn oldest_frames_are_evicted() {
        let mut history = FrameHistory::new(3);
        assert!(history.latest().is_empty());
        for i in 0..5 {
            history.push(frame(i, 1_000));
        }
        assert_eq!(history.len(), 3);
        let indices: Vec<_> = history.frames().iter().map(|f| f.index.0).collect();
        assert_eq!(indices, [2, 3, 4]);
        assert_eq!(history.latest().index, FrameIndex(4));
    }

    #[test]
    fn published_frames_outlive_eviction() {
        let mut history = FrameHistory::new(1);
        history.push(frame(0, 10));
        let held = history.latest();
        history.push(frame(1, 10));
        assert_eq!(held.index, FrameIndex(0));
        assert_eq!(history.latest().index, FrameIndex(1));
    }

    #[test]
    fn frame_rate_tracks_frame_time() {
        let mut history = FrameHistory::new(4);
        assert_eq!(history.frame_rate(), None);
        history.push(frame(0, 10_000_000));
        assert!((history.frame_rate().unwrap() - 100.).abs() < 1e-6);
        for i in 1..200 {
            history.push(frame(i, 20_000_000));
        }
        assert!((history.smoothed_frame_time_ns().unwrap() - 20_000_000.).abs() < 1.);
    }
}
