use crate::Timestamp;
use nix::sys::time::TimeValLike;
use nix::time::{clock_gettime, ClockId};

pub fn timestamp_now() -> Timestamp {
    // CLOCK_MONOTONIC cannot fail on any platform we load on.
    clock_gettime(ClockId::CLOCK_MONOTONIC)
        .map(|ts| ts.num_nanoseconds() as Timestamp)
        .unwrap_or_default()
}
