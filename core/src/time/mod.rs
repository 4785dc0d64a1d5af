#[cfg_attr(unix, path = "unix.rs")]
#[cfg_attr(windows, path = "windows.rs")]
mod platform;

pub use platform::*;

use crate::{Interval, Timestamp};

/// Nanoseconds elapsed since `since`, saturating at zero if the clock was read out of order.
pub fn elapsed_since(since: Timestamp) -> Interval {
    timestamp_now().saturating_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_monotonic() {
        let mut last = timestamp_now();
        for _ in 0..1000 {
            let now = timestamp_now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn elapsed_never_underflows() {
        assert_eq!(elapsed_since(Timestamp::MAX), 0);
    }
}
