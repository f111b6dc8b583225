//! Dispatch and read-back timestamps.
//!
//! Timestamps are nanoseconds on the backend's own clock. They are only
//! comparable within one backend instance.

use serde::Serialize;

use crate::reduce::ReduceOp;

/// Display resolution for profiling breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Ns,
    Us,
    Ms,
}

impl Resolution {
    fn divisor(self) -> u64 {
        match self {
            Resolution::Ns => 1,
            Resolution::Us => 1_000,
            Resolution::Ms => 1_000_000,
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Resolution::Ns => "ns",
            Resolution::Us => "us",
            Resolution::Ms => "ms",
        }
    }
}

/// Lifecycle of one enqueued command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProfileSpan {
    pub queued: u64,
    pub submitted: u64,
    pub started: u64,
    pub ended: u64,
}

impl ProfileSpan {
    /// Execution time (start to end).
    pub fn duration_ns(&self) -> u64 {
        self.ended.saturating_sub(self.started)
    }

    /// Queued to end.
    pub fn total_ns(&self) -> u64 {
        self.ended.saturating_sub(self.queued)
    }

    /// `Queued X, Submitted Y, Executed Z, Total W [unit]`
    pub fn describe(&self, resolution: Resolution) -> String {
        let d = resolution.divisor();
        format!(
            "Queued {}, Submitted {}, Executed {}, Total {} [{}]",
            self.submitted.saturating_sub(self.queued) / d,
            self.started.saturating_sub(self.submitted) / d,
            self.duration_ns() / d,
            self.total_ns() / d,
            resolution.unit(),
        )
    }
}

/// Timings for one reduction pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StageTimings {
    pub op: ReduceOp,
    pub kernel: ProfileSpan,
    pub read: ProfileSpan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_microseconds() {
        let span = ProfileSpan {
            queued: 1_000,
            submitted: 3_000,
            started: 10_000,
            ended: 52_000,
        };
        assert_eq!(span.duration_ns(), 42_000);
        assert_eq!(
            span.describe(Resolution::Us),
            "Queued 2, Submitted 7, Executed 42, Total 51 [us]"
        );
    }

    #[test]
    fn test_out_of_order_counters_do_not_underflow() {
        let span = ProfileSpan {
            queued: 50,
            submitted: 40,
            started: 30,
            ended: 20,
        };
        assert_eq!(span.duration_ns(), 0);
        assert_eq!(span.total_ns(), 0);
    }
}
