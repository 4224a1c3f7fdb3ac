//! CPU-bound workload: repeated email validation with a badly written pattern.
//!
//! The pattern nests unbounded repetitions inside a counted repetition, which
//! sends backtracking engines into catastrophic backtracking on the sample
//! below. The regex crate matches in linear time, so the cost here comes from
//! the iteration count; the profile is still dominated by regex frames.

use std::hint::black_box;
use std::time::{Duration, Instant};

use regex::Regex;

/// Email pattern with nested quantifiers. `\w` is spelled out as its ASCII
/// class so the compiled program stays small.
pub const EMAIL_PATTERN: &str = r"^([A-Za-z0-9_]+([-.][A-Za-z0-9]+)*){3,18}@[A-Za-z0-9_]+([-.][A-Za-z0-9]+)*\.[A-Za-z0-9_]+([-.][A-Za-z0-9]+)*$";

/// Adversarial input: a plausible address followed by trailing garbage.
pub const SLOW_EMAIL_SAMPLE: &str = "rosamariachoccelahuaaranda70@gmail.comnnbbb.bbNG.bbb.n¿.?n";

const MIX_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Result of a duration-bound burn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnReport {
    pub iterations: u64,
    pub acc: u64,
    pub elapsed: Duration,
}

/// Compiled email check shared by the handlers and the traffic generator.
#[derive(Debug, Clone)]
pub struct EmailCheck {
    pattern: Regex,
}

impl EmailCheck {
    /// Compile the pattern. Called once at startup.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(EMAIL_PATTERN)?,
        })
    }

    /// Single match of the email pattern against `input`.
    pub fn is_match(&self, input: &str) -> bool {
        self.pattern.is_match(input)
    }

    /// Match the adversarial sample `iterations` times (at least once).
    ///
    /// Pure apart from the CPU time spent: the result depends only on the
    /// sample, so it is identical across runs and iteration counts.
    pub fn check_repeated(&self, iterations: u32) -> bool {
        let mut matched = false;
        for _ in 0..iterations.max(1) {
            if self.pattern.is_match(black_box(SLOW_EMAIL_SAMPLE)) {
                matched = true;
            }
        }
        matched
    }

    /// Burn CPU for roughly `duration` of wall-clock time.
    pub fn burn_for(&self, duration: Duration) -> BurnReport {
        let start = Instant::now();
        let deadline = start + duration.max(Duration::from_millis(1));
        let mut iterations = 0u64;
        let mut acc = 0u64;

        while Instant::now() < deadline {
            if self.pattern.is_match(black_box(SLOW_EMAIL_SAMPLE)) {
                acc = acc.wrapping_add(1);
            }
            acc = acc.wrapping_add((acc << 1) ^ MIX_CONSTANT);
            iterations += 1;
        }

        BurnReport {
            iterations,
            acc: black_box(acc),
            elapsed: start.elapsed(),
        }
    }
}
