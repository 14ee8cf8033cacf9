// Copyright (c) Recovery Bench Developers.
use log::{error, warn};
use rc_util::*;
use std::fmt;
use std::time::{Duration, Instant};

use super::error::{Failure, FatalFailure};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryPolicy {
    Unbounded,
    // Total number of attempts including the first one.
    Attempts(u32),
    // No new attempt starts once this much time has passed since the first.
    Deadline(Duration),
}

impl RetryPolicy {
    fn exhausted(&self, attempts: u32, started_at: Instant) -> bool {
        match self {
            Self::Unbounded => false,
            Self::Attempts(nr) => attempts >= *nr,
            Self::Deadline(dur) => started_at.elapsed() >= *dur,
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Attempts(nr) => write!(f, "{} attempts", nr),
            Self::Deadline(dur) => write!(f, "{} deadline", format_duration(dur.as_secs_f64())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insist {
    pub policy: RetryPolicy,
    pub delay: Duration,
}

impl Insist {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            delay: Duration::from_secs(0),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Repeats `attempt` on `what` until it succeeds, fails fatally or the
    /// policy runs out. `attempt` is called with the 1-based attempt number.
    /// Only the attempt count and the most recent transient failure are
    /// kept across iterations.
    pub fn run<T, W, F>(&self, what: &W, mut attempt: F) -> Result<T, FatalFailure>
    where
        W: fmt::Display + ?Sized,
        F: FnMut(u32) -> Result<T, Failure>,
    {
        let started_at = Instant::now();
        let mut attempts = 0;

        loop {
            if prog_exiting() {
                return Err(FatalFailure::Interrupted { attempts });
            }

            attempts += 1;
            let failure = match attempt(attempts) {
                Ok(v) => return Ok(v),
                Err(Failure::Fatal(FatalFailure::Interrupted { .. })) => {
                    return Err(FatalFailure::Interrupted { attempts })
                }
                Err(Failure::Fatal(e)) => return Err(e),
                Err(Failure::Transient(e)) => e,
            };

            if self.policy.exhausted(attempts, started_at) {
                error!(
                    "insist: [{}] attempt {} failed ({}), giving up ({})",
                    what, attempts, &failure, &self.policy
                );
                return Err(FatalFailure::Exhausted {
                    attempts,
                    last: failure,
                });
            }

            warn!(
                "insist: [{}] attempt {} failed ({}), retrying...",
                what, attempts, &failure
            );

            if self.delay > Duration::from_secs(0) {
                if wait_prog_state(self.delay) == ProgState::Exiting {
                    return Err(FatalFailure::Interrupted { attempts });
                }
                // The deadline may have passed while waiting.
                if self.policy.exhausted(attempts, started_at) {
                    error!(
                        "insist: [{}] ran out of time after attempt {}, giving up ({})",
                        what, attempts, &self.policy
                    );
                    return Err(FatalFailure::Exhausted {
                        attempts,
                        last: failure,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Insist, RetryPolicy};
    use crate::error::{Failure, FatalFailure};
    use anyhow::anyhow;
    use std::time::Duration;

    fn flaky(nr_transient: u32, calls: &mut u32) -> Result<u32, Failure> {
        *calls += 1;
        if *calls <= nr_transient {
            Err(Failure::transient(anyhow!("server crashed in attempt {}", calls)))
        } else {
            Ok(*calls)
        }
    }

    #[test]
    fn test_transient_then_success() {
        let _ = ::env_logger::try_init();
        for nr_transient in 0..4 {
            let mut calls = 0;
            let res = Insist::new(RetryPolicy::Unbounded)
                .run("cfg", |_| flaky(nr_transient, &mut calls))
                .unwrap();
            assert_eq!(res, nr_transient + 1);
            assert_eq!(calls, nr_transient + 1);
        }
    }

    #[test]
    fn test_fatal_is_not_retried() {
        let _ = ::env_logger::try_init();
        let mut calls = 0;
        let res: Result<(), _> = Insist::new(RetryPolicy::Unbounded).run("cfg", |_| {
            calls += 1;
            Err(Failure::fatal(anyhow!("bad disk selector")))
        });
        assert_eq!(calls, 1);
        match res {
            Err(FatalFailure::Error(reason)) => assert_eq!(reason, "bad disk selector"),
            v => panic!("unexpected {:?}", v),
        }
    }

    #[test]
    fn test_bounded_attempts() {
        let _ = ::env_logger::try_init();
        let mut calls = 0;
        let mut seen = vec![];
        let res = Insist::new(RetryPolicy::Attempts(3)).run("cfg", |nr| {
            seen.push(nr);
            flaky(u32::MAX, &mut calls)
        });
        assert_eq!(calls, 3);
        assert_eq!(seen, vec![1, 2, 3]);
        match res {
            Err(FatalFailure::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last.reason, "server crashed in attempt 3");
            }
            v => panic!("unexpected {:?}", v),
        }
    }

    #[test]
    fn test_deadline() {
        let _ = ::env_logger::try_init();
        let mut calls = 0;
        let res = Insist::new(RetryPolicy::Deadline(Duration::from_millis(50)))
            .delay(Duration::from_millis(20))
            .run("cfg", |_| flaky(u32::MAX, &mut calls));
        assert!(matches!(res, Err(FatalFailure::Exhausted { .. })));
        assert!(calls >= 2 && calls <= 10);
    }

    #[test]
    fn test_deadline_expires_during_delay() {
        let _ = ::env_logger::try_init();
        let mut calls = 0;
        let res = Insist::new(RetryPolicy::Deadline(Duration::from_millis(50)))
            .delay(Duration::from_millis(200))
            .run("cfg", |_| flaky(u32::MAX, &mut calls));
        assert_eq!(calls, 1);
        match res {
            Err(FatalFailure::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 1);
                assert_eq!(last.reason, "server crashed in attempt 1");
            }
            v => panic!("unexpected {:?}", v),
        }
    }
}
