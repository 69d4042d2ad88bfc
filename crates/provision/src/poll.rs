//! Bounded fixed-interval polling

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

/// Interval and ceiling of a poll loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Wait between two checks
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
    /// Maximum number of checks
    pub max_attempts: u32,
    /// Wall-clock limit across all checks
    #[serde(rename = "deadline_ms", default, with = "opt_millis")]
    pub deadline: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 10,
            deadline: None,
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Answer of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Done,
    Pending,
}

/// How a poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition was met
    Completed { attempts: u32 },
    /// Attempts ran out while the condition was still pending
    StillRunning { attempts: u32 },
    /// The deadline passed before the condition was met
    TimedOut { elapsed: Duration },
}

impl PollOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Call `check` until it reports [`PollStatus::Done`], attempts run out or
/// the deadline passes. `check` receives the 1-indexed attempt number.
///
/// An error from `check` stops polling and is returned as is.
pub fn poll_until<F, E>(config: &PollConfig, mut check: F) -> Result<PollOutcome, E>
where
    F: FnMut(u32) -> Result<PollStatus, E>,
{
    let started = Instant::now();

    for attempt in 1..=config.max_attempts {
        if check(attempt)? == PollStatus::Done {
            return Ok(PollOutcome::Completed { attempts: attempt });
        }

        if let Some(deadline) = config.deadline {
            let elapsed = started.elapsed();
            if elapsed + config.interval > deadline {
                return Ok(PollOutcome::TimedOut { elapsed });
            }
        }

        if attempt < config.max_attempts {
            thread::sleep(config.interval);
        }
    }

    Ok(PollOutcome::StillRunning {
        attempts: config.max_attempts,
    })
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant(max_attempts: u32) -> PollConfig {
        PollConfig::new(Duration::ZERO, max_attempts)
    }

    #[test]
    fn test_completes_when_done() {
        let outcome = poll_until::<_, ()>(&instant(5), |attempt| {
            Ok(if attempt == 3 { PollStatus::Done } else { PollStatus::Pending })
        })
        .unwrap();
        assert_eq!(outcome, PollOutcome::Completed { attempts: 3 });
        assert!(outcome.is_completed());
    }

    #[test]
    fn test_still_running_after_ceiling() {
        let mut calls = 0;
        let outcome = poll_until::<_, ()>(&instant(4), |_| {
            calls += 1;
            Ok(PollStatus::Pending)
        })
        .unwrap();
        assert_eq!(outcome, PollOutcome::StillRunning { attempts: 4 });
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_deadline_times_out() {
        let config = PollConfig::new(Duration::from_millis(20), 100)
            .with_deadline(Duration::from_millis(30));
        let outcome = poll_until::<_, ()>(&config, |_| Ok(PollStatus::Pending)).unwrap();
        assert!(matches!(outcome, PollOutcome::TimedOut { .. }));
    }

    #[test]
    fn test_error_stops_polling() {
        let mut calls = 0;
        let result = poll_until(&instant(5), |_| {
            calls += 1;
            Err::<PollStatus, _>("lost contact")
        });
        assert_eq!(result, Err("lost contact"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_config_deserializes_millis() {
        let config: PollConfig =
            serde_json::from_str(r#"{"interval_ms": 250, "max_attempts": 3}"#).unwrap();
        assert_eq!(config.interval, Duration::from_millis(250));
        assert!(config.deadline.is_none());
    }
}
