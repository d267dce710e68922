use std::{future::Future, time::Duration};

use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use crate::config::ReadinessConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&ReadinessConfig> for ReadinessPolicy {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
        }
    }
}

/// Terminal state of one [`wait_ready`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32, elapsed: Duration },
    TimedOut { attempts: u32 },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Calls `probe` every `policy.interval` until it succeeds or
/// `policy.timeout` has passed since the first attempt.
///
/// Running out of time is not an error: it is logged and reported as
/// [`Readiness::TimedOut`], and the caller decides whether to carry on.
/// An attempt still in flight at the deadline is abandoned.
pub async fn wait_ready<F, Fut, E>(
    dependency: &str,
    mut probe: F,
    policy: ReadinessPolicy,
) -> Readiness
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match timeout_at(deadline, probe()).await {
            Ok(Ok(())) => {
                let elapsed = started.elapsed();
                info!(dependency, attempts, ?elapsed, "{dependency} is ready");
                return Readiness::Ready { attempts, elapsed };
            }
            Ok(Err(err)) => debug!(dependency, attempts, "waiting for {dependency}: {err}"),
            Err(_) => break,
        }

        let next = Instant::now() + policy.interval;
        if next >= deadline {
            sleep_until(deadline).await;
            break;
        }
        sleep_until(next).await;
    }

    warn!(
        dependency,
        attempts,
        timeout = ?policy.timeout,
        "timed out waiting for {dependency}, continuing startup"
    );
    Readiness::TimedOut { attempts }
}
