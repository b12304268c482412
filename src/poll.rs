/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/poll.rs
*
* The polling primitive shared by the readiness poller and the endpoint
* resolver. A poll runs a query, hands the observation to a readiness
* predicate, and either returns the extracted value or waits one interval and
* tries again, until the budget is spent.
*
* Query errors and "not ready" observations are expected while a cluster comes
* up; both are logged and retried. Only exhausting the budget is an error.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Tick interval and overall timeout for one polling stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollBudget {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        PollBudget { interval, timeout }
    }

    /// The number of queries a poll makes before giving up: one immediately,
    /// then one per full interval that fits inside the timeout.
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_nanos();
        if interval == 0 {
            return 1;
        }
        let ticks = self.timeout.as_nanos() / interval;
        u32::try_from(ticks).unwrap_or(u32::MAX - 1) + 1
    }
}

/// The budget ran out before the predicate accepted an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTimeout {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Polls `query` until `ready` extracts a value or `budget` is exhausted.
///
/// The first query runs immediately. A query already in flight is never
/// interrupted; the deadline is checked between ticks.
pub async fn poll_until<Q, T, F, Fut, P>(
    what: &str,
    budget: PollBudget,
    mut query: F,
    mut ready: P,
) -> Result<T, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Q>>,
    P: FnMut(Q) -> Option<T>,
{
    let started = Instant::now();
    let deadline = started + budget.timeout;
    let max_attempts = budget.max_attempts();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match query().await {
            Ok(observation) => match ready(observation) {
                Some(value) => {
                    info!(what = %what, attempt, "Poll condition satisfied");
                    return Ok(value);
                }
                None => debug!(what = %what, attempt, "Not ready yet"),
            },
            Err(e) => warn!(what = %what, attempt, error = %e, "Poll query failed, will retry"),
        }

        let now = Instant::now();
        if attempt >= max_attempts || now + budget.interval > deadline {
            return Err(PollTimeout {
                attempts: attempt,
                elapsed: now - started,
            });
        }

        sleep(budget.interval).await;
    }
}
