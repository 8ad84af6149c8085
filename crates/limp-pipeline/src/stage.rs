//! Bounded, order-preserving fan-out of per-unit agent calls.

use futures::stream::{self, StreamExt};
pub use limp_core::agent::with_timeout;
use limp_core::{AgentError, ResolvedConfig};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallLimits {
    pub timeout: Duration,
    pub max_concurrency: usize,
}

impl CallLimits {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            timeout: config.call_timeout(),
            max_concurrency: config.max_concurrency.max(1),
        }
    }
}

impl Default for CallLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_concurrency: 4,
        }
    }
}

/// Run `call` on every unit with at most `max_concurrency` in flight.
/// Results come back in input order; a call exceeding the timeout resolves
/// to [`AgentError::Timeout`].
pub async fn run_units<U, T, F, Fut>(
    units: Vec<U>,
    limits: CallLimits,
    call: F,
) -> Vec<Result<T, AgentError>>
where
    F: Fn(U) -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    let timeout = limits.timeout;
    fan_out(units, limits.max_concurrency, |unit| with_timeout(timeout, call(unit))).await
}

/// Like [`run_units`] without a deadline on the unit as a whole. For units
/// that make several model calls, each bounded by the agent through
/// [`limp_core::AgentContext::call_timeout`].
pub async fn fan_out<U, T, F, Fut>(units: Vec<U>, max_concurrency: usize, call: F) -> Vec<T>
where
    F: Fn(U) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(units.into_iter().map(call))
        .buffered(max_concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn results_keep_input_order_under_out_of_order_completion() {
        let limits = CallLimits {
            timeout: Duration::from_secs(10),
            max_concurrency: 3,
        };
        let delays = vec![3u64, 1, 2];
        let out = run_units(delays, limits, |d| async move {
            tokio::time::sleep(Duration::from_secs(d)).await;
            Ok::<_, AgentError>(d)
        })
        .await;
        let values: Vec<u64> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![3, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_unit_times_out_alone() {
        let limits = CallLimits {
            timeout: Duration::from_secs(5),
            max_concurrency: 2,
        };
        let out = run_units(vec![1u64, 60, 2], limits, |d| async move {
            tokio::time::sleep(Duration::from_secs(d)).await;
            Ok::<_, AgentError>(d)
        })
        .await;
        assert_eq!(out[0], Ok(1));
        assert_eq!(out[1], Err(AgentError::Timeout { after_ms: 5000 }));
        assert_eq!(out[2], Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_leaves_long_units_alone() {
        let out = fan_out(vec![90u64, 1], 2, |d| async move {
            tokio::time::sleep(Duration::from_secs(d)).await;
            d
        })
        .await;
        assert_eq!(out, vec![90, 1]);
    }
}
