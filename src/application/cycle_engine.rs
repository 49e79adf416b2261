//! Position Cycle Engine
//!
//! Runs `max_iterations` open/close cycles against the exchange:
//!
//! ```text
//! CheckingStale -> Opening -> Closing -> Done
//! ```
//!
//! Each phase re-queries position presence before acting, so repeating a
//! phase is always safe. Sub-protocols get a fixed attempt budget; when one
//! escalates, the whole iteration is retried without advancing the counter.

use thiserror::Error;

use crate::domain::RetryPolicy;
use crate::ports::{ExchangeError, ExchangePort, OpenOrder};

use super::error::FatalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    CheckingStale,
    Opening,
    Closing,
    Done,
    /// Close issued by the post-cycle balance audit
    Cleanup,
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CyclePhase::CheckingStale => "stale check",
            CyclePhase::Opening => "open",
            CyclePhase::Closing => "close",
            CyclePhase::Done => "done",
            CyclePhase::Cleanup => "post-cycle cleanup",
        };
        f.write_str(name)
    }
}

/// Sub-protocol escalation. Retryable: the outer loop catches it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PositionError {
    #[error("Position not opened after {attempts} attempts: {last_error}")]
    OpenFailed { attempts: u32, last_error: String },

    #[error("Position not closed during {phase} after {attempts} attempts: {last_error}")]
    CloseFailed {
        phase: CyclePhase,
        attempts: u32,
        last_error: String,
    },
}

/// How a sub-protocol reached its target state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exchange already in the wanted state, nothing sent
    AlreadySatisfied,
    /// Command accepted on the given attempt
    Executed { attempts: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Iteration counter on exit
    pub completed: u32,
    /// Failed iterations that were restarted
    pub iteration_retries: u32,
}

pub struct PositionCycleEngine<'a, E: ExchangePort> {
    exchange: &'a E,
    order: &'a OpenOrder,
    policy: &'a RetryPolicy,
}

impl<'a, E: ExchangePort> PositionCycleEngine<'a, E> {
    pub fn new(exchange: &'a E, order: &'a OpenOrder, policy: &'a RetryPolicy) -> Self {
        Self {
            exchange,
            order,
            policy,
        }
    }

    /// Make sure no position is open. No command is sent if none exists.
    pub async fn ensure_closed(&self, phase: CyclePhase) -> Result<Outcome, PositionError> {
        self.converge(false)
            .await
            .map_err(|(attempts, last_error)| PositionError::CloseFailed {
                phase,
                attempts,
                last_error,
            })
    }

    /// Make sure a position is open. An existing one is kept as is.
    pub async fn ensure_opened(&self) -> Result<Outcome, PositionError> {
        self.converge(true)
            .await
            .map_err(|(attempts, last_error)| PositionError::OpenFailed {
                attempts,
                last_error,
            })
    }

    /// One full cycle: clear stale position, open, close
    pub async fn run_iteration(&self) -> Result<(), PositionError> {
        tracing::debug!("Phase: {}", CyclePhase::CheckingStale);
        if let Outcome::Executed { .. } = self.ensure_closed(CyclePhase::CheckingStale).await? {
            tracing::info!("Stale position closed");
        }

        tracing::debug!("Phase: {}", CyclePhase::Opening);
        self.ensure_opened().await?;
        tracing::info!(
            "Position opened: {} {} x{} on {}",
            self.order.side,
            self.order.size,
            self.order.leverage,
            self.order.market
        );

        tracing::debug!("Phase: {}", CyclePhase::Closing);
        self.ensure_closed(CyclePhase::Closing).await?;
        tracing::info!("Position closed");

        tracing::debug!("Phase: {}", CyclePhase::Done);
        Ok(())
    }

    /// Run iterations `start..max_iterations`. `on_iteration` receives the
    /// new counter after each success (used for checkpointing).
    pub async fn run<F>(
        &self,
        start: u32,
        max_iterations: u32,
        mut on_iteration: F,
    ) -> Result<CycleReport, FatalError>
    where
        F: FnMut(u32) -> Result<(), FatalError>,
    {
        let mut report = CycleReport {
            completed: start,
            iteration_retries: 0,
        };
        let mut consecutive_failures = 0u32;

        while report.completed < max_iterations {
            match self.run_iteration().await {
                Ok(()) => {
                    report.completed += 1;
                    consecutive_failures = 0;
                    tracing::info!("Iteration {}/{} finished", report.completed, max_iterations);
                    on_iteration(report.completed)?;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    report.iteration_retries += 1;
                    let iteration = report.completed + 1;

                    if self.policy.iteration_retries_exhausted(consecutive_failures) {
                        tracing::error!("Iteration {} exhausted: {}", iteration, e);
                        return Err(FatalError::IterationExhausted {
                            iteration,
                            attempts: consecutive_failures,
                        });
                    }

                    let wait = self.policy.iteration_backoff(consecutive_failures);
                    tracing::warn!(
                        "Retry iteration {} (failure {}, waiting {:?}): {}",
                        iteration,
                        consecutive_failures,
                        wait,
                        e
                    );
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Shared attempt loop. Err carries (attempts, last error).
    async fn converge(&self, want_open: bool) -> Result<Outcome, (u32, String)> {
        let attempts = self.policy.attempts;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(want_open).await {
                Ok(false) => return Ok(Outcome::AlreadySatisfied),
                Ok(true) => return Ok(Outcome::Executed { attempts: attempt }),
                Err(e) => {
                    tracing::warn!(
                        "{} attempt {}/{} failed: {}",
                        if want_open { "Open" } else { "Close" },
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e;
                    if attempt < attempts && !self.policy.backoff.is_zero() {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        Err((attempts, last_error))
    }

    /// Query presence, then send the command if needed. Ok(true) when a
    /// command was accepted, Ok(false) when nothing had to be done.
    async fn attempt(&self, want_open: bool) -> Result<bool, String> {
        let present = self
            .exchange
            .has_open_position(&self.order.market)
            .await
            .map_err(describe)?;

        if present == want_open {
            return Ok(false);
        }

        let ack = if want_open {
            self.exchange.open_position(self.order).await
        } else {
            self.exchange
                .close_position(&self.order.market, self.order.slippage)
                .await
        }
        .map_err(describe)?;

        if ack.is_success() {
            Ok(true)
        } else {
            Err(ack.to_string())
        }
    }
}

fn describe(err: ExchangeError) -> String {
    if !err.is_retryable() {
        tracing::warn!("Exchange error is not transient: {}", err);
    }
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::{ExchangeCall, MockExchange};
    use crate::ports::{ExchangeAck, ExchangeError, TradeSide};
    use rust_decimal_macros::dec;

    fn order() -> OpenOrder {
        OpenOrder {
            market: "ETH-PERP".into(),
            side: TradeSide::Buy,
            size: dec!(50),
            leverage: dec!(1),
            slippage: dec!(0.01),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::default().without_delays()
    }

    fn fail(status: u16) -> Result<ExchangeAck, ExchangeError> {
        Ok(ExchangeAck::failed(status, ""))
    }

    #[tokio::test]
    async fn test_ensure_closed_without_position_sends_nothing() {
        let exchange = MockExchange::new();
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let outcome = engine.ensure_closed(CyclePhase::CheckingStale).await.unwrap();

        assert_eq!(outcome, Outcome::AlreadySatisfied);
        assert_eq!(exchange.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_ensure_opened_with_position_sends_nothing() {
        let exchange = MockExchange::new().with_open_position();
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let outcome = engine.ensure_opened().await.unwrap();

        assert_eq!(outcome, Outcome::AlreadySatisfied);
        assert_eq!(exchange.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_close_escalates_after_three_attempts() {
        let exchange = MockExchange::new()
            .with_open_position()
            .with_close_responses([fail(500), fail(500), fail(500), Ok(ExchangeAck::ok())]);
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let err = engine.ensure_closed(CyclePhase::Closing).await.unwrap_err();

        assert!(matches!(err, PositionError::CloseFailed { attempts: 3, .. }));
        assert_eq!(exchange.close_calls(), 3);
        assert!(exchange.has_position());
    }

    #[tokio::test]
    async fn test_error_code_counts_as_failure() {
        let exchange = MockExchange::new()
            .with_open_responses([Ok(ExchangeAck::failed(200, "E_MARGIN"))]);
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let outcome = engine.ensure_opened().await.unwrap();

        assert_eq!(outcome, Outcome::Executed { attempts: 2 });
        assert_eq!(exchange.open_calls(), 2);
    }

    #[tokio::test]
    async fn test_query_errors_use_the_attempt_budget() {
        let exchange = MockExchange::new().with_query_failures(3, ExchangeError::Timeout);
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let err = engine.ensure_opened().await.unwrap_err();

        assert!(matches!(err, PositionError::OpenFailed { attempts: 3, .. }));
        assert_eq!(exchange.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_close_retries_after_transport_error() {
        let exchange = MockExchange::new()
            .with_open_position()
            .with_close_responses([Err(ExchangeError::Timeout)]);
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let outcome = engine.ensure_closed(CyclePhase::Closing).await.unwrap();

        assert_eq!(outcome, Outcome::Executed { attempts: 2 });
        assert_eq!(exchange.close_calls(), 2);
        assert!(!exchange.has_position());
    }

    #[tokio::test]
    async fn test_command_that_took_effect_is_not_repeated() {
        // Exchange rejects the open yet the position shows up anyway
        let exchange = MockExchange::new()
            .with_open_responses([Ok(ExchangeAck::failed(504, "GATEWAY"))]);
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let first = engine.attempt(true).await;
        exchange.set_position_open(true);
        let outcome = engine.ensure_opened().await.unwrap();

        assert!(first.is_err());
        assert_eq!(outcome, Outcome::AlreadySatisfied);
        assert_eq!(exchange.open_calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_position_closed_once_before_open() {
        let exchange = MockExchange::new().with_open_position();
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        engine.run_iteration().await.unwrap();

        let mutating: Vec<_> = exchange
            .get_calls()
            .into_iter()
            .filter(ExchangeCall::is_mutating)
            .collect();
        assert_eq!(mutating.len(), 3);
        assert!(matches!(mutating[0], ExchangeCall::Close { .. }));
        assert!(matches!(mutating[1], ExchangeCall::Open(_)));
        assert!(matches!(mutating[2], ExchangeCall::Close { .. }));
    }

    #[tokio::test]
    async fn test_open_recovers_on_third_attempt_without_outer_retry() {
        let exchange = MockExchange::new()
            .with_open_responses([fail(500), fail(500), Ok(ExchangeAck::ok())]);
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let report = engine.run(0, 1, |_| Ok(())).await.unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.iteration_retries, 0);
        assert_eq!(exchange.open_calls(), 3);
        assert_eq!(exchange.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_close_escalation_restarts_iteration_without_counting() {
        let exchange = MockExchange::new()
            .with_close_responses([fail(500), fail(502), fail(503)]);
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let mut progress = Vec::new();
        let report = engine
            .run(0, 1, |n| {
                progress.push(n);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.iteration_retries, 1);
        assert_eq!(progress, vec![1]);
        // 3 failed closes, then restart: stale close, open, close
        assert_eq!(exchange.open_calls(), 2);
        assert_eq!(exchange.close_calls(), 5);
        assert!(!exchange.has_position());
    }

    #[tokio::test]
    async fn test_run_resumes_from_start_iteration() {
        let exchange = MockExchange::new();
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let report = engine.run(8, 10, |_| Ok(())).await.unwrap();

        assert_eq!(report.completed, 10);
        assert_eq!(exchange.open_calls(), 2);
    }

    #[tokio::test]
    async fn test_outer_retry_bound_is_fatal() {
        let exchange = MockExchange::new()
            .with_open_responses(std::iter::repeat_with(|| fail(500)).take(9));
        let order = order();
        let policy = policy().with_max_iteration_retries(2);
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let err = engine.run(0, 1, |_| Ok(())).await.unwrap_err();

        assert!(matches!(
            err,
            FatalError::IterationExhausted { iteration: 1, attempts: 3 }
        ));
        assert_eq!(exchange.open_calls(), 9);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_stops_run() {
        let exchange = MockExchange::new();
        let (order, policy) = (order(), policy());
        let engine = PositionCycleEngine::new(&exchange, &order, &policy);

        let err = engine
            .run(0, 3, |_| Err(FatalError::Persistence("disk full".into())))
            .await
            .unwrap_err();

        assert!(matches!(err, FatalError::Persistence(_)));
        assert_eq!(exchange.open_calls(), 1);
    }
}
