use failsafe::{backoff, failure_policy, Config};
use std::sync::Arc;
use std::time::Duration;

/// Object-safe view of a circuit breaker guarding one external provider.
///
/// Provider calls are async, so the breaker is consulted before the request
/// (`is_call_permitted`) and told the outcome afterwards (`record`).
pub trait Breaker: Send + Sync {
    fn is_call_permitted(&self) -> bool;
    fn record(&self, success: bool);
}

impl<T> Breaker for T
where
    T: failsafe::CircuitBreaker + Send + Sync,
{
    fn is_call_permitted(&self) -> bool {
        failsafe::CircuitBreaker::is_call_permitted(self)
    }

    fn record(&self, success: bool) {
        let _ = self.call(|| if success { Ok(()) } else { Err(()) });
    }
}

/// Builds the breaker shared by every call to a single provider.
///
/// Opens after 5 consecutive failures, then waits with exponential backoff
/// from 10s up to 60s before letting a trial call through.
pub fn create_provider_circuit_breaker() -> Arc<dyn Breaker> {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));
    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Arc::new(Config::new().failure_policy(failure_policy).build())
}
