//! Per-key in-flight markers for get-or-compute.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::entry::CacheValue;

/// Shared result of one computation: value or (type-erased) error.
pub(crate) type FlightResult = Result<CacheValue, CacheValue>;

#[derive(Clone)]
pub(crate) enum FlightState {
    Pending,
    Done(FlightResult),
    /// The leader went away without a result (dropped or cancelled).
    Abandoned,
}

/// One computation in progress for a key.
pub(crate) struct InFlight {
    state: watch::Sender<FlightState>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(FlightState::Pending);
        Self { state }
    }

    fn finish(&self, state: FlightState) {
        self.state.send_replace(state);
    }

    /// Wait for the leader. `None` means the leader abandoned the
    /// computation and the caller should retry.
    pub(crate) async fn wait(&self) -> Option<FlightResult> {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| !matches!(s, FlightState::Pending)).await {
            Ok(state) => state.clone(),
            Err(_) => return None,
        };
        match state {
            FlightState::Done(result) => Some(result),
            FlightState::Pending | FlightState::Abandoned => None,
        }
    }
}

/// Held by the caller that won the race for a key.
///
/// Dropping it, completed or not, clears the marker so later misses can
/// start a new computation; dropping it uncompleted releases waiters with
/// [`FlightState::Abandoned`].
pub(crate) struct LeaderGuard<'a> {
    markers: &'a DashMap<String, Arc<InFlight>>,
    key: String,
    flight: Arc<InFlight>,
    completed: bool,
}

impl<'a> LeaderGuard<'a> {
    pub(crate) fn new(
        markers: &'a DashMap<String, Arc<InFlight>>,
        key: String,
        flight: Arc<InFlight>,
    ) -> Self {
        Self {
            markers,
            key,
            flight,
            completed: false,
        }
    }

    pub(crate) fn complete(mut self, result: FlightResult) {
        self.flight.finish(FlightState::Done(result));
        self.completed = true;
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.flight.finish(FlightState::Abandoned);
            tracing::debug!(key = %self.key, "in-flight computation abandoned");
        }
        self.markers
            .remove_if(&self.key, |_, current| Arc::ptr_eq(current, &self.flight));
    }
}
