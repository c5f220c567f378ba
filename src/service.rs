//! The round RPC handler.
//!
//! [`AgentService`] owns the strategy's memory and is the only way to reach it. Every round
//! request runs its read-decide-write sequence under one mutex, so concurrent calls observe
//! a consistent prior state and never lose an update.

use std::sync::{Mutex, PoisonError};

use tonic::Status;
use tracing::{debug, instrument, warn};

use crate::decision::{GrimTrigger, OpponentSignal, OwnMove, Strategy};
use crate::wire::{HandleRequestRequest, HandleRequestResponse};

/// Exposes a [`Strategy`] as the `HandleRequest` operation.
#[derive(Debug)]
pub struct AgentService<S: Strategy = GrimTrigger> {
    strategy: Mutex<S>,
}

impl AgentService<GrimTrigger> {
    /// A service backed by a fresh [`GrimTrigger`].
    pub fn friedman() -> Self {
        Self::new(GrimTrigger::new())
    }
}

impl<S: Strategy> AgentService<S> {
    /// Wrap `strategy`. The service becomes its sole owner.
    pub fn new(strategy: S) -> Self {
        AgentService {
            strategy: Mutex::new(strategy),
        }
    }

    /// Display name of the wrapped strategy.
    pub fn name(&self) -> String {
        self.inspect(|strategy| strategy.name().to_owned())
    }

    /// Serve one round request.
    ///
    /// # Errors
    /// `INVALID_ARGUMENT` when `opponent_action` is not a known [`OpponentSignal`] value. The
    /// strategy is left untouched in that case.
    #[instrument(skip(self))]
    pub fn handle_request(
        &self,
        request: HandleRequestRequest,
    ) -> Result<HandleRequestResponse, Status> {
        let signal = OpponentSignal::try_from(request.opponent_action).map_err(|e| {
            warn!("rejected round request: {e}");
            Status::invalid_argument(e.to_string())
        })?;

        let own_move = self.decide(signal)?;
        Ok(HandleRequestResponse {
            player_action: own_move.into(),
        })
    }

    /// Apply `signal` to the strategy atomically with respect to other calls.
    pub fn decide(&self, signal: OpponentSignal) -> Result<OwnMove, Status> {
        let mut strategy = self
            .strategy
            .lock()
            .map_err(|_| Status::internal("strategy state is poisoned"))?;
        let own_move = strategy.decide(signal);
        drop(strategy);

        debug!(%signal, %own_move, "decided");
        Ok(own_move)
    }

    /// Read the strategy's memory.
    pub fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let strategy = self.strategy.lock().unwrap_or_else(PoisonError::into_inner);
        f(&strategy)
    }
}

impl Default for AgentService<GrimTrigger> {
    fn default() -> Self {
        Self::friedman()
    }
}
