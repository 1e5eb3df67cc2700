use crate::error::MesmerError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Tracks the service lifecycle and rejects out-of-order transitions.
pub struct LifecycleManager {
    state: Arc<RwLock<ServiceState>>,
    state_tx: Sender<ServiceState>,
    state_rx: Receiver<ServiceState>,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(ServiceState::Starting)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: ServiceState) -> Result<(), MesmerError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (ServiceState::Starting, ServiceState::Running)
                | (ServiceState::Starting, ServiceState::Stopping)
                | (ServiceState::Running, ServiceState::Stopping)
                | (ServiceState::Stopping, ServiceState::Stopped)
        );

        if !valid {
            return Err(MesmerError::Fatal(format!(
                "Invalid lifecycle transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::info!("Lifecycle transition: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> ServiceState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<ServiceState> {
        self.state_rx.clone()
    }
}
