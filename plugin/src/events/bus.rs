//! Deployment event bus
//!
//! Fire-and-forget fan-out of [`DeploymentStep`]s from background workers to
//! whatever listeners are registered at publish time. There is no buffering
//! or replay.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use tracing::{debug, warn};

use crate::errors::PluginError;
use crate::models::step::DeploymentStep;

/// Receives deployment steps.
///
/// Called on the publishing worker's thread. Listeners that need a UI thread
/// wrap themselves with [`dispatched`](crate::events::listener::dispatched).
/// A listener must not subscribe or unsubscribe from inside this callback.
pub trait DeploymentStepListener: Send + Sync {
    fn on_deployment_step(&self, step: &DeploymentStep) -> Result<(), PluginError>;
}

/// Opaque registration handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// Publish/subscribe contract. Workers depend on this trait so tests can
/// hand them a scoped bus instead of the process-wide one.
pub trait EventBus: Send + Sync {
    /// Register a listener until it is explicitly unsubscribed
    fn subscribe(&self, listener: Arc<dyn DeploymentStepListener>) -> ListenerHandle;

    /// Register a listener that is also purged by [`EventBus::remove_all_tracked`].
    /// Used for per-dialog listeners.
    fn subscribe_tracked(&self, listener: Arc<dyn DeploymentStepListener>) -> ListenerHandle;

    /// Remove a registration. Once this returns the listener receives nothing
    /// more, including from publishes already in flight.
    fn unsubscribe(&self, handle: ListenerHandle) -> bool;

    /// Remove every tracked registration, returning how many were removed
    fn remove_all_tracked(&self) -> usize;

    /// Deliver a step to every registered listener
    fn publish(&self, step: DeploymentStep);

    fn listener_count(&self) -> usize;
}

struct Registration {
    handle: ListenerHandle,
    listener: Arc<dyn DeploymentStepListener>,
    tracked: bool,
}

/// Default [`EventBus`] backed by a synchronized listener list
pub struct DeploymentEventBus {
    listeners: RwLock<Vec<Registration>>,
    next_handle: AtomicU64,
}

static GLOBAL_BUS: OnceLock<Arc<DeploymentEventBus>> = OnceLock::new();

impl DeploymentEventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Process-wide bus shared by every window of the host
    pub fn global() -> Arc<DeploymentEventBus> {
        GLOBAL_BUS.get_or_init(|| Arc::new(DeploymentEventBus::new())).clone()
    }

    fn register(&self, listener: Arc<dyn DeploymentStepListener>, tracked: bool) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push(Registration {
            handle,
            listener,
            tracked,
        });
        debug!(?handle, tracked, "Deployment listener registered");
        handle
    }
}

impl Default for DeploymentEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for DeploymentEventBus {
    fn subscribe(&self, listener: Arc<dyn DeploymentStepListener>) -> ListenerHandle {
        self.register(listener, false)
    }

    fn subscribe_tracked(&self, listener: Arc<dyn DeploymentStepListener>) -> ListenerHandle {
        self.register(listener, true)
    }

    fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|r| r.handle != handle);
        before != listeners.len()
    }

    fn remove_all_tracked(&self) -> usize {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|r| !r.tracked);
        let removed = before - listeners.len();
        if removed > 0 {
            debug!(removed, "Purged tracked deployment listeners");
        }
        removed
    }

    fn publish(&self, step: DeploymentStep) {
        // The read lock is held for the whole fan-out: unsubscribe waits for
        // in-flight deliveries to drain.
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for registration in listeners.iter() {
            let delivered = catch_unwind(AssertUnwindSafe(|| {
                registration.listener.on_deployment_step(&step)
            }));
            match delivered {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        handle = ?registration.handle,
                        correlation_id = %step.correlation_id(),
                        "Deployment listener failed: {}",
                        e
                    );
                }
                Err(_) => {
                    warn!(
                        handle = ?registration.handle,
                        correlation_id = %step.correlation_id(),
                        "Deployment listener panicked"
                    );
                }
            }
        }
    }

    fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
