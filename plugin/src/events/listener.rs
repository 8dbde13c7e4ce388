//! Listener adapters
//!
//! Factory functions building [`DeploymentStepListener`]s out of closures,
//! channels and UI dispatchers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::errors::PluginError;
use crate::events::bus::DeploymentStepListener;
use crate::host::UiDispatcher;
use crate::models::step::{CorrelationId, DeploymentStep};

struct FnListener<F> {
    f: F,
}

impl<F> DeploymentStepListener for FnListener<F>
where
    F: Fn(&DeploymentStep) + Send + Sync,
{
    fn on_deployment_step(&self, step: &DeploymentStep) -> Result<(), PluginError> {
        (self.f)(step);
        Ok(())
    }
}

/// Listener calling a closure for every step
pub fn listener_fn<F>(f: F) -> Arc<dyn DeploymentStepListener>
where
    F: Fn(&DeploymentStep) + Send + Sync + 'static,
{
    Arc::new(FnListener { f })
}

struct ChannelListener {
    tx: mpsc::UnboundedSender<DeploymentStep>,
}

impl DeploymentStepListener for ChannelListener {
    fn on_deployment_step(&self, step: &DeploymentStep) -> Result<(), PluginError> {
        self.tx
            .send(step.clone())
            .map_err(|_| PluginError::ListenerDelivery("receiver dropped".to_string()))
    }
}

/// Listener forwarding every step into an unbounded channel.
/// Steps arrive on the receiver in publish order.
pub fn channel_listener() -> (
    Arc<dyn DeploymentStepListener>,
    mpsc::UnboundedReceiver<DeploymentStep>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelListener { tx }), rx)
}

struct DispatchedListener {
    inner: Arc<dyn DeploymentStepListener>,
    dispatcher: Arc<dyn UiDispatcher>,
}

impl DeploymentStepListener for DispatchedListener {
    fn on_deployment_step(&self, step: &DeploymentStep) -> Result<(), PluginError> {
        let inner = self.inner.clone();
        let step = step.clone();
        self.dispatcher.dispatch(Box::new(move || {
            if let Err(e) = inner.on_deployment_step(&step) {
                warn!(correlation_id = %step.correlation_id(), "UI listener failed: {}", e);
            }
        }));
        Ok(())
    }
}

/// Marshal delivery onto the host UI thread through `dispatcher`.
/// Relies on the dispatcher running jobs in submission order.
pub fn dispatched(
    inner: Arc<dyn DeploymentStepListener>,
    dispatcher: Arc<dyn UiDispatcher>,
) -> Arc<dyn DeploymentStepListener> {
    Arc::new(DispatchedListener { inner, dispatcher })
}

struct FilteredListener {
    inner: Arc<dyn DeploymentStepListener>,
    correlation_id: CorrelationId,
}

impl DeploymentStepListener for FilteredListener {
    fn on_deployment_step(&self, step: &DeploymentStep) -> Result<(), PluginError> {
        if step.correlation_id() == &self.correlation_id {
            self.inner.on_deployment_step(step)
        } else {
            Ok(())
        }
    }
}

/// Only pass through steps of one deployment run
pub fn filtered(
    inner: Arc<dyn DeploymentStepListener>,
    correlation_id: CorrelationId,
) -> Arc<dyn DeploymentStepListener> {
    Arc::new(FilteredListener {
        inner,
        correlation_id,
    })
}
