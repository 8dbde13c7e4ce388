//! Cancellable loading of cloud account settings

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::errors::PluginError;
use crate::models::account::AccountHandle;
use crate::progress::ProgressReporter;

/// Sub-steps reported while one account loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStep {
    Subscriptions,
    StorageServices,
    HostedServices,
    Locations,
}

impl LoadStep {
    pub const ALL: [LoadStep; 4] = [
        LoadStep::Subscriptions,
        LoadStep::StorageServices,
        LoadStep::HostedServices,
        LoadStep::Locations,
    ];
}

/// Progress weight of each account is split evenly across its sub-steps.
/// Must track `LoadStep::ALL`.
pub const STEPS_PER_ACCOUNT: u32 = LoadStep::ALL.len() as u32;

pub const LOADING_TEXT: &str = "Loading Account Settings...";
const SUBSCRIPTIONS_TEXT: &str = "Subscriptions";
const SERVICES_TEXT: &str = "Storage Services, Cloud Services and Locations";

/// Callbacks the account loader drives while it works
pub trait AccountLoadListener: Send + Sync {
    /// A sub-step finished. An `Err` tells the loader to stop.
    fn on_loaded(&self, step: LoadStep) -> Result<(), PluginError>;

    /// A sub-step failed; the load is over
    fn on_rest_error(&self, error: PluginError);
}

/// Cloud side of account loading: fetches subscriptions, storage services,
/// hosted services and locations of one account, reporting each through
/// `listener`.
#[async_trait]
pub trait AccountLoader: Send + Sync {
    async fn load(
        &self,
        account: &AccountHandle,
        listener: &dyn AccountLoadListener,
    ) -> Result<(), PluginError>;
}

/// Progress bookkeeping of one load (or one batch of loads).
///
/// `fraction_done` only grows, one `work_units_per_account` at a time, until
/// it reaches 1.0 or a terminal error freezes it.
#[derive(Debug)]
pub struct AccountLoadState {
    expected_accounts: u32,
    work_units_per_account: f64,
    fraction_done: f64,
    cancelled: bool,
    failed: bool,
    terminal_error: Option<PluginError>,
}

impl AccountLoadState {
    pub fn new(expected_accounts: u32) -> Result<Self, PluginError> {
        let mut state = Self {
            expected_accounts: 1,
            work_units_per_account: 0.0,
            fraction_done: 0.0,
            cancelled: false,
            failed: false,
            terminal_error: None,
        };
        state.set_expected_accounts(expected_accounts)?;
        Ok(state)
    }

    /// Change the number of accounts the fraction is spread over
    pub fn set_expected_accounts(&mut self, expected_accounts: u32) -> Result<(), PluginError> {
        if expected_accounts == 0 {
            return Err(PluginError::ConfigError(
                "expected account count must be at least 1".to_string(),
            ));
        }
        self.expected_accounts = expected_accounts;
        self.work_units_per_account = 1.0 / f64::from(STEPS_PER_ACCOUNT * expected_accounts);
        Ok(())
    }

    fn is_terminal(&self) -> bool {
        self.cancelled || self.failed
    }

    fn advance(&mut self) -> Option<f64> {
        if self.is_terminal() {
            return None;
        }
        self.fraction_done = (self.fraction_done + self.work_units_per_account).min(1.0);
        Some(self.fraction_done)
    }

    fn fail(&mut self, error: PluginError) -> bool {
        if self.failed {
            return false;
        }
        self.cancelled = true;
        self.failed = true;
        self.terminal_error = Some(error);
        true
    }

    pub fn snapshot(&self) -> AccountLoadSnapshot {
        AccountLoadSnapshot {
            expected_accounts: self.expected_accounts,
            work_units_per_account: self.work_units_per_account,
            fraction_done: self.fraction_done,
            cancelled: self.cancelled,
            failed: self.failed,
        }
    }
}

/// Read-only copy of an [`AccountLoadState`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountLoadSnapshot {
    pub expected_accounts: u32,
    pub work_units_per_account: f64,
    pub fraction_done: f64,
    pub cancelled: bool,
    pub failed: bool,
}

/// Loads one account's settings, feeding a shared progress fraction.
pub struct AccountLoadTask {
    account: AccountHandle,
    state: Arc<Mutex<AccountLoadState>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl AccountLoadTask {
    /// Task loading a single account
    pub fn new(account: AccountHandle, reporter: Arc<dyn ProgressReporter>) -> Self {
        let state = AccountLoadState {
            expected_accounts: 1,
            work_units_per_account: 1.0 / f64::from(STEPS_PER_ACCOUNT),
            fraction_done: 0.0,
            cancelled: false,
            failed: false,
            terminal_error: None,
        };
        Self {
            account,
            state: Arc::new(Mutex::new(state)),
            reporter,
        }
    }

    /// Spread the progress over `expected_accounts` accounts, for loaders that
    /// report several accounts through this one task
    pub fn with_expected_accounts(self, expected_accounts: u32) -> Result<Self, PluginError> {
        self.lock_state().set_expected_accounts(expected_accounts)?;
        Ok(self)
    }

    /// One task per account, all sharing a single state so the whole batch
    /// sums to 1.0
    pub fn batch(
        accounts: Vec<AccountHandle>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Vec<Self>, PluginError> {
        let count = u32::try_from(accounts.len())
            .map_err(|_| PluginError::ConfigError("too many accounts".to_string()))?;
        let state = Arc::new(Mutex::new(AccountLoadState::new(count)?));
        Ok(accounts
            .into_iter()
            .map(|account| Self {
                account,
                state: state.clone(),
                reporter: reporter.clone(),
            })
            .collect())
    }

    pub fn snapshot(&self) -> AccountLoadSnapshot {
        self.lock_state().snapshot()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AccountLoadState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the load. On a terminal error the progress scope is cancelled and
    /// the error returned.
    pub async fn run(&self, loader: &dyn AccountLoader) -> Result<(), PluginError> {
        info!("Loading account settings for {}", self.account.name);
        self.reporter.set_text(LOADING_TEXT);
        self.reporter.set_text2(SUBSCRIPTIONS_TEXT);

        let result = if self.account.credential().is_empty() {
            Err(PluginError::ConfigError(format!(
                "Account {} has no management credential",
                self.account.name
            )))
        } else {
            loader.load(&self.account, self).await
        };

        let pending = {
            let mut state = self.lock_state();
            if let Err(e) = result {
                if !matches!(e, PluginError::Cancelled) {
                    state.fail(e);
                }
            }
            state.terminal_error.take()
        };

        if let Some(e) = pending {
            error!("Loading account {} failed: {}", self.account.name, e);
            self.reporter.cancel();
            return Err(e);
        }

        let state = self.lock_state().snapshot();
        if state.cancelled {
            info!("Loading account {} cancelled", self.account.name);
            return Err(PluginError::Cancelled);
        }

        debug!(
            fraction = state.fraction_done,
            "Account {} loaded", self.account.name
        );
        Ok(())
    }
}

impl AccountLoadListener for AccountLoadTask {
    fn on_loaded(&self, step: LoadStep) -> Result<(), PluginError> {
        let mut state = self.lock_state();
        if !state.is_terminal() && self.reporter.is_cancelled() {
            state.cancelled = true;
        }
        // The sink is updated under the state lock so it only ever sees
        // increasing values.
        let fraction = state.advance().ok_or(PluginError::Cancelled)?;
        self.reporter.set_fraction(fraction);
        if step == LoadStep::Subscriptions {
            self.reporter.set_text2(SERVICES_TEXT);
        }
        debug!(?step, fraction, "Account load step finished");
        Ok(())
    }

    fn on_rest_error(&self, error: PluginError) {
        let mut state = self.lock_state();
        let message = error.to_string();
        if state.fail(error) {
            warn!("Account load failed for {}: {}", self.account.name, message);
        } else {
            debug!("Ignoring further account load error: {}", message);
        }
    }
}

/// Load several accounts concurrently under one progress fraction.
/// Returns the first real failure, or `Cancelled` if the user aborted.
pub async fn load_accounts(
    loader: &dyn AccountLoader,
    accounts: Vec<AccountHandle>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<(), PluginError> {
    let tasks = AccountLoadTask::batch(accounts, reporter)?;
    let results = join_all(tasks.iter().map(|task| task.run(loader))).await;

    let mut cancelled = false;
    for result in results {
        match result {
            Ok(()) => {}
            Err(PluginError::Cancelled) => cancelled = true,
            Err(e) => return Err(e),
        }
    }
    if cancelled {
        return Err(PluginError::Cancelled);
    }
    Ok(())
}
