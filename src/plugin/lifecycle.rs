//! Start/configure/shutdown state machine shared by every plugin.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::destination::Destination;
use crate::i18n::{Language, SubscriptionId};
use crate::ui::{DialogResult, DispatchError, SettingsSurface, UiDispatch};

/// Lifecycle states. `Stopped` and `FailedStart` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Uninitialized,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
    FailedStart,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginState::Uninitialized => "uninitialized",
            PluginState::Starting => "starting",
            PluginState::Running => "running",
            PluginState::ShuttingDown => "shutting down",
            PluginState::Stopped => "stopped",
            PluginState::FailedStart => "failed to start",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Cannot {operation} a plugin that is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: PluginState,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("UI dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Result of [`PluginLifecycle::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The plugin is running with this many top-level destinations registered.
    Registered(usize),
    /// A required capability is missing; nothing was registered.
    Unavailable(String),
    /// Cancelled before registration; the plugin can be started again.
    Cancelled,
}

/// Result of [`PluginLifecycle::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Stopped,
    /// Cancelled before any resource was released; the plugin keeps running.
    Cancelled,
}

/// A host-owned menu entry contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub id: String,
    pub text_key: String,
}

/// The host registry plugins register into. Only called on the UI thread.
pub trait PluginHost: Send + Sync {
    fn register_destination(&self, destination: Destination);
    /// Returns false when no destination with this designation is registered.
    fn unregister_destination(&self, designation: &str) -> bool;
    fn add_menu_item(&self, id: &str, text: &str);
    fn relabel_menu_item(&self, id: &str, text: &str);
    fn remove_menu_item(&self, id: &str) -> bool;
}

/// What a plugin hands over once its dependencies are acquired.
#[derive(Debug, Default)]
pub struct PluginSetup {
    pub destinations: Vec<Destination>,
    pub menu_item: Option<MenuItem>,
}

/// Outcome of dependency acquisition.
#[derive(Debug)]
pub enum Acquired {
    Available(PluginSetup),
    Unavailable(String),
}

/// Services available to a plugin while it starts.
#[derive(Clone)]
pub struct PluginContext {
    pub language: Arc<Language>,
    pub ui: UiDispatch,
}

/// A concrete plugin: knows how to probe its capability and build its
/// destinations. The surrounding state machine is [`PluginLifecycle`].
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Probe external capabilities and build destinations. Probe failures
    /// must come back as [`Acquired::Unavailable`], never as errors.
    async fn acquire(
        &self,
        context: &PluginContext,
        cancel: &CancellationToken,
    ) -> Result<Acquired, PluginError>;

    /// Show the plugin's modal settings. Edits apply only on
    /// [`DialogResult::Ok`].
    fn configure(&self, surface: &dyn SettingsSurface) -> DialogResult {
        let _ = surface;
        log::debug!("{} has no settings", self.name());
        DialogResult::Cancel
    }
}

#[derive(Default)]
struct Owned {
    destinations: Vec<Destination>,
    menu_item: Option<MenuItem>,
    subscription: Option<SubscriptionId>,
}

/// What actually reached the host, so a failed registration can be undone.
#[derive(Default)]
struct Registered {
    designations: Vec<String>,
    menu_item: Option<String>,
}

impl Registered {
    fn is_empty(&self) -> bool {
        self.designations.is_empty() && self.menu_item.is_none()
    }
}

/// Drives one plugin through its lifecycle against a host registry.
pub struct PluginLifecycle {
    plugin: Arc<dyn Plugin>,
    host: Arc<dyn PluginHost>,
    context: PluginContext,
    state: Mutex<PluginState>,
    owned: Mutex<Owned>,
}

impl PluginLifecycle {
    pub fn new(plugin: Arc<dyn Plugin>, host: Arc<dyn PluginHost>, context: PluginContext) -> Self {
        Self {
            plugin,
            host,
            context,
            state: Mutex::new(PluginState::Uninitialized),
            owned: Mutex::new(Owned::default()),
        }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn state(&self) -> PluginState {
        *self.state.lock()
    }

    /// Destinations currently registered by this plugin.
    pub fn destinations(&self) -> Vec<Destination> {
        self.owned.lock().destinations.clone()
    }

    fn transition(
        &self,
        operation: &'static str,
        from: PluginState,
        to: PluginState,
    ) -> Result<(), PluginError> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(PluginError::InvalidTransition {
                operation,
                state: *state,
            });
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, state: PluginState) {
        log::debug!("{}: {} -> {}", self.name(), self.state(), state);
        *self.state.lock() = state;
    }

    /// Acquire dependencies, register destinations, and subscribe to language
    /// changes.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<StartOutcome, PluginError> {
        self.transition("start", PluginState::Uninitialized, PluginState::Starting)?;
        log::info!("Starting plugin {}", self.name());

        let acquired = match self.plugin.acquire(&self.context, cancel).await {
            _ if cancel.is_cancelled() => {
                self.set_state(PluginState::Uninitialized);
                log::info!("Start of {} cancelled", self.name());
                return Ok(StartOutcome::Cancelled);
            }
            Ok(acquired) => acquired,
            Err(err) => {
                self.set_state(PluginState::FailedStart);
                log::error!("Plugin {} failed to start: {}", self.name(), err);
                return Err(err);
            }
        };

        let setup = match acquired {
            Acquired::Available(setup) => setup,
            Acquired::Unavailable(reason) => {
                self.set_state(PluginState::FailedStart);
                log::info!("Plugin {} not registered: {}", self.name(), reason);
                return Ok(StartOutcome::Unavailable(reason));
            }
        };

        let count = setup.destinations.len();

        // Subscribe first so a switch racing with registration still relabels.
        let subscription = self.subscribe_language(&setup);

        let host = Arc::clone(&self.host);
        let language = Arc::clone(&self.context.language);
        let to_register = setup.destinations.clone();
        let menu_item = setup.menu_item.clone();
        let done = Arc::new(Mutex::new(Registered::default()));
        let progress = Arc::clone(&done);
        let registration = self
            .context
            .ui
            .run(cancel, move || {
                for destination in to_register {
                    let designation = destination.designation().to_string();
                    host.register_destination(destination);
                    progress.lock().designations.push(designation);
                }
                if let Some(item) = menu_item {
                    host.add_menu_item(&item.id, &language.get(&item.text_key));
                    progress.lock().menu_item = Some(item.id);
                }
            })
            .await;

        match registration {
            Ok(()) => {}
            Err(DispatchError::Cancelled) => {
                self.context.language.unsubscribe(subscription);
                self.set_state(PluginState::Uninitialized);
                log::info!("Start of {} cancelled before registration", self.name());
                return Ok(StartOutcome::Cancelled);
            }
            Err(err) => {
                self.context.language.unsubscribe(subscription);
                let partial = std::mem::take(&mut *done.lock());
                self.release(partial).await;
                self.set_state(PluginState::FailedStart);
                log::error!("Could not register {}: {}", self.name(), err);
                return Err(err.into());
            }
        }

        *self.owned.lock() = Owned {
            destinations: setup.destinations,
            menu_item: setup.menu_item,
            subscription: Some(subscription),
        };
        self.set_state(PluginState::Running);
        log::info!(
            "Plugin {} running with {} destination(s)",
            self.name(),
            count
        );
        Ok(StartOutcome::Registered(count))
    }

    /// Undo host registrations on the UI thread. Never cancelled.
    async fn release(&self, registered: Registered) {
        if registered.is_empty() {
            return;
        }
        let host = Arc::clone(&self.host);
        let result = self
            .context
            .ui
            .run(&CancellationToken::new(), move || {
                for designation in &registered.designations {
                    if !host.unregister_destination(designation) {
                        log::warn!("Destination {} was already unregistered", designation);
                    }
                }
                if let Some(id) = registered.menu_item {
                    host.remove_menu_item(&id);
                }
            })
            .await;

        if let Err(err) = result {
            log::warn!("Could not release {} on the UI thread: {}", self.name(), err);
        }
    }

    fn subscribe_language(&self, setup: &PluginSetup) -> SubscriptionId {
        let destinations = setup.destinations.clone();
        let menu_item = setup.menu_item.clone();
        let host = Arc::clone(&self.host);
        let ui = self.context.ui.clone();
        let weak_language: Weak<Language> = Arc::downgrade(&self.context.language);
        let name = self.name().to_string();

        self.context.language.subscribe(move |_| {
            let destinations = destinations.clone();
            let menu_item = menu_item.clone();
            let host = Arc::clone(&host);
            let weak_language = weak_language.clone();
            let name = name.clone();
            ui.post(move || {
                let Some(language) = weak_language.upgrade() else {
                    return;
                };
                log::debug!("Relabelling {} for {}", name, language.code());
                for destination in &destinations {
                    destination.relabel(&language);
                }
                if let Some(item) = &menu_item {
                    host.relabel_menu_item(&item.id, &language.get(&item.text_key));
                }
            });
        })
    }

    /// Open the plugin's modal settings. Only valid while running.
    pub fn configure(&self, surface: &dyn SettingsSurface) -> Result<DialogResult, PluginError> {
        let state = self.state();
        if state != PluginState::Running {
            return Err(PluginError::InvalidTransition {
                operation: "configure",
                state,
            });
        }
        let result = self.plugin.configure(surface);
        log::info!("Settings of {} closed with {:?}", self.name(), result);
        Ok(result)
    }

    /// Release everything the plugin registered. Safe to call repeatedly.
    ///
    /// `cancel` is only observed before any resource is released; once the
    /// release has begun it runs to completion. A second call while that
    /// release is in flight is an invalid transition.
    pub async fn shutdown(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ShutdownOutcome, PluginError> {
        {
            let mut state = self.state.lock();
            match *state {
                PluginState::Running => {
                    if cancel.is_cancelled() {
                        return Ok(ShutdownOutcome::Cancelled);
                    }
                    *state = PluginState::ShuttingDown;
                }
                PluginState::Uninitialized => {
                    *state = PluginState::Stopped;
                    return Ok(ShutdownOutcome::Stopped);
                }
                PluginState::Stopped | PluginState::FailedStart => {
                    return Ok(ShutdownOutcome::Stopped);
                }
                PluginState::Starting | PluginState::ShuttingDown => {
                    return Err(PluginError::InvalidTransition {
                        operation: "shut down",
                        state: *state,
                    });
                }
            }
        }
        log::info!("Shutting down plugin {}", self.name());

        let owned = std::mem::take(&mut *self.owned.lock());
        if let Some(subscription) = owned.subscription {
            self.context.language.unsubscribe(subscription);
        }

        self.release(Registered {
            designations: owned
                .destinations
                .iter()
                .map(|destination| destination.designation().to_string())
                .collect(),
            menu_item: owned.menu_item.map(|item| item.id),
        })
        .await;

        self.set_state(PluginState::Stopped);
        log::info!("Plugin {} stopped", self.name());
        Ok(ShutdownOutcome::Stopped)
    }
}
