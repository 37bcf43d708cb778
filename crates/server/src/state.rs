//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::notify::Notifier;
use crate::services::workflow::WorkflowService;
use crate::store::Store;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. The notification bus lives here and is
/// explicitly lifecycled with the application, handed to the workflow
/// engine and the event stream route rather than reached through a
/// module-level singleton.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    store: Arc<dyn Store>,
    notifier: Notifier,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: ServerConfig, store: Arc<dyn Store>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                notifier: Notifier::new(),
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the record store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get a reference to the notification bus.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Build a workflow engine over this state's store and bus.
    #[must_use]
    pub fn workflow(&self) -> WorkflowService<'_> {
        WorkflowService::new(
            self.store(),
            self.notifier(),
            self.inner.config.allow_status_rollback,
        )
    }
}
