//! Shared dashboard handle.
//!
//! Wraps the [`WidgetStore`] behind a lock and runs the network half of each
//! refresh with the lock released, so other widgets and store mutations keep
//! going while a fetch is in flight. Concurrent refreshes of the same widget
//! are not coalesced: whichever completes last wins.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::connection::{ConnectionReport, ConnectionTester};
use crate::error::{ConnectionError, ExtractionError};
use crate::extraction::Extractor;
use crate::persistence::StateFile;
use crate::provider::{default_ohlcv_fields, ProviderSettings};
use crate::schema::{now_millis, ExtractedData, TimeInterval, WidgetType};
use crate::source::DataSource;
use crate::store::{RefreshRequest, WidgetStore};

#[derive(Clone)]
pub struct Dashboard {
    store: Arc<RwLock<WidgetStore>>,
    extractor: Extractor,
    tester: ConnectionTester,
    provider: ProviderSettings,
    state_file: Option<StateFile>,
    save_lock: Arc<Mutex<()>>,
}

impl Dashboard {
    pub fn new(store: WidgetStore, source: Arc<dyn DataSource>, provider: ProviderSettings) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            extractor: Extractor::new(source.clone()),
            tester: ConnectionTester::new(source, provider.clone()),
            provider,
            state_file: None,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Save a snapshot to `state_file` after every persisted mutation.
    pub fn with_state_file(mut self, state_file: StateFile) -> Self {
        self.state_file = Some(state_file);
        self
    }

    pub fn with_discovery_depth(mut self, max_depth: usize) -> Self {
        self.tester = self.tester.with_max_depth(max_depth);
        self
    }

    /// Run `f` against the store under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&WidgetStore) -> R) -> R {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }

    /// Run one store mutation under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut WidgetStore) -> R) -> R {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }

    pub async fn test_connection(&self, endpoint: &str) -> Result<ConnectionReport, ConnectionError> {
        self.tester.test_connection(endpoint).await
    }

    /// Write the current snapshot to the state file, if one is configured.
    /// Saves are serialized so the file always ends on the latest snapshot.
    pub async fn persist(&self) {
        let Some(state_file) = self.state_file.clone() else {
            return;
        };
        let _guard = self.save_lock.lock().await;
        let snapshot = self.read(|store| store.snapshot());
        match tokio::task::spawn_blocking(move || state_file.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to save dashboard state: {:#}", e),
            Err(e) => error!("State save task failed: {}", e),
        }
    }

    /// Fetch and extract fresh data for one widget. Returns false if the widget
    /// is unknown, or was removed before the fetch completed.
    pub async fn refresh_widget_data(&self, id: &str) -> bool {
        let Some(ticket) = self.write(|store| store.begin_refresh(id)) else {
            debug!("Refresh requested for unknown widget {}", id);
            return false;
        };

        debug!(
            "Refreshing {:?} widget {} from {}",
            ticket.widget_type, ticket.widget_id, ticket.endpoint
        );
        let result = self
            .extractor
            .extract(&ticket.endpoint, &ticket.fields, ticket.widget_type)
            .await;

        let applied = self.write(|store| store.complete_refresh(id, result, now_millis()));
        if applied {
            self.persist().await;
        }
        applied
    }

    /// Run refresh requests one after another.
    pub async fn run_refreshes(&self, requests: Vec<RefreshRequest>) {
        for request in requests {
            self.refresh_widget_data(&request.widget_id).await;
        }
    }

    /// Run refresh requests in the background, one task per widget.
    pub fn spawn_refreshes(&self, requests: Vec<RefreshRequest>) {
        for request in requests {
            let dashboard = self.clone();
            tokio::spawn(async move {
                dashboard.refresh_widget_data(&request.widget_id).await;
            });
        }
    }

    /// Chart series for a widget's symbol at another interval. Read-only: the
    /// widget's own data is left alone. `None` if the widget is unknown.
    pub async fn interval_series(
        &self,
        id: &str,
        interval: TimeInterval,
    ) -> Option<Result<ExtractedData, ExtractionError>> {
        let endpoint = self.read(|store| store.widget(id).map(|w| w.endpoint.clone()))?;
        let url = self
            .provider
            .interval_endpoint(&endpoint, interval)
            .unwrap_or(endpoint); // other APIs are fetched as configured

        debug!("Loading {:?} series for widget {} from {}", interval, id, url);
        Some(
            self.extractor
                .extract(&url, &default_ohlcv_fields(), WidgetType::Chart)
                .await,
        )
    }
}
