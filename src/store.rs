//! Widget store.
//!
//! Owns the widget collection, the configuration selection, edit mode and the
//! response cache. Every method is a synchronous, self-contained mutation; the
//! network half of a refresh happens between [`WidgetStore::begin_refresh`] and
//! [`WidgetStore::complete_refresh`], outside the store.
//!
//! Operations that imply follow-up fetches return [`RefreshRequest`]s instead of
//! starting them, so the caller decides when and where they run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::error::{ExtractionError, ImportError};
use crate::schema::{ExtractedData, Field, Position, Widget, WidgetDraft, WidgetPatch, WidgetType};

/// A refresh the caller should run for one widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub widget_id: String,
}

/// Everything a refresh needs, captured when the widget enters `loading`.
#[derive(Debug, Clone)]
pub struct RefreshTicket {
    pub widget_id: String,
    pub endpoint: String,
    pub fields: Vec<Field>,
    pub widget_type: WidgetType,
}

/// Export/import wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardExport {
    pub widgets: Vec<Widget>,
}

/// Durable portion of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub widgets: Vec<Widget>,
    #[serde(default)]
    pub api_cache: ResponseCache,
}

#[derive(Debug, Default)]
pub struct WidgetStore {
    widgets: Vec<Widget>,
    is_edit_mode: bool,
    selected_widget: Option<String>,
    cache: ResponseCache,
}

impl WidgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_ttl(ttl_ms: u64) -> Self {
        Self {
            cache: ResponseCache::with_default_ttl(ttl_ms),
            ..Self::default()
        }
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn widget(&self, id: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id == id)
    }

    fn widget_mut(&mut self, id: &str) -> Option<&mut Widget> {
        self.widgets.iter_mut().find(|w| w.id == id)
    }

    pub fn is_edit_mode(&self) -> bool {
        self.is_edit_mode
    }

    pub fn selected_widget(&self) -> Option<&str> {
        self.selected_widget.as_deref()
    }

    /// Append a new widget under a fresh id. Its data stays absent until the
    /// returned refresh completes.
    pub fn add_widget(&mut self, draft: WidgetDraft) -> (Widget, Vec<RefreshRequest>) {
        let id = self.fresh_id();
        let widget = draft.into_widget(id.clone());
        info!("Added {:?} widget {} ({})", widget.widget_type, id, widget.title);
        self.widgets.push(widget.clone());
        (widget, vec![RefreshRequest { widget_id: id }])
    }

    /// Remove a widget, clearing the selection if it pointed at it.
    pub fn remove_widget(&mut self, id: &str) -> Option<Widget> {
        let index = self.widgets.iter().position(|w| w.id == id)?;
        let removed = self.widgets.remove(index);
        if self.selected_widget.as_deref() == Some(id) {
            self.selected_widget = None;
        }
        info!("Removed widget {}", id);
        Some(removed)
    }

    /// Shallow-merge user settings. Does not refresh.
    pub fn update_widget(&mut self, id: &str, patch: WidgetPatch) -> Option<&Widget> {
        let widget = self.widget_mut(id)?;
        patch.apply(widget);
        Some(widget)
    }

    /// Layout-only update. Never refreshes.
    pub fn update_widget_position(&mut self, id: &str, position: Position) -> bool {
        match self.widget_mut(id) {
            Some(widget) => {
                widget.position = position;
                true
            }
            None => false,
        }
    }

    /// Entering edit mode drops the configuration selection.
    pub fn set_edit_mode(&mut self, enabled: bool) {
        self.is_edit_mode = enabled;
        if enabled {
            self.selected_widget = None;
        }
    }

    pub fn set_selected_widget(&mut self, id: Option<String>) {
        self.selected_widget = id;
    }

    /// Enter `loading` for a widget. `None` if the id is unknown.
    pub fn begin_refresh(&mut self, id: &str) -> Option<RefreshTicket> {
        let widget = self.widget_mut(id)?;
        widget.is_loading = true;
        widget.error = None;
        Some(RefreshTicket {
            widget_id: widget.id.clone(),
            endpoint: widget.endpoint.clone(),
            fields: widget.selected_fields.clone(),
            widget_type: widget.widget_type,
        })
    }

    /// Settle a refresh. Returns false when the widget was removed meanwhile,
    /// in which case nothing is written.
    pub fn complete_refresh(
        &mut self,
        id: &str,
        result: Result<ExtractedData, ExtractionError>,
        now: u64,
    ) -> bool {
        match result {
            Ok(data) => self.update_widget_data(id, data, now),
            Err(e) => self.record_refresh_error(id, e.to_string()),
        }
    }

    /// Store freshly extracted data and leave `loading`.
    pub fn update_widget_data(&mut self, id: &str, data: ExtractedData, now: u64) -> bool {
        let Some(widget) = self.widget_mut(id) else {
            debug!("Dropping data for removed widget {}", id);
            return false;
        };
        widget.data = Some(data);
        widget.last_updated = Some(now);
        widget.is_loading = false;
        widget.error = None;
        true
    }

    /// Record a failed refresh. Previous data stays visible.
    pub fn record_refresh_error(&mut self, id: &str, message: String) -> bool {
        let Some(widget) = self.widget_mut(id) else {
            debug!("Dropping error for removed widget {}: {}", id, message);
            return false;
        };
        warn!("Widget {} refresh failed: {}", id, message);
        widget.error = Some(message);
        widget.is_loading = false;
        true
    }

    pub fn get_cached_data(&mut self, key: &str) -> Option<&Value> {
        self.cache.get(key)
    }

    pub fn set_cached_data(&mut self, key: &str, payload: Value, ttl: Option<u64>) {
        self.cache.set(key, payload, ttl);
    }

    pub fn remove_cached_data(&mut self, key: &str) -> bool {
        self.cache.remove(key)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache(&mut self) -> &mut ResponseCache {
        &mut self.cache
    }

    /// Serialize the whole collection, transient state included.
    pub fn export_dashboard(&self) -> Result<String, serde_json::Error> {
        let export = DashboardExport {
            widgets: self.widgets.clone(),
        };
        serde_json::to_string_pretty(&export)
    }

    /// Replace the collection with the widgets in `text`, all or nothing.
    pub fn import_dashboard(&mut self, text: &str) -> Result<Vec<RefreshRequest>, ImportError> {
        let parsed: Value = serde_json::from_str(text)?;
        let widgets = parsed
            .get("widgets")
            .filter(|w| w.is_array())
            .ok_or(ImportError::MissingWidgets)?;
        let widgets: Vec<Widget> = serde_json::from_value(widgets.clone())?;

        info!("Imported dashboard with {} widgets", widgets.len());
        self.widgets = widgets;
        self.drop_stale_selection();
        Ok(self.refresh_all())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            widgets: self.widgets.clone(),
            api_cache: self.cache.clone(),
        }
    }

    /// Load persisted state. No fetch survives a restart, so loading flags are
    /// cleared and every widget is due for a refresh.
    pub fn restore(&mut self, snapshot: StoreSnapshot) -> Vec<RefreshRequest> {
        let default_ttl = self.cache.default_ttl();
        self.widgets = snapshot.widgets;
        for widget in &mut self.widgets {
            widget.is_loading = false;
        }
        self.cache = snapshot.api_cache;
        self.cache.set_default_ttl(default_ttl);
        self.drop_stale_selection();
        self.refresh_all()
    }

    fn refresh_all(&self) -> Vec<RefreshRequest> {
        self.widgets
            .iter()
            .map(|w| RefreshRequest {
                widget_id: w.id.clone(),
            })
            .collect()
    }

    fn drop_stale_selection(&mut self) {
        if let Some(id) = self.selected_widget.as_deref() {
            if self.widget(id).is_none() {
                self.selected_widget = None;
            }
        }
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = format!("wgt_{}", Uuid::new_v4().simple());
            if self.widget(&id).is_none() {
                return id;
            }
        }
    }
}
