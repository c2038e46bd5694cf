//! Coordinator implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{PassClose, PassKind, PassRequest, PassState, PassToken, Widget, WidgetId};
use crate::data::Row;
use crate::events::{events::PassCompleted, EventBus};

/// Batches the render or redraw of all widgets of a chart group into passes
///
/// Cheap to clone; clones share the registry and the pass state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    /// Widgets by chart group, in registration order
    registry: RwLock<IndexMap<String, Vec<Arc<dyn Widget>>>>,
    passes: Mutex<AHashMap<(String, PassKind), PassState>>,
    refresh_disabled: AtomicBool,
    /// Bumped every time a pass kind goes idle
    settled: watch::Sender<u64>,
    runtime_handle: Handle,
    event_bus: Option<Arc<EventBus>>,
}

impl Coordinator {
    /// Create a coordinator that spawns its data requests on `runtime_handle`
    pub fn new(runtime_handle: Handle) -> Self {
        Self::build(runtime_handle, None)
    }

    /// Create a coordinator bound to the runtime of the caller.
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Publish a `PassCompleted` event on `bus` whenever a pass closes
    pub fn with_event_bus(runtime_handle: Handle, bus: Arc<EventBus>) -> Self {
        Self::build(runtime_handle, Some(bus))
    }

    fn build(runtime_handle: Handle, event_bus: Option<Arc<EventBus>>) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            inner: Arc::new(CoordinatorInner {
                registry: RwLock::new(IndexMap::new()),
                passes: Mutex::new(AHashMap::new()),
                refresh_disabled: AtomicBool::new(false),
                settled,
                runtime_handle,
                event_bus,
            }),
        }
    }

    /// Add a widget to a chart group
    pub fn register(&self, widget: Arc<dyn Widget>, group: &str) {
        debug!(widget = widget.name(), group, "registering widget");
        self.inner
            .registry
            .write()
            .entry(group.to_string())
            .or_default()
            .push(widget);
    }

    /// Remove a widget from whichever group holds it
    pub fn deregister(&self, id: WidgetId) -> bool {
        let mut registry = self.inner.registry.write();
        let mut removed = false;
        for widgets in registry.values_mut() {
            let before = widgets.len();
            widgets.retain(|w| w.id() != id);
            removed |= widgets.len() != before;
        }
        removed
    }

    /// Widgets registered in a chart group
    pub fn widgets(&self, group: &str) -> Vec<Arc<dyn Widget>> {
        self.inner
            .registry
            .read()
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    /// Start a render pass over a chart group
    pub fn render_all(&self, group: &str) -> PassRequest {
        self.request_pass(PassKind::Render, group)
    }

    /// Start a redraw pass over a chart group
    pub fn redraw_all(&self, group: &str) -> PassRequest {
        self.request_pass(PassKind::Redraw, group)
    }

    /// Stop starting passes until `enable_refresh` is called
    pub fn disable_refresh(&self) {
        self.inner.refresh_disabled.store(true, Ordering::SeqCst);
    }

    pub fn enable_refresh(&self) {
        self.inner.refresh_disabled.store(false, Ordering::SeqCst);
    }

    pub fn is_refresh_disabled(&self) -> bool {
        self.inner.refresh_disabled.load(Ordering::SeqCst)
    }

    /// Whether no pass of `kind` is in flight for `group`
    pub fn is_idle(&self, kind: PassKind, group: &str) -> bool {
        self.inner
            .passes
            .lock()
            .get(&(group.to_string(), kind))
            .map(|state| state.is_idle())
            .unwrap_or(true)
    }

    /// Number of passes of `kind` started for `group`
    pub fn pass_count(&self, kind: PassKind, group: &str) -> usize {
        self.inner
            .passes
            .lock()
            .get(&(group.to_string(), kind))
            .map(|state| state.passes())
            .unwrap_or(0)
    }

    /// Resolve once no pass of `kind` is in flight for `group`
    pub async fn wait_idle(&self, kind: PassKind, group: &str) {
        let mut settled = self.inner.settled.subscribe();
        while !self.is_idle(kind, group) {
            if settled.changed().await.is_err() {
                break;
            }
        }
    }

    /// Ask for a pass. If one is in flight the request is coalesced into a
    /// single follow-up pass.
    pub fn request_pass(&self, kind: PassKind, group: &str) -> PassRequest {
        if self.is_refresh_disabled() {
            debug!(?kind, group, "refresh disabled, dropping pass request");
            return PassRequest::Disabled;
        }

        let (count_widgets, async_widgets): (Vec<_>, Vec<_>) = self
            .widgets(group)
            .into_iter()
            .partition(|w| w.is_count_widget());

        let request = {
            let mut passes = self.inner.passes.lock();
            let state = passes.entry((group.to_string(), kind)).or_default();
            let request = state.request();
            if let PassRequest::Start(token) = request {
                state.begin(token, async_widgets.len());
            }
            request
        };

        let token = match request {
            PassRequest::Start(token) => token,
            PassRequest::Coalesced(token) => {
                debug!(?kind, group, token = token.0, "pass in flight, request coalesced");
                return request;
            }
            PassRequest::Disabled => return request,
        };

        info!(
            ?kind,
            group,
            token = token.0,
            widgets = async_widgets.len(),
            "starting pass"
        );

        for widget in &count_widgets {
            match widget.data() {
                Ok(rows) => apply(kind, widget.as_ref(), rows),
                Err(e) => widget.render_error(&e),
            }
        }

        if async_widgets.is_empty() {
            let close = {
                let mut passes = self.inner.passes.lock();
                passes
                    .entry((group.to_string(), kind))
                    .or_default()
                    .close(token)
            };
            self.after_close(kind, group, token, close);
            return request;
        }

        for widget in async_widgets {
            let coordinator = self.clone();
            let group = group.to_string();
            let fetching = widget.clone();
            let fetch = self
                .inner
                .runtime_handle
                .spawn(async move { fetching.data_async().await });
            self.inner.runtime_handle.spawn(async move {
                // a panicking data request still counts toward the pass
                let result = match fetch.await {
                    Ok(result) => result,
                    Err(e) => Err(anyhow::anyhow!("data request aborted: {}", e)),
                };
                coordinator.complete(kind, &group, token, widget.as_ref(), result);
            });
        }

        request
    }

    /// Record the completion of one widget's data request
    fn complete(
        &self,
        kind: PassKind,
        group: &str,
        token: PassToken,
        widget: &dyn Widget,
        result: anyhow::Result<Vec<Row>>,
    ) {
        let key = (group.to_string(), kind);
        let current = self
            .inner
            .passes
            .lock()
            .get(&key)
            .map(|state| state.is_current(token))
            .unwrap_or(false);

        match result {
            Ok(rows) if current => apply(kind, widget, rows),
            Ok(_) => debug!(
                widget = widget.name(),
                token = token.0,
                "discarding rows of a superseded pass"
            ),
            Err(e) => {
                warn!(widget = widget.name(), token = token.0, "data request failed: {:#}", e);
                if current {
                    widget.render_error(&e);
                }
            }
        }

        let close = self
            .inner
            .passes
            .lock()
            .get_mut(&key)
            .and_then(|state| state.complete_one(token));

        if let Some(close) = close {
            self.after_close(kind, group, token, close);
        }
    }

    fn after_close(&self, kind: PassKind, group: &str, token: PassToken, close: PassClose) {
        debug!(?kind, group, token = token.0, ?close, "pass complete");
        if let Some(bus) = &self.inner.event_bus {
            bus.publish(PassCompleted {
                kind,
                group: group.to_string(),
                token: token.0,
            });
        }

        match close {
            PassClose::Retrigger => {
                self.request_pass(kind, group);
            }
            PassClose::Idle => {}
        }

        // Also covers the case where the follow-up was dropped because
        // refresh got disabled in between.
        if self.is_idle(kind, group) {
            self.inner.settled.send_modify(|n| *n += 1);
        }
    }
}

fn apply(kind: PassKind, widget: &dyn Widget, rows: Vec<Row>) {
    match kind {
        PassKind::Render => widget.render(rows),
        PassKind::Redraw => widget.redraw(rows),
    }
}
