//! Widget registration contract

use crate::data::Row;

/// Unique identifier for a widget
pub type WidgetId = uuid::Uuid;

/// Trait for widgets that take part in render/redraw passes
#[async_trait::async_trait]
pub trait Widget: Send + Sync {
    /// Get the unique ID of this widget
    fn id(&self) -> WidgetId;

    /// Get the display name
    fn name(&self) -> &str;

    /// Count widgets refresh synchronously and are not part of the
    /// completion barrier
    fn is_count_widget(&self) -> bool {
        false
    }

    /// Synchronous data path, used for count widgets
    fn data(&self) -> anyhow::Result<Vec<Row>> {
        Err(anyhow::anyhow!(
            "widget '{}' has no synchronous data path",
            self.name()
        ))
    }

    /// Fetch the rows for one pass. Called once per pass.
    async fn data_async(&self) -> anyhow::Result<Vec<Row>>;

    /// Build the widget from scratch
    fn render(&self, rows: Vec<Row>);

    /// Refresh an already rendered widget
    fn redraw(&self, rows: Vec<Row>) {
        self.render(rows)
    }

    /// Called when fetching data for the current pass failed
    fn render_error(&self, error: &anyhow::Error) {
        tracing::warn!(widget = self.name(), "data request failed: {:#}", error);
    }
}
