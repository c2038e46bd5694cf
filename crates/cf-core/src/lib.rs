//! Core abstractions for the cross-filter query engine
//!
//! This crate provides the row model, the data connector capability, the
//! event bus and the render/redraw coordinator shared by every widget of a
//! dashboard.

pub mod coordinator;
pub mod data;
pub mod events;

// Re-export commonly used types
pub use coordinator::{
    Coordinator, PassKind, PassRequest, Widget, WidgetId, DEFAULT_GROUP,
};
pub use data::{row, ColumnMeta, ColumnType, Connector, Row, Value};
pub use events::{EventBus, handler_from_fn};
