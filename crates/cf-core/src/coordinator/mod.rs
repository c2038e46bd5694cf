//! Render/redraw coordination across the widgets of a chart group
//!
//! A user interaction asks every widget of a chart group for fresh data in a
//! single *pass*. Passes are tagged with a generation token; a request that
//! arrives while a pass is in flight is coalesced into exactly one follow-up
//! pass which starts once every widget of the current pass has reported back.

use serde::{Deserialize, Serialize};

mod engine;
mod pass;
mod widget;

pub use engine::Coordinator;
pub use pass::{PassClose, PassRequest, PassState, PassToken};
pub use widget::{Widget, WidgetId};

/// Chart group used when a widget is registered without one
pub const DEFAULT_GROUP: &str = "";

/// The two independent kinds of pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassKind {
    /// Full (re)construction of every widget
    Render,
    /// Data refresh of already rendered widgets
    Redraw,
}
