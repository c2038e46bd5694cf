//! Fixtures shared by the unit tests

use std::sync::Arc;

use cf_core::{ColumnMeta, ColumnType};

use crate::config::CrossfilterConfig;
use crate::crossfilter::Crossfilter;
use crate::sources::ScriptedConnector;

pub(crate) fn flights_connector() -> ScriptedConnector {
    ScriptedConnector::new("scripted").with_table(
        "flights",
        vec![
            ColumnMeta::new("dest_state", ColumnType::Text),
            ColumnMeta::new("carrier", ColumnType::Text),
            ColumnMeta::new("dep_delay", ColumnType::Float),
            ColumnMeta::new("dep_time", ColumnType::Timestamp),
            ColumnMeta::new("tags", ColumnType::Text).array(),
        ],
    )
}

pub(crate) fn flights() -> Arc<ScriptedConnector> {
    Arc::new(flights_connector())
}

/// Dataset over the scripted `flights` table, plus its connector
pub(crate) fn flights_dataset() -> (Crossfilter, Arc<ScriptedConnector>) {
    let conn = flights();
    let cf = Crossfilter::new(conn.clone(), ["flights"], CrossfilterConfig::default())
        .expect("flights table is declared");
    (cf, conn)
}
