//! Console dashboard over a SQLite flights table
//!
//! Loads a dashboard description (or the built-in one), renders every chart
//! once, then replays the scripted interactions, redrawing after each.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cf_core::events::events::{DataSetLoaded, FilterApplied, FilterCleared, PassCompleted};
use cf_core::events::Event;
use cf_core::{handler_from_fn, Coordinator, EventBus, PassKind, DEFAULT_GROUP};
use cf_data::{Crossfilter, FilterItem, FilterValue, SqliteConnector};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod create_sample_db;
mod dashboard;
mod widgets;

use dashboard::{DashboardConfig, Interaction};
use widgets::ConsoleWidget;

fn log_events(bus: &EventBus) {
    bus.subscribe::<DataSetLoaded>(handler_from_fn(|event: &dyn Event| {
        if let Some(e) = event.as_any().downcast_ref::<DataSetLoaded>() {
            info!(tables = ?e.tables, columns = e.column_count, "dataset loaded");
        }
    }));
    bus.subscribe::<FilterApplied>(handler_from_fn(|event: &dyn Event| {
        if let Some(e) = event.as_any().downcast_ref::<FilterApplied>() {
            info!(slot = e.slot, filter = %e.filter, "filter applied");
        }
    }));
    bus.subscribe::<FilterCleared>(handler_from_fn(|event: &dyn Event| {
        if let Some(e) = event.as_any().downcast_ref::<FilterCleared>() {
            info!(slot = e.slot, "filter cleared");
        }
    }));
    bus.subscribe::<PassCompleted>(handler_from_fn(|event: &dyn Event| {
        if let Some(e) = event.as_any().downcast_ref::<PassCompleted>() {
            tracing::debug!(kind = ?e.kind, token = e.token, "pass completed");
        }
    }));
}

/// Filters switching on or off redraw every chart
fn redraw_on_filter_change(bus: &EventBus, coordinator: &Coordinator) {
    let redraw = coordinator.clone();
    bus.subscribe::<FilterApplied>(handler_from_fn(move |_| {
        redraw.redraw_all(DEFAULT_GROUP);
    }));
    let redraw = coordinator.clone();
    bus.subscribe::<FilterCleared>(handler_from_fn(move |_| {
        redraw.redraw_all(DEFAULT_GROUP);
    }));
}

fn apply(
    cf: &Crossfilter,
    charts: &HashMap<String, Arc<ConsoleWidget>>,
    step: &Interaction,
) -> Result<()> {
    let chart = |name: &str| {
        charts
            .get(name)
            .with_context(|| format!("no chart named '{}'", name))
    };
    match step {
        Interaction::Select { chart: name, values } => {
            let dimension = chart(name)?.dimension();
            match values.as_slice() {
                [single] => dimension.filter_exact(FilterValue::from(single.clone()))?,
                many => dimension.filter_multi(
                    many.iter()
                        .map(|v| FilterItem::exact(FilterValue::from(v.clone())))
                        .collect(),
                    false,
                )?,
            }
        }
        Interaction::Brush { chart: name, lo, hi } => {
            let range = (FilterValue::from(lo.clone()), FilterValue::from(hi.clone()));
            chart(name)?.dimension().filter_range(range, false)?;
        }
        Interaction::Clear { chart: name } => chart(name)?.dimension().filter_all(false)?,
        Interaction::ClearAll => cf.clear_all_filters(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DashboardConfig::load(&PathBuf::from(path))?,
        None => DashboardConfig::default(),
    };

    if !config.database.exists() {
        if let Some(dir) = config.database.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        info!(path = %config.database.display(), "creating sample database");
        create_sample_db::create_sample_database(&config.database)?;
    }

    let bus = Arc::new(EventBus::new());
    log_events(&bus);

    let connector = Arc::new(SqliteConnector::open(&config.database)?);
    let cf = Crossfilter::with_event_bus(
        connector,
        [config.table.as_str()],
        config.crossfilter.clone(),
        bus.clone(),
    )?;

    let coordinator = Coordinator::with_event_bus(tokio::runtime::Handle::current(), bus.clone());
    let mut charts = HashMap::new();
    for chart in &config.charts {
        let widget = ConsoleWidget::from_config(&cf, chart)
            .with_context(|| format!("building chart '{}'", chart.name))?;
        coordinator.register(widget.clone(), DEFAULT_GROUP);
        charts.insert(chart.name.clone(), widget);
    }

    redraw_on_filter_change(&bus, &coordinator);

    coordinator.render_all(DEFAULT_GROUP);
    coordinator.wait_idle(PassKind::Render, DEFAULT_GROUP).await;

    for step in &config.interactions {
        info!(?step, "interaction");
        let passes = coordinator.pass_count(PassKind::Redraw, DEFAULT_GROUP);
        apply(&cf, &charts, step)?;
        // replacing one filter by another raises no notification
        if coordinator.pass_count(PassKind::Redraw, DEFAULT_GROUP) == passes {
            coordinator.redraw_all(DEFAULT_GROUP);
        }
        coordinator.wait_idle(PassKind::Redraw, DEFAULT_GROUP).await;
    }

    let stats = cf.cache().stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        "dataset cache"
    );
    cf.dispose();
    Ok(())
}
