//! Console widgets: each chart prints its rows as a table on every pass

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use cf_core::{row, Row, Value, Widget, WidgetId};
use cf_data::{export, BinParams, Crossfilter, Dimension, Group, GroupAll};
use parking_lot::Mutex;

use crate::dashboard::{ChartConfig, ChartKind};

/// Where a widget gets its rows from
enum Source {
    /// Top groups of a dimension
    Top { group: Group, limit: usize },
    /// Every (binned) group
    All { group: Group },
    /// Raw rows of the filtered dataset
    Rows { dimension: Dimension, limit: usize },
    /// Selected rows against the total
    Count { all: GroupAll, total: i64 },
}

pub struct ConsoleWidget {
    id: WidgetId,
    name: String,
    dimension: Dimension,
    source: Source,
    /// Rows shown by the last pass
    shown: Mutex<Vec<Row>>,
}

impl ConsoleWidget {
    pub fn from_config(cf: &Crossfilter, chart: &ChartConfig) -> Result<Arc<Self>> {
        let dimension = cf.dimension(chart.dimension.iter().map(String::as_str));
        let source = match &chart.kind {
            ChartKind::Bar { limit } => {
                let group = reduced_group(&dimension, chart);
                Source::Top { group, limit: *limit }
            }
            ChartKind::Histogram { lo, hi, bins } => {
                let group = reduced_group(&dimension, chart);
                group.set_bin_params(Some(vec![Some(BinParams::numeric(*lo, *hi, *bins))]))?;
                group.set_eliminate_null(true);
                Source::All { group }
            }
            ChartKind::Timeline { lo, hi, bins } => {
                let group = reduced_group(&dimension, chart);
                group.set_bin_params(Some(vec![Some(BinParams::time(*lo, *hi, *bins))]))?;
                group.set_eliminate_null(true);
                Source::All { group }
            }
            ChartKind::Table { columns, limit } => {
                dimension.project_on(columns.iter().map(String::as_str));
                Source::Rows {
                    dimension: dimension.clone(),
                    limit: *limit,
                }
            }
            ChartKind::Count => {
                let all = cf.group_all();
                let total = cf.size()?;
                Source::Count { all, total }
            }
        };

        Ok(Arc::new(Self {
            id: uuid::Uuid::new_v4(),
            name: chart.name.clone(),
            dimension,
            source,
            shown: Mutex::new(Vec::new()),
        }))
    }

    pub fn dimension(&self) -> &Dimension {
        &self.dimension
    }

    /// Rows shown by the last completed pass
    pub fn shown(&self) -> Vec<Row> {
        self.shown.lock().clone()
    }

    fn show(&self, verb: &str, rows: Vec<Row>) {
        match export::pretty_format(&rows) {
            Ok(table) => println!("{} [{}]\n{}", self.name, verb, table),
            Err(e) => tracing::warn!(widget = %self.name, "cannot format rows: {}", e),
        }
        *self.shown.lock() = rows;
    }
}

fn reduced_group(dimension: &Dimension, chart: &ChartConfig) -> Group {
    let group = dimension.group();
    if !chart.reduce.is_empty() {
        group.reduce(chart.reduce.clone());
    }
    group
}

fn count_row(selected: Value, total: i64) -> Vec<Row> {
    vec![row([("selected", selected), ("total", Value::Int(total))])]
}

#[async_trait]
impl Widget for ConsoleWidget {
    fn id(&self) -> WidgetId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_count_widget(&self) -> bool {
        matches!(self.source, Source::Count { .. })
    }

    fn data(&self) -> Result<Vec<Row>> {
        match &self.source {
            Source::Count { all, total } => Ok(count_row(all.value()?, *total)),
            _ => anyhow::bail!("widget '{}' has no synchronous data path", self.name),
        }
    }

    async fn data_async(&self) -> Result<Vec<Row>> {
        let rows = match &self.source {
            Source::Top { group, limit } => group.top_async(*limit, 0).await?,
            Source::All { group } => group.all_async().await?,
            Source::Rows { dimension, limit } => dimension.top_async(*limit, 0).await?,
            Source::Count { all, total } => count_row(all.value_async().await?, *total),
        };
        Ok(rows)
    }

    fn render(&self, rows: Vec<Row>) {
        self.show("render", rows);
    }

    fn redraw(&self, rows: Vec<Row>) {
        self.show("redraw", rows);
    }

    fn render_error(&self, error: &anyhow::Error) {
        tracing::error!(widget = %self.name, "query failed: {:#}", error);
    }
}
