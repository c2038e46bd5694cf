//! Aggregate measures of groups

use serde::{Deserialize, Serialize};

/// Aggregate function of a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggMode {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggMode {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggMode::Count => "COUNT",
            AggMode::Sum => "SUM",
            AggMode::Avg => "AVG",
            AggMode::Min => "MIN",
            AggMode::Max => "MAX",
        }
    }
}

/// One named measure: `agg(expression) AS name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceSpec {
    pub expression: String,
    pub agg: AggMode,
    pub name: String,
}

impl ReduceSpec {
    pub fn new(expression: impl Into<String>, agg: AggMode, name: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            agg,
            name: name.into(),
        }
    }

    /// `COUNT(*) AS val`, the default measure
    pub fn count() -> Self {
        Self::new("*", AggMode::Count, "val")
    }

    pub fn to_sql(&self) -> String {
        format!("{}({}) AS {}", self.agg.sql_name(), self.expression, self.name)
    }

    /// Share of rows matching `filter`, replacing the measure when it is
    /// the target of a multi-aggregate
    pub fn target_share(&self, filter: &str) -> String {
        format!("AVG(CAST({} AS INT)) AS {}", filter, self.name)
    }
}

/// Projection for a list of measures. When `target` is given, the measure at
/// that index becomes the share of rows matching the target filter.
pub(crate) fn projection(specs: &[ReduceSpec], target: Option<(usize, &str)>) -> Vec<String> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| match target {
            Some((slot, filter)) if slot == i => spec.target_share(filter),
            _ => spec.to_sql(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_measure_is_substituted() {
        let specs = vec![
            ReduceSpec::count(),
            ReduceSpec::new("dep_delay", AggMode::Avg, "delay"),
        ];
        assert_eq!(
            projection(&specs, None),
            vec!["COUNT(*) AS val", "AVG(dep_delay) AS delay"]
        );
        assert_eq!(
            projection(&specs, Some((0, "carrier = 'AA'"))),
            vec![
                "AVG(CAST(carrier = 'AA' AS INT)) AS val",
                "AVG(dep_delay) AS delay"
            ]
        );
        assert_eq!(
            projection(&specs, Some((1, "carrier = 'AA'")))[1],
            "AVG(CAST(carrier = 'AA' AS INT)) AS delay"
        );
    }
}
