// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::error::AggregationError;
use crate::ingest::Relation;
use crate::suggestions::ChartKind;
use indexmap::IndexMap;
use polars::prelude::DataType as PlDataType;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const NUMERIC_COERCION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRequest {
    pub chart_type: ChartKind,
    pub x: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartSeries {
    Grouped { labels: Vec<String>, values: Vec<f64> },
    Points { data: Vec<Point> },
}

pub fn aggregate_request(
    relation: &Relation,
    request: &ChartRequest,
) -> Result<ChartSeries, AggregationError> {
    aggregate(relation, request.chart_type, &request.x, request.y.as_deref())
}

pub fn aggregate(
    relation: &Relation,
    chart_type: ChartKind,
    x: &str,
    y: Option<&str>,
) -> Result<ChartSeries, AggregationError> {
    let x_column = relation.column(x).ok_or_else(|| AggregationError::UnknownColumn {
        column: x.to_string(),
    })?;
    let y_column = y
        .map(|name| {
            relation.column(name).ok_or_else(|| AggregationError::UnknownColumn {
                column: name.to_string(),
            })
        })
        .transpose()?;
    debug!(chart = %chart_type, x, y = ?y, "aggregating chart series");
    if chart_type.is_grouped() {
        grouped_series(x_column, y_column)
    } else {
        scatter_series(x_column, y_column)
    }
}

fn grouped_series(
    x_column: &Column,
    y_column: Option<&Column>,
) -> Result<ChartSeries, AggregationError> {
    let labels = label_values(x_column)?;
    let numeric = y_column.and_then(numeric_values);
    if y_column.is_some() && numeric.is_none() {
        debug!(
            column = y_column.map(|c| c.name().as_str()),
            "y column is not numeric, counting rows per group instead"
        );
    }
    match numeric {
        Some(values) => {
            let mut totals: IndexMap<String, f64> = IndexMap::new();
            for (label, value) in labels.into_iter().zip(values) {
                let Some(label) = label else { continue };
                let total = totals.entry(label).or_insert(0.0);
                if let Some(value) = value {
                    *total += value;
                }
            }
            Ok(ChartSeries::Grouped {
                labels: totals.keys().cloned().collect(),
                values: totals.values().map(|v| round2(*v)).collect(),
            })
        }
        None => {
            let mut counts: IndexMap<String, u64> = IndexMap::new();
            for label in labels.into_iter().flatten() {
                *counts.entry(label).or_insert(0) += 1;
            }
            Ok(ChartSeries::Grouped {
                labels: counts.keys().cloned().collect(),
                values: counts.values().map(|v| *v as f64).collect(),
            })
        }
    }
}

fn scatter_series(
    x_column: &Column,
    y_column: Option<&Column>,
) -> Result<ChartSeries, AggregationError> {
    let y_column = y_column.ok_or_else(|| AggregationError::IncompatibleType {
        column: x_column.name().to_string(),
        details: "a scatter chart needs an explicit numeric y column".to_string(),
    })?;
    let xs = numeric_values(x_column).ok_or_else(|| AggregationError::IncompatibleType {
        column: x_column.name().to_string(),
        details: "scatter requires numeric values on both axes".to_string(),
    })?;
    let ys = numeric_values(y_column).ok_or_else(|| AggregationError::IncompatibleType {
        column: y_column.name().to_string(),
        details: "scatter requires numeric values on both axes".to_string(),
    })?;
    let data = xs
        .into_iter()
        .zip(ys)
        .filter_map(|(x, y)| x.zip(y).map(|(x, y)| Point { x, y }))
        .collect();
    Ok(ChartSeries::Points { data })
}

fn label_values(column: &Column) -> Result<Vec<Option<String>>, AggregationError> {
    let incompatible = |details: String| AggregationError::IncompatibleType {
        column: column.name().to_string(),
        details,
    };
    let as_str = column
        .cast(&PlDataType::String)
        .map_err(|e| incompatible(e.to_string()))?;
    let series = as_str
        .as_series()
        .ok_or_else(|| incompatible("column holds no series".to_string()))?;
    let chunked = series.str().map_err(|e| incompatible(e.to_string()))?;
    Ok(chunked
        .into_iter()
        .map(|opt| opt.map(String::from))
        .collect())
}

fn numeric_values(column: &Column) -> Option<Vec<Option<f64>>> {
    match column.dtype() {
        PlDataType::Boolean
        | PlDataType::Date
        | PlDataType::Datetime(_, _)
        | PlDataType::Time => return None,
        _ => {}
    }
    let non_null_before = column.len() - column.null_count();
    if non_null_before == 0 {
        return None;
    }
    let as_float = column.cast(&PlDataType::Float64).ok()?;
    let series = as_float.as_series()?;
    let chunked = series.f64().ok()?;
    let successes = chunked.len() - chunked.null_count();
    if (successes as f64 / non_null_before as f64) < NUMERIC_COERCION_THRESHOLD {
        return None;
    }
    Some(chunked.into_iter().collect())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_relation() -> Relation {
        let bytes = b"region,sales\nNorth,10\nSouth,20\nNorth,5\nEast,7\n";
        Relation::from_bytes(bytes, "sales.csv").unwrap()
    }

    #[test]
    fn bar_groups_in_first_seen_order_and_sums() {
        let series = aggregate(&sample_relation(), ChartKind::Bar, "region", Some("sales")).unwrap();
        match series {
            ChartSeries::Grouped { labels, values } => {
                assert_eq!(labels, vec!["North", "South", "East"]);
                assert_eq!(values, vec![15.0, 20.0, 7.0]);
            }
            other => panic!("expected grouped series, got {other:?}"),
        }
    }

    #[test]
    fn line_area_and_pie_share_bar_semantics() {
        let relation = sample_relation();
        let bar = aggregate(&relation, ChartKind::Bar, "region", Some("sales")).unwrap();
        for kind in [ChartKind::Line, ChartKind::Area, ChartKind::Pie] {
            assert_eq!(aggregate(&relation, kind, "region", Some("sales")).unwrap(), bar);
        }
    }

    #[test]
    fn missing_y_counts_rows_per_group() {
        let series = aggregate(&sample_relation(), ChartKind::Bar, "region", None).unwrap();
        match series {
            ChartSeries::Grouped { labels, values } => {
                assert_eq!(labels, vec!["North", "South", "East"]);
                assert_eq!(values, vec![2.0, 1.0, 1.0]);
            }
            other => panic!("expected grouped series, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_y_counts_rows_per_group() {
        let series =
            aggregate(&sample_relation(), ChartKind::Bar, "region", Some("region")).unwrap();
        match series {
            ChartSeries::Grouped { values, .. } => assert_eq!(values, vec![2.0, 1.0, 1.0]),
            other => panic!("expected grouped series, got {other:?}"),
        }
    }

    #[test]
    fn rows_with_null_x_are_skipped() {
        let bytes = b"region,sales\nNorth,10\n,20\nSouth,5\n";
        let relation = Relation::from_bytes(bytes, "gaps.csv").unwrap();
        let series = aggregate(&relation, ChartKind::Bar, "region", Some("sales")).unwrap();
        match series {
            ChartSeries::Grouped { labels, values } => {
                assert_eq!(labels, vec!["North", "South"]);
                assert_eq!(values, vec![10.0, 5.0]);
            }
            other => panic!("expected grouped series, got {other:?}"),
        }
    }

    #[test]
    fn null_y_contributes_nothing_but_keeps_the_group() {
        let bytes = b"region,sales\nNorth,10\nSouth,\nNorth,5\n";
        let relation = Relation::from_bytes(bytes, "gaps.csv").unwrap();
        let series = aggregate(&relation, ChartKind::Bar, "region", Some("sales")).unwrap();
        match series {
            ChartSeries::Grouped { labels, values } => {
                assert_eq!(labels, vec!["North", "South"]);
                assert_eq!(values, vec![15.0, 0.0]);
            }
            other => panic!("expected grouped series, got {other:?}"),
        }
    }

    #[test]
    fn grouped_sums_are_rounded_to_two_decimals() {
        let bytes = b"g,v\na,0.105\na,0.105\n";
        let relation = Relation::from_bytes(bytes, "round.csv").unwrap();
        let series = aggregate(&relation, ChartKind::Bar, "g", Some("v")).unwrap();
        match series {
            ChartSeries::Grouped { values, .. } => assert_eq!(values, vec![0.21]),
            other => panic!("expected grouped series, got {other:?}"),
        }
    }

    #[test]
    fn mostly_numeric_strings_sum_with_failures_as_nulls() {
        let bytes = b"g,v\na,10\na,20\nb,30\nb,40\nb,oops\n";
        let relation = Relation::from_bytes(bytes, "mixed.csv").unwrap();
        let series = aggregate(&relation, ChartKind::Bar, "g", Some("v")).unwrap();
        match series {
            ChartSeries::Grouped { labels, values } => {
                assert_eq!(labels, vec!["a", "b"]);
                assert_eq!(values, vec![30.0, 70.0]);
            }
            other => panic!("expected grouped series, got {other:?}"),
        }
    }

    #[test]
    fn scatter_emits_one_point_per_complete_row() {
        let bytes = b"sales,cost\n10,5\n20,\n5,3\n7,4\n";
        let relation = Relation::from_bytes(bytes, "pairs.csv").unwrap();
        let series = aggregate(&relation, ChartKind::Scatter, "sales", Some("cost")).unwrap();
        match series {
            ChartSeries::Points { data } => {
                assert_eq!(
                    data,
                    vec![
                        Point { x: 10.0, y: 5.0 },
                        Point { x: 5.0, y: 3.0 },
                        Point { x: 7.0, y: 4.0 },
                    ]
                );
            }
            other => panic!("expected point series, got {other:?}"),
        }
    }

    #[test]
    fn scatter_rejects_non_numeric_columns() {
        let err =
            aggregate(&sample_relation(), ChartKind::Scatter, "sales", Some("region")).unwrap_err();
        match err {
            AggregationError::IncompatibleType { column, .. } => assert_eq!(column, "region"),
            other => panic!("expected IncompatibleType, got {other:?}"),
        }
    }

    #[test]
    fn scatter_requires_a_y_column() {
        let err = aggregate(&sample_relation(), ChartKind::Scatter, "sales", None).unwrap_err();
        assert!(matches!(err, AggregationError::IncompatibleType { .. }));
    }

    #[test]
    fn unknown_columns_are_rejected_before_aggregation() {
        let relation = sample_relation();
        let err = aggregate(&relation, ChartKind::Bar, "profit", None).unwrap_err();
        match err {
            AggregationError::UnknownColumn { column } => assert_eq!(column, "profit"),
            other => panic!("expected UnknownColumn, got {other:?}"),
        }
        let err = aggregate(&relation, ChartKind::Bar, "region", Some("profit")).unwrap_err();
        assert!(matches!(err, AggregationError::UnknownColumn { .. }));
    }

    #[test]
    fn aggregation_is_deterministic() {
        let relation = sample_relation();
        let first = aggregate(&relation, ChartKind::Pie, "region", Some("sales")).unwrap();
        let second = aggregate(&relation, ChartKind::Pie, "region", Some("sales")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn group_count_matches_distinct_x_values() {
        let relation = sample_relation();
        let series = aggregate(&relation, ChartKind::Area, "region", Some("sales")).unwrap();
        let ChartSeries::Grouped { labels, .. } = series else {
            panic!("expected grouped series");
        };
        let distinct = relation
            .column("region")
            .unwrap()
            .as_series()
            .unwrap()
            .n_unique()
            .unwrap();
        assert_eq!(labels.len(), distinct);
    }

    #[test]
    fn request_form_delegates_to_aggregate() {
        let request = ChartRequest {
            chart_type: ChartKind::Bar,
            x: "region".to_string(),
            y: Some("sales".to_string()),
        };
        let direct = aggregate(&sample_relation(), ChartKind::Bar, "region", Some("sales")).unwrap();
        let via_request = aggregate_request(&sample_relation(), &request).unwrap();
        assert_eq!(direct, via_request);
    }
}
