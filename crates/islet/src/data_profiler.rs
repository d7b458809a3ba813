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

use crate::aggregator::{self, ChartSeries};
use crate::ingest::Relation;
use crate::suggestions::ChartKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::QuantileMethod;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, thiserror::Error)]
pub enum ProfilerError {
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
    #[error("Parsing error: {0}")]
    Parsing(String),
}

#[derive(Debug, Clone)]
pub struct ProfilingConfig {
    pub sample_rows: usize,
    pub type_confidence_threshold: f64,
    pub low_cardinality_threshold: usize,
    pub max_correlation_columns: usize,
    pub min_correlation: f64,
    pub temporal_formats: Vec<String>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            sample_rows: 3,
            type_confidence_threshold: 0.8,
            low_cardinality_threshold: 12,
            max_correlation_columns: 5,
            min_correlation: 0.3,
            temporal_formats: vec![
                "%Y-%m-%d".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%SZ".to_string(),
                "%m/%d/%Y".to_string(),
                "%d/%m/%Y".to_string(),
                "%Y%m%d".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Temporal,
    Categorical,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Temporal => "temporal",
            ColumnType::Categorical => "categorical",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub column_type: ColumnType,
    pub cardinality: usize,
    pub null_count: usize,
    pub distinct_values: Option<Vec<String>>,
    pub numeric_stats: Option<NumericStats>,
    pub temporal_range: Option<TemporalRange>,
    pub type_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q25: Option<f64>,
    pub q75: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalRange {
    pub min: Option<String>,
    pub max: Option<String>,
    pub has_time_component: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation {
    pub left: String,
    pub right: String,
    pub coefficient: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadingGroup {
    pub group_column: String,
    pub value_column: String,
    pub leader: String,
    pub total: f64,
    pub lead_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variability {
    pub column: String,
    pub coefficient_of_variation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProfile {
    pub filename: String,
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub sample_rows: Vec<serde_json::Value>,
    pub correlations: Vec<Correlation>,
    pub leading_group: Option<LeadingGroup>,
    pub variability: Vec<Variability>,
}

impl TableProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &ColumnProfile> {
        self.columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Numeric)
    }

    pub fn categorical_columns(&self) -> impl Iterator<Item = &ColumnProfile> {
        self.columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Categorical)
    }

    pub fn temporal_columns(&self) -> impl Iterator<Item = &ColumnProfile> {
        self.columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Temporal)
    }

    pub fn first_numeric(&self) -> Option<&ColumnProfile> {
        self.numeric_columns().next()
    }

    pub fn first_categorical(&self) -> Option<&ColumnProfile> {
        self.categorical_columns().next()
    }

    pub fn first_temporal(&self) -> Option<&ColumnProfile> {
        self.temporal_columns().next()
    }

    pub fn first_low_cardinality_categorical(&self) -> Option<&ColumnProfile> {
        self.categorical_columns()
            .find(|c| c.distinct_values.is_some())
    }
}

pub struct DataProfiler {
    config: ProfilingConfig,
}

impl Default for DataProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl DataProfiler {
    pub fn new() -> Self {
        Self {
            config: ProfilingConfig::default(),
        }
    }

    pub fn with_config(config: ProfilingConfig) -> Self {
        Self { config }
    }

    pub fn profile(&self, relation: &Relation) -> Result<TableProfile, ProfilerError> {
        let df = relation.dataframe();
        let total_rows = df.height();
        let columns: Vec<ColumnProfile> = df
            .get_columns()
            .par_iter()
            .map(|column| {
                let series = column.as_series().ok_or_else(|| {
                    ProfilerError::Parsing(format!("column '{}' holds no series", column.name()))
                })?;
                self.profile_column(series)
            })
            .collect::<Result<_, _>>()?;
        let sample_rows = self.sample_rows(df)?;
        let correlations = self.correlations(df, &columns)?;
        let profile = TableProfile {
            filename: relation.filename().to_string(),
            row_count: total_rows,
            columns,
            sample_rows,
            correlations,
            leading_group: None,
            variability: Vec::new(),
        };
        let leading_group = self.leading_group(relation, &profile);
        let variability = self.variability(&profile);
        Ok(TableProfile {
            leading_group,
            variability,
            ..profile
        })
    }

    fn profile_column(&self, column: &Series) -> Result<ColumnProfile, ProfilerError> {
        let name = column.name().to_string();
        let null_count = column.null_count();
        let (column_type, type_confidence) = self.detect_column_type(column)?;
        let cardinality = column.n_unique()?;
        let mut numeric_stats = None;
        let mut temporal_range = None;
        let mut distinct_values = None;
        match column_type {
            ColumnType::Numeric => {
                let as_float = column.cast(&polars::prelude::DataType::Float64)?;
                numeric_stats = Some(self.numeric_stats(&as_float)?);
            }
            ColumnType::Temporal => {
                temporal_range = self.temporal_range(column)?;
            }
            ColumnType::Categorical => {
                if cardinality <= self.config.low_cardinality_threshold {
                    distinct_values = Some(self.distinct_values(column)?);
                }
            }
        }
        Ok(ColumnProfile {
            name,
            column_type,
            cardinality,
            null_count,
            distinct_values,
            numeric_stats,
            temporal_range,
            type_confidence,
        })
    }

    fn detect_column_type(&self, column: &Series) -> Result<(ColumnType, f64), ProfilerError> {
        let non_null_count = column.len() - column.null_count();
        if non_null_count == 0 {
            return Ok((ColumnType::Categorical, 0.0));
        }
        match column.dtype() {
            polars::prelude::DataType::Float64
            | polars::prelude::DataType::Float32
            | polars::prelude::DataType::Int64
            | polars::prelude::DataType::Int32
            | polars::prelude::DataType::Int16
            | polars::prelude::DataType::Int8
            | polars::prelude::DataType::UInt64
            | polars::prelude::DataType::UInt32
            | polars::prelude::DataType::UInt16
            | polars::prelude::DataType::UInt8 => return Ok((ColumnType::Numeric, 1.0)),
            polars::prelude::DataType::Date | polars::prelude::DataType::Datetime(_, _) => {
                return Ok((ColumnType::Temporal, 1.0))
            }
            polars::prelude::DataType::Boolean => return Ok((ColumnType::Categorical, 1.0)),
            _ => {}
        }
        if let Ok(as_float) = column.cast(&polars::prelude::DataType::Float64) {
            let successful_casts = as_float.len() - as_float.null_count();
            let confidence = successful_casts as f64 / non_null_count as f64;
            if confidence >= self.config.type_confidence_threshold {
                return Ok((ColumnType::Numeric, confidence));
            }
        }
        if let Ok(as_str) = column.cast(&polars::prelude::DataType::String) {
            let str_ca = as_str.str()?;
            let values: Vec<Option<&str>> = str_ca.into_iter().collect();
            let temporal_confidence = self.test_temporal_parsing(&values);
            if temporal_confidence >= self.config.type_confidence_threshold {
                return Ok((ColumnType::Temporal, temporal_confidence));
            }
        }
        Ok((ColumnType::Categorical, 0.8))
    }

    fn numeric_stats(&self, s: &Series) -> Result<NumericStats, ProfilerError> {
        let s_f64 = s.f64()?;
        let count = s_f64.len() - s_f64.null_count();
        let q25 = s_f64.quantile(0.25, QuantileMethod::Linear).ok().flatten();
        let q75 = s_f64.quantile(0.75, QuantileMethod::Linear).ok().flatten();
        Ok(NumericStats {
            count,
            mean: s_f64.mean(),
            median: s_f64.median(),
            std: s_f64.std(1),
            min: s_f64.min(),
            max: s_f64.max(),
            q25,
            q75,
        })
    }

    fn distinct_values(&self, column: &Series) -> Result<Vec<String>, ProfilerError> {
        let unique = column.unique_stable()?;
        let as_str = unique.cast(&polars::prelude::DataType::String)?;
        let str_ca = as_str.str()?;
        Ok(str_ca
            .into_iter()
            .filter_map(|opt| opt.map(String::from))
            .collect())
    }

    fn temporal_range(&self, column: &Series) -> Result<Option<TemporalRange>, ProfilerError> {
        let as_str = column.cast(&polars::prelude::DataType::String)?;
        let str_ca = as_str.str()?;
        let mut datetimes = Vec::new();
        let mut has_time = false;
        for value in str_ca.into_iter().flatten() {
            for format in &self.config.temporal_formats {
                if let Some(dt) = parse_datetime(value, format) {
                    datetimes.push(dt);
                    if format.contains("%H") || format.contains("%M") || format.contains("%S") {
                        has_time = true;
                    }
                    break;
                }
            }
        }
        if datetimes.is_empty() {
            return Ok(None);
        }
        let render = |dt: &DateTime<Utc>| {
            if has_time {
                dt.format("%Y-%m-%d %H:%M:%S").to_string()
            } else {
                dt.format("%Y-%m-%d").to_string()
            }
        };
        Ok(Some(TemporalRange {
            min: datetimes.iter().min().map(render),
            max: datetimes.iter().max().map(render),
            has_time_component: has_time,
        }))
    }

    fn test_temporal_parsing(&self, values: &[Option<&str>]) -> f64 {
        let non_null_values: Vec<_> = values.iter().filter_map(|&v| v).collect();
        if non_null_values.is_empty() {
            return 0.0;
        }
        let total_count = non_null_values.len();
        let mut best_confidence = 0.0;
        for format in &self.config.temporal_formats {
            let successful_parses = non_null_values
                .par_iter()
                .filter(|&v| parse_datetime(v, format).is_some())
                .count();
            let confidence = successful_parses as f64 / total_count as f64;
            best_confidence = f64::max(best_confidence, confidence);
        }
        best_confidence
    }

    fn sample_rows(&self, df: &DataFrame) -> Result<Vec<serde_json::Value>, ProfilerError> {
        let head = df.head(Some(self.config.sample_rows));
        let mut rows = Vec::with_capacity(head.height());
        for idx in 0..head.height() {
            let mut row = serde_json::Map::new();
            for column in head.get_columns() {
                let value = column.get(idx)?;
                row.insert(column.name().to_string(), anyvalue_to_json(&value));
            }
            rows.push(serde_json::Value::Object(row));
        }
        Ok(rows)
    }

    fn correlations(
        &self,
        df: &DataFrame,
        columns: &[ColumnProfile],
    ) -> Result<Vec<Correlation>, ProfilerError> {
        let numeric_names: Vec<&str> = columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Numeric)
            .take(self.config.max_correlation_columns)
            .map(|c| c.name.as_str())
            .collect();
        let mut found = Vec::new();
        for (i, left) in numeric_names.iter().enumerate() {
            for right in numeric_names.iter().skip(i + 1) {
                let left_values = numeric_column_values(df, left)?;
                let right_values = numeric_column_values(df, right)?;
                let pairs: Vec<(f64, f64)> = left_values
                    .iter()
                    .zip(right_values.iter())
                    .filter_map(|(l, r)| l.zip(*r))
                    .collect();
                if let Some(coefficient) = pearson(&pairs) {
                    if coefficient.abs() >= self.config.min_correlation {
                        found.push(Correlation {
                            left: left.to_string(),
                            right: right.to_string(),
                            coefficient,
                        });
                    }
                }
            }
        }
        found.sort_by(|a, b| {
            b.coefficient
                .abs()
                .partial_cmp(&a.coefficient.abs())
                .unwrap_or(Ordering::Equal)
        });
        Ok(found)
    }

    fn leading_group(&self, relation: &Relation, profile: &TableProfile) -> Option<LeadingGroup> {
        let group = profile.first_low_cardinality_categorical()?;
        let value = profile.first_numeric()?;
        let series =
            aggregator::aggregate(relation, ChartKind::Bar, &group.name, Some(value.name.as_str()))
                .ok()?;
        let ChartSeries::Grouped { labels, values } = series else {
            return None;
        };
        let (leader_idx, leader_total) = values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
            .map(|(idx, total)| (idx, *total))?;
        let runner_up = values
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != leader_idx)
            .map(|(_, total)| *total)
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let lead_percent = runner_up.and_then(|runner| {
            (runner > 0.0).then(|| (leader_total - runner) / runner * 100.0)
        });
        Some(LeadingGroup {
            group_column: group.name.clone(),
            value_column: value.name.clone(),
            leader: labels.get(leader_idx)?.clone(),
            total: leader_total,
            lead_percent,
        })
    }

    fn variability(&self, profile: &TableProfile) -> Vec<Variability> {
        let mut entries: Vec<Variability> = profile
            .numeric_columns()
            .filter_map(|column| {
                let stats = column.numeric_stats.as_ref()?;
                let mean = stats.mean?;
                let std = stats.std?;
                if mean.abs() < f64::EPSILON {
                    return None;
                }
                Some(Variability {
                    column: column.name.clone(),
                    coefficient_of_variation: std / mean.abs(),
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            b.coefficient_of_variation
                .partial_cmp(&a.coefficient_of_variation)
                .unwrap_or(Ordering::Equal)
        });
        entries
    }
}

fn numeric_column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, ProfilerError> {
    let column = df.column(name)?;
    let as_float = column.cast(&polars::prelude::DataType::Float64)?;
    let series = as_float.as_series().ok_or_else(|| {
        ProfilerError::Parsing(format!("column '{name}' holds no series"))
    })?;
    Ok(series.f64()?.into_iter().collect())
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 3 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom < f64::EPSILON {
        return None;
    }
    Some(cov / denom)
}

fn parse_datetime(value: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
        return Some(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, format) {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

fn anyvalue_to_json(value: &AnyValue) -> serde_json::Value {
    use serde_json::Value;
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String((*s).to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(v) => Value::from(*v),
        AnyValue::Int16(v) => Value::from(*v),
        AnyValue::Int32(v) => Value::from(*v),
        AnyValue::Int64(v) => Value::from(*v),
        AnyValue::UInt8(v) => Value::from(*v),
        AnyValue::UInt16(v) => Value::from(*v),
        AnyValue::UInt32(v) => Value::from(*v),
        AnyValue::UInt64(v) => Value::from(*v),
        AnyValue::Float32(v) => serde_json::Number::from_f64(f64::from(*v))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AnyValue::Float64(v) => serde_json::Number::from_f64(*v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        other => Value::String(format!("{other}")),
    }
}
