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

use crate::data_profiler::{ColumnProfile, ColumnType, TableProfile};
use crate::suggestions::SUGGESTION_COUNT;
use tracing::warn;

pub const INSIGHT_TEMPLATE: &str = r#"You are a senior data analyst. A user has uploaded a dataset and needs chart recommendations that surface its most decision-relevant patterns.

DATASET:
{{dataset_block}}

PRELIMINARY FINDINGS:
{{findings_block}}

SAMPLE ROWS (first {{sample_count}}):
{{sample_block}}

Propose exactly {{suggestion_count}} charts. Respond with a JSON array of exactly {{suggestion_count}} objects and nothing else, each shaped as:
[
  {
    "title": "(string) short chart heading",
    "chart_type": "(string) one of: bar, line, area, pie, scatter",
    "insight": "(string) one or two sentences on what the chart reveals",
    "parameters": {"x": "(string) column name", "y": "(string) column name, omitted for row counts"}
  }
]

Rules:
- Reference only these columns, spelled exactly as listed: {{column_manifest}}
- A scatter chart requires both "x" and "y" to be numeric columns.
- For a chart that counts rows per category, omit "y" entirely.
- Never invent column names or chart types outside the list above."#;

#[derive(Debug, Clone)]
pub struct InsightPromptBuilder {
    template: String,
    suggestion_count: usize,
}

impl Default for InsightPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightPromptBuilder {
    pub fn new() -> Self {
        Self {
            template: INSIGHT_TEMPLATE.to_string(),
            suggestion_count: SUGGESTION_COUNT,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn build(&self, profile: &TableProfile) -> String {
        let context = [
            ("dataset_block", dataset_block(profile)),
            ("findings_block", findings_block(profile)),
            ("sample_block", sample_block(profile)),
            ("sample_count", profile.sample_rows.len().to_string()),
            ("column_manifest", profile.column_names().join(", ")),
            ("suggestion_count", self.suggestion_count.to_string()),
        ];
        let mut result = self.template.clone();
        for (key, value) in context {
            let placeholder = format!("{{{{{key}}}}}");
            result = result.replace(&placeholder, &value);
        }
        if result.contains("{{") && result.contains("}}") {
            warn!("prompt template contains unsubstituted placeholders");
        }
        result
    }
}

fn dataset_block(profile: &TableProfile) -> String {
    let mut lines = vec![format!(
        "{} ({} rows, {} columns)",
        profile.filename,
        profile.row_count,
        profile.columns.len()
    )];
    for column in &profile.columns {
        lines.push(column_line(column));
    }
    lines.join("\n")
}

fn column_line(column: &ColumnProfile) -> String {
    let mut line = match column.column_type {
        ColumnType::Numeric => {
            if let Some(stats) = &column.numeric_stats {
                format!(
                    "- {} (numeric): count={}, mean={}, median={}, std={}, min={}, q25={}, q75={}, max={}",
                    column.name,
                    stats.count,
                    fmt_stat(stats.mean),
                    fmt_stat(stats.median),
                    fmt_stat(stats.std),
                    fmt_stat(stats.min),
                    fmt_stat(stats.q25),
                    fmt_stat(stats.q75),
                    fmt_stat(stats.max),
                )
            } else {
                format!("- {} (numeric)", column.name)
            }
        }
        ColumnType::Temporal => {
            if let Some(range) = &column.temporal_range {
                format!(
                    "- {} (temporal): {} to {}",
                    column.name,
                    range.min.as_deref().unwrap_or("?"),
                    range.max.as_deref().unwrap_or("?"),
                )
            } else {
                format!("- {} (temporal)", column.name)
            }
        }
        ColumnType::Categorical => {
            if let Some(values) = &column.distinct_values {
                format!(
                    "- {} (categorical): {} distinct values ({})",
                    column.name,
                    column.cardinality,
                    values.join(", ")
                )
            } else {
                format!(
                    "- {} (categorical): {} distinct values",
                    column.name, column.cardinality
                )
            }
        }
    };
    if column.null_count > 0 {
        line.push_str(&format!(", {} nulls", column.null_count));
    }
    line
}

fn findings_block(profile: &TableProfile) -> String {
    let mut lines = Vec::new();
    for corr in &profile.correlations {
        let strength = if corr.coefficient.abs() >= 0.7 {
            "Strong"
        } else {
            "Moderate"
        };
        lines.push(format!(
            "- {} correlation between {} and {} (r={:.2}).",
            strength, corr.left, corr.right, corr.coefficient
        ));
    }
    if let Some(leading) = &profile.leading_group {
        let mut line = format!(
            "- '{}' leads {} by total {} ({:.2})",
            leading.leader, leading.group_column, leading.value_column, leading.total
        );
        if let Some(lead) = leading.lead_percent {
            line.push_str(&format!(", {lead:.1}% ahead of the next group"));
        }
        line.push('.');
        lines.push(line);
    }
    for entry in profile
        .variability
        .iter()
        .filter(|v| v.coefficient_of_variation > 0.3)
        .take(2)
    {
        lines.push(format!(
            "- {} shows high variability (coefficient of variation {:.2}).",
            entry.column, entry.coefficient_of_variation
        ));
    }
    if lines.is_empty() {
        lines.push("- No strong statistical patterns detected.".to_string());
    }
    lines.join("\n")
}

fn sample_block(profile: &TableProfile) -> String {
    profile
        .sample_rows
        .iter()
        .map(|row| serde_json::to_string(row).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

fn fmt_stat(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_profiler::DataProfiler;
    use crate::ingest::Relation;

    fn sample_profile() -> TableProfile {
        let bytes = b"region,sales\nNorth,10\nSouth,20\nNorth,5\nEast,7\n";
        let relation = Relation::from_bytes(bytes, "sales.csv").unwrap();
        DataProfiler::new().profile(&relation).unwrap()
    }

    #[test]
    fn building_twice_yields_identical_prompts() {
        let profile = sample_profile();
        let builder = InsightPromptBuilder::new();
        assert_eq!(builder.build(&profile), builder.build(&profile));
    }

    #[test]
    fn prompt_carries_columns_stats_and_instructions() {
        let prompt = InsightPromptBuilder::new().build(&sample_profile());
        assert!(prompt.contains("senior data analyst"));
        assert!(prompt.contains("sales.csv (4 rows, 2 columns)"));
        assert!(prompt.contains("- region (categorical): 3 distinct values (North, South, East)"));
        assert!(prompt.contains("mean=10.50"));
        assert!(prompt.contains("Propose exactly 4 charts"));
        assert!(prompt.contains("Reference only these columns, spelled exactly as listed: region, sales"));
    }

    #[test]
    fn prompt_reports_the_leading_group_finding() {
        let prompt = InsightPromptBuilder::new().build(&sample_profile());
        assert!(prompt.contains("'South' leads region by total sales"));
    }

    #[test]
    fn prompt_includes_bounded_sample_rows() {
        let profile = sample_profile();
        let prompt = InsightPromptBuilder::new().build(&profile);
        assert!(prompt.contains("SAMPLE ROWS (first 3):"));
        assert!(prompt.contains(r#"{"region":"North","sales":10}"#));
    }

    #[test]
    fn no_placeholders_survive_substitution() {
        let prompt = InsightPromptBuilder::new().build(&sample_profile());
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn quiet_tables_report_no_patterns() {
        let bytes = b"v\n10\n11\n10\n";
        let relation = Relation::from_bytes(bytes, "quiet.csv").unwrap();
        let profile = DataProfiler::new().profile(&relation).unwrap();
        let prompt = InsightPromptBuilder::new().build(&profile);
        assert!(prompt.contains("No strong statistical patterns detected."));
    }

    #[test]
    fn custom_templates_are_substituted() {
        let prompt = InsightPromptBuilder::new()
            .with_template("COLUMNS: {{column_manifest}}")
            .build(&sample_profile());
        assert_eq!(prompt, "COLUMNS: region, sales");
    }
}
