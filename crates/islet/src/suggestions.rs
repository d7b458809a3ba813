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

use crate::data_profiler::TableProfile;
use crate::llm::utils::extract_json_from_text;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const SUGGESTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Area,
    Pie,
    Scatter,
}

impl ChartKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "area" => Some(ChartKind::Area),
            "pie" => Some(ChartKind::Pie),
            "scatter" => Some(ChartKind::Scatter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Area => "area",
            ChartKind::Pie => "pie",
            ChartKind::Scatter => "scatter",
        }
    }

    pub fn is_grouped(&self) -> bool {
        !matches!(self, ChartKind::Scatter)
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartParameters {
    pub x: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSuggestion {
    pub title: String,
    pub chart_type: ChartKind,
    pub insight: String,
    pub parameters: ChartParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionSet {
    pub suggestions: Vec<ChartSuggestion>,
    pub source: SuggestionSource,
}

pub fn parse_and_validate(raw: &str, profile: &TableProfile) -> SuggestionSet {
    let Some(candidates) = extract_candidates(raw) else {
        warn!("model response carried no parseable JSON, using fallback suggestions");
        return fallback_set(profile);
    };
    let mut validated = Vec::new();
    for candidate in &candidates {
        match validate_candidate(candidate, profile) {
            Ok(suggestion) => validated.push(suggestion),
            Err(reason) => debug!(%reason, "dropping model suggestion"),
        }
    }
    if validated.is_empty() {
        warn!(
            candidates = candidates.len(),
            "no model suggestion survived validation, using fallback suggestions"
        );
        return fallback_set(profile);
    }
    validated.truncate(SUGGESTION_COUNT);
    SuggestionSet {
        suggestions: validated,
        source: SuggestionSource::Model,
    }
}

pub fn fallback_set(profile: &TableProfile) -> SuggestionSet {
    SuggestionSet {
        suggestions: fallback_suggestions(profile),
        source: SuggestionSource::Fallback,
    }
}

fn extract_candidates(raw: &str) -> Option<Vec<Value>> {
    let value = extract_json_from_text(raw)?;
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            for key in ["suggestions", "charts"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    return Some(items.clone());
                }
            }
            Some(vec![Value::Object(map)])
        }
        _ => None,
    }
}

fn validate_candidate(candidate: &Value, profile: &TableProfile) -> Result<ChartSuggestion, String> {
    let record = candidate
        .as_object()
        .ok_or_else(|| "candidate is not a JSON object".to_string())?;
    let title = record
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing title".to_string())?;
    let chart_type_raw = record
        .get("chart_type")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing chart_type".to_string())?;
    let chart_type = ChartKind::from_name(chart_type_raw)
        .ok_or_else(|| format!("unknown chart type '{chart_type_raw}'"))?;
    let insight = record
        .get("insight")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let parameters = record
        .get("parameters")
        .and_then(Value::as_object)
        .ok_or_else(|| "missing parameters".to_string())?;
    let x = parameters
        .get("x")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing parameters.x".to_string())?;
    if !profile.has_column(x) {
        return Err(format!("unknown column '{x}' in parameters.x"));
    }
    let y = match parameters.get("y") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => {
            if !profile.has_column(name) {
                return Err(format!("unknown column '{name}' in parameters.y"));
            }
            Some(name.clone())
        }
        Some(_) => return Err("parameters.y is not a string".to_string()),
    };
    Ok(ChartSuggestion {
        title: title.to_string(),
        chart_type,
        insight,
        parameters: ChartParameters {
            x: x.to_string(),
            y,
        },
    })
}

fn fallback_suggestions(profile: &TableProfile) -> Vec<ChartSuggestion> {
    let mut suggestions = Vec::new();
    if let Some(bar) = leading_group_bar(profile) {
        suggestions.push(bar);
    }
    if let Some(scatter) = correlation_scatter(profile) {
        suggestions.push(scatter);
    }
    if let Some(area) = variability_area(profile) {
        suggestions.push(area);
    }
    if let Some(line) = trend_line(profile) {
        suggestions.push(line);
    }
    if suggestions.is_empty() {
        if let Some(first) = profile.columns.first() {
            suggestions.push(ChartSuggestion {
                title: format!("Row count by {}", first.name),
                chart_type: ChartKind::Bar,
                insight: format!("Distribution of rows across {} values.", first.name),
                parameters: ChartParameters {
                    x: first.name.clone(),
                    y: None,
                },
            });
        }
    }
    suggestions.truncate(SUGGESTION_COUNT);
    suggestions
}

fn leading_group_bar(profile: &TableProfile) -> Option<ChartSuggestion> {
    if let Some(leading) = &profile.leading_group {
        let mut insight = format!(
            "'{}' leads with a total {} of {:.2}",
            leading.leader, leading.value_column, leading.total
        );
        if let Some(lead) = leading.lead_percent {
            insight.push_str(&format!(", {lead:.1}% ahead of the next group"));
        }
        insight.push('.');
        return Some(ChartSuggestion {
            title: format!("Total {} by {}", leading.value_column, leading.group_column),
            chart_type: ChartKind::Bar,
            insight,
            parameters: ChartParameters {
                x: leading.group_column.clone(),
                y: Some(leading.value_column.clone()),
            },
        });
    }
    if let (Some(category), Some(value)) = (profile.first_categorical(), profile.first_numeric()) {
        return Some(ChartSuggestion {
            title: format!("Total {} by {}", value.name, category.name),
            chart_type: ChartKind::Bar,
            insight: format!("Compares total {} across {} groups.", value.name, category.name),
            parameters: ChartParameters {
                x: category.name.clone(),
                y: Some(value.name.clone()),
            },
        });
    }
    if let Some(category) = profile.first_categorical() {
        return Some(ChartSuggestion {
            title: format!("Row count by {}", category.name),
            chart_type: ChartKind::Bar,
            insight: format!("Shows how rows are distributed across {} values.", category.name),
            parameters: ChartParameters {
                x: category.name.clone(),
                y: None,
            },
        });
    }
    let mut numerics = profile.numeric_columns();
    let first = numerics.next()?;
    let second = numerics.next()?;
    Some(ChartSuggestion {
        title: format!("{} by {}", second.name, first.name),
        chart_type: ChartKind::Bar,
        insight: format!("Totals {} for each distinct {} value.", second.name, first.name),
        parameters: ChartParameters {
            x: first.name.clone(),
            y: Some(second.name.clone()),
        },
    })
}

fn correlation_scatter(profile: &TableProfile) -> Option<ChartSuggestion> {
    let corr = profile.correlations.first()?;
    let strength = if corr.coefficient.abs() >= 0.7 {
        "strongly"
    } else {
        "moderately"
    };
    let direction = if corr.coefficient >= 0.0 {
        "together"
    } else {
        "in opposite directions"
    };
    Some(ChartSuggestion {
        title: format!("{} vs {}", corr.left, corr.right),
        chart_type: ChartKind::Scatter,
        insight: format!(
            "{} and {} move {strength} {direction} (r={:.2}).",
            corr.left, corr.right, corr.coefficient
        ),
        parameters: ChartParameters {
            x: corr.left.clone(),
            y: Some(corr.right.clone()),
        },
    })
}

fn variability_area(profile: &TableProfile) -> Option<ChartSuggestion> {
    let spread = profile
        .variability
        .iter()
        .find(|v| v.coefficient_of_variation > 0.3)?;
    let axis = profile
        .first_temporal()
        .or_else(|| profile.first_low_cardinality_categorical())?;
    Some(ChartSuggestion {
        title: format!("{} across {}", spread.column, axis.name),
        chart_type: ChartKind::Area,
        insight: format!(
            "{} swings widely (coefficient of variation {:.2}); this view shows where the peaks sit.",
            spread.column, spread.coefficient_of_variation
        ),
        parameters: ChartParameters {
            x: axis.name.clone(),
            y: Some(spread.column.clone()),
        },
    })
}

fn trend_line(profile: &TableProfile) -> Option<ChartSuggestion> {
    if let (Some(axis), Some(value)) = (profile.first_temporal(), profile.first_numeric()) {
        return Some(ChartSuggestion {
            title: format!("{} over {}", value.name, axis.name),
            chart_type: ChartKind::Line,
            insight: format!("Tracks how {} develops over {}.", value.name, axis.name),
            parameters: ChartParameters {
                x: axis.name.clone(),
                y: Some(value.name.clone()),
            },
        });
    }
    let category = profile.first_categorical()?;
    let mut numerics = profile.numeric_columns();
    let _first = numerics.next()?;
    let second = numerics.next()?;
    Some(ChartSuggestion {
        title: format!("{} across {}", second.name, category.name),
        chart_type: ChartKind::Line,
        insight: format!("Compares total {} across {} groups.", second.name, category.name),
        parameters: ChartParameters {
            x: category.name.clone(),
            y: Some(second.name.clone()),
        },
    })
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

    fn assert_grounded(set: &SuggestionSet, profile: &TableProfile) {
        for suggestion in &set.suggestions {
            assert!(profile.has_column(&suggestion.parameters.x));
            if let Some(y) = &suggestion.parameters.y {
                assert!(profile.has_column(y));
            }
        }
    }

    #[test]
    fn accepts_a_valid_model_response() {
        let raw = r#"[
            {"title": "Sales by region", "chart_type": "bar", "insight": "South leads.",
             "parameters": {"x": "region", "y": "sales"}},
            {"title": "Region mix", "chart_type": "pie", "insight": "Counts per region.",
             "parameters": {"x": "region"}}
        ]"#;
        let set = parse_and_validate(raw, &sample_profile());
        assert_eq!(set.source, SuggestionSource::Model);
        assert_eq!(set.suggestions.len(), 2);
        assert_eq!(set.suggestions[0].chart_type, ChartKind::Bar);
        assert_eq!(set.suggestions[1].parameters.y, None);
    }

    #[test]
    fn accepts_json_wrapped_in_prose_and_fences() {
        let raw = "Here are my picks:\n```json\n[{\"title\": \"T\", \"chart_type\": \"bar\", \"insight\": \"\", \"parameters\": {\"x\": \"region\", \"y\": \"sales\"}}]\n```\nHope that helps!";
        let set = parse_and_validate(raw, &sample_profile());
        assert_eq!(set.source, SuggestionSource::Model);
        assert_eq!(set.suggestions.len(), 1);
    }

    #[test]
    fn drops_invalid_records_individually() {
        let raw = r#"[
            {"title": "Good", "chart_type": "bar", "insight": "", "parameters": {"x": "region", "y": "sales"}},
            {"title": "Bad column", "chart_type": "bar", "insight": "", "parameters": {"x": "profit"}},
            {"title": "Bad kind", "chart_type": "donut", "insight": "", "parameters": {"x": "region"}},
            {"chart_type": "bar", "parameters": {"x": "region"}}
        ]"#;
        let set = parse_and_validate(raw, &sample_profile());
        assert_eq!(set.source, SuggestionSource::Model);
        assert_eq!(set.suggestions.len(), 1);
        assert_eq!(set.suggestions[0].title, "Good");
    }

    #[test]
    fn column_matching_is_case_sensitive() {
        let raw = r#"[{"title": "T", "chart_type": "bar", "insight": "", "parameters": {"x": "Region"}}]"#;
        let profile = sample_profile();
        let set = parse_and_validate(raw, &profile);
        assert_eq!(set.source, SuggestionSource::Fallback);
        assert_grounded(&set, &profile);
    }

    #[test]
    fn non_json_text_falls_back_to_schema_defaults() {
        let profile = sample_profile();
        let set = parse_and_validate("not json", &profile);
        assert_eq!(set.source, SuggestionSource::Fallback);
        assert!(!set.suggestions.is_empty());
        assert_grounded(&set, &profile);
    }

    #[test]
    fn empty_response_falls_back() {
        let profile = sample_profile();
        let set = parse_and_validate("", &profile);
        assert_eq!(set.source, SuggestionSource::Fallback);
        assert!(!set.suggestions.is_empty());
    }

    #[test]
    fn results_are_capped_at_four() {
        let item = r#"{"title": "T", "chart_type": "bar", "insight": "", "parameters": {"x": "region"}}"#;
        let raw = format!("[{}]", vec![item; 6].join(","));
        let set = parse_and_validate(&raw, &sample_profile());
        assert_eq!(set.suggestions.len(), SUGGESTION_COUNT);
    }

    #[test]
    fn object_with_a_suggestions_key_is_unwrapped() {
        let raw = r#"{"suggestions": [{"title": "T", "chart_type": "line", "insight": "", "parameters": {"x": "region", "y": "sales"}}]}"#;
        let set = parse_and_validate(raw, &sample_profile());
        assert_eq!(set.source, SuggestionSource::Model);
        assert_eq!(set.suggestions[0].chart_type, ChartKind::Line);
    }

    #[test]
    fn a_single_object_counts_as_one_candidate() {
        let raw = r#"{"title": "Solo", "chart_type": "pie", "insight": "", "parameters": {"x": "region"}}"#;
        let set = parse_and_validate(raw, &sample_profile());
        assert_eq!(set.source, SuggestionSource::Model);
        assert_eq!(set.suggestions.len(), 1);
    }

    #[test]
    fn null_y_is_treated_as_absent() {
        let raw = r#"[{"title": "T", "chart_type": "bar", "insight": "", "parameters": {"x": "region", "y": null}}]"#;
        let set = parse_and_validate(raw, &sample_profile());
        assert_eq!(set.suggestions[0].parameters.y, None);
    }

    #[test]
    fn fallback_leads_with_the_dominant_group_bar() {
        let profile = sample_profile();
        let set = fallback_set(&profile);
        assert_eq!(set.source, SuggestionSource::Fallback);
        let first = &set.suggestions[0];
        assert_eq!(first.chart_type, ChartKind::Bar);
        assert_eq!(first.parameters.x, "region");
        assert_eq!(first.parameters.y.as_deref(), Some("sales"));
        assert!(first.insight.contains("South"));
        assert_grounded(&set, &profile);
    }

    #[test]
    fn fallback_covers_trend_and_correlation_when_present() {
        let bytes = b"day,region,sales,cost\n2024-01-01,North,10,5\n2024-01-02,South,20,10\n2024-01-03,North,5,3\n2024-01-04,East,7,4\n";
        let relation = Relation::from_bytes(bytes, "daily.csv").unwrap();
        let profile = DataProfiler::new().profile(&relation).unwrap();
        let set = fallback_set(&profile);
        assert_grounded(&set, &profile);
        let kinds: Vec<ChartKind> = set.suggestions.iter().map(|s| s.chart_type).collect();
        assert!(kinds.contains(&ChartKind::Bar));
        assert!(kinds.contains(&ChartKind::Scatter));
        assert!(kinds.contains(&ChartKind::Line));
        assert!(set.suggestions.len() <= SUGGESTION_COUNT);
    }

    #[test]
    fn fallback_on_a_single_numeric_column_counts_rows() {
        let bytes = b"v\n1\n2\n3\n";
        let relation = Relation::from_bytes(bytes, "v.csv").unwrap();
        let profile = DataProfiler::new().profile(&relation).unwrap();
        let set = fallback_set(&profile);
        assert_eq!(set.suggestions.len(), 1);
        assert_eq!(set.suggestions[0].parameters.x, "v");
        assert_eq!(set.suggestions[0].parameters.y, None);
    }

    #[test]
    fn chart_kind_names_are_normalised() {
        assert_eq!(ChartKind::from_name(" Bar "), Some(ChartKind::Bar));
        assert_eq!(ChartKind::from_name("SCATTER"), Some(ChartKind::Scatter));
        assert_eq!(ChartKind::from_name("donut"), None);
    }

    #[test]
    fn grouped_kinds_exclude_scatter() {
        assert!(ChartKind::Bar.is_grouped());
        assert!(ChartKind::Pie.is_grouped());
        assert!(!ChartKind::Scatter.is_grouped());
    }
}
