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

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),
    #[error("Profiling error: {0}")]
    Profile(#[from] crate::data_profiler::ProfilerError),
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Model error: {0}")]
    Model(#[from] llm_contracts::LLMError),
    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unsupported file format '{extension}': expected csv, xlsx or xls")]
    UnsupportedFormat { extension: String },
    #[error("Failed to parse '{filename}': {reason}")]
    Parse { filename: String, reason: String },
    #[error("Uploaded table contains no data rows")]
    EmptyTable,
}

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Column '{column}' not found in dataset")]
    UnknownColumn { column: String },
    #[error("Column '{column}' has an incompatible type: {details}")]
    IncompatibleType { column: String, details: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session '{session}' not found or already ended")]
    NotFound { session: Uuid },
}

pub type Result<T> = std::result::Result<T, InsightError>;

impl InsightError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            InsightError::Ingest(IngestError::UnsupportedFormat { .. })
                | InsightError::Ingest(IngestError::EmptyTable)
                | InsightError::Aggregation(_)
                | InsightError::Session(_)
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            InsightError::Ingest(_) => "Ingest",
            InsightError::Profile(_) => "Profile",
            InsightError::Aggregation(_) => "Aggregation",
            InsightError::Session(_) => "Session",
            InsightError::Model(_) => "Model",
            InsightError::Serialisation(_) => "Serialisation",
            InsightError::Io(_) => "I/O",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            InsightError::Ingest(IngestError::UnsupportedFormat { extension }) => {
                format!("Files of type '{extension}' are not supported. Please upload a CSV or Excel file.")
            }
            InsightError::Ingest(IngestError::EmptyTable) => {
                "The uploaded file contains no data rows. Please upload a file with at least one row.".to_string()
            }
            InsightError::Session(SessionError::NotFound { .. }) => {
                "This analysis session has expired. Please upload your file again.".to_string()
            }
            InsightError::Aggregation(AggregationError::UnknownColumn { column }) => {
                format!("The column '{column}' does not exist in the uploaded dataset.")
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_names_the_extension() {
        let err = InsightError::from(IngestError::UnsupportedFormat {
            extension: "pdf".to_string(),
        });
        assert!(err.to_string().contains("pdf"));
        assert_eq!(err.category(), "Ingest");
        assert!(err.user_message().contains("CSV or Excel"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn parse_failures_are_not_recoverable() {
        let err = InsightError::from(IngestError::Parse {
            filename: "data.csv".to_string(),
            reason: "ragged row".to_string(),
        });
        assert!(!err.is_recoverable());
    }

    #[test]
    fn unknown_column_user_message_names_the_column() {
        let err = InsightError::from(AggregationError::UnknownColumn {
            column: "revenue".to_string(),
        });
        assert!(err.user_message().contains("revenue"));
    }

    #[test]
    fn session_not_found_is_categorised() {
        let err = InsightError::from(SessionError::NotFound {
            session: Uuid::new_v4(),
        });
        assert_eq!(err.category(), "Session");
    }
}
