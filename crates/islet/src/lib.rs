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

pub mod aggregator;
pub mod data_profiler;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod prompt;
pub mod session;
pub mod suggestions;

pub use aggregator::{aggregate, aggregate_request, ChartRequest, ChartSeries, Point};
pub use data_profiler::{
    ColumnProfile, ColumnType, DataProfiler, NumericStats, ProfilingConfig, TableProfile,
};
pub use error::{AggregationError, IngestError, InsightError, Result, SessionError};
pub use ingest::Relation;
pub use llm::{GeminiClient, LLMAdapter, ScriptedAdapter};
pub use prompt::{InsightPromptBuilder, INSIGHT_TEMPLATE};
pub use session::SessionStore;
pub use suggestions::{
    ChartKind, ChartParameters, ChartSuggestion, SuggestionSet, SuggestionSource, SUGGESTION_COUNT,
};

use llm_contracts::LLMRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub filename: String,
    pub row_count: usize,
    pub column_names: Vec<String>,
    pub suggestions: Vec<ChartSuggestion>,
    pub suggestion_source: SuggestionSource,
}

pub struct InsightEngine {
    profiler: DataProfiler,
    prompt_builder: InsightPromptBuilder,
    adapter: Arc<dyn LLMAdapter>,
    sessions: SessionStore,
    model_timeout: Duration,
}

impl InsightEngine {
    pub fn new(adapter: Arc<dyn LLMAdapter>) -> Self {
        Self {
            profiler: DataProfiler::new(),
            prompt_builder: InsightPromptBuilder::new(),
            adapter,
            sessions: SessionStore::new(),
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
        }
    }

    pub fn with_profiling_config(mut self, config: ProfilingConfig) -> Self {
        self.profiler = DataProfiler::with_config(config);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub async fn analyse_upload(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<(Uuid, UploadSummary)> {
        let relation = Relation::from_bytes(bytes, filename)?;
        let profile = self.profiler.profile(&relation)?;
        let set = self.suggest(&profile).await;
        let summary = UploadSummary {
            filename: relation.filename().to_string(),
            row_count: relation.row_count(),
            column_names: relation.column_names(),
            suggestions: set.suggestions,
            suggestion_source: set.source,
        };
        let session = self.sessions.open(relation);
        info!(
            %session,
            filename = %summary.filename,
            rows = summary.row_count,
            suggestions = summary.suggestions.len(),
            source = ?summary.suggestion_source,
            "analysed upload"
        );
        Ok((session, summary))
    }

    pub async fn suggest(&self, profile: &TableProfile) -> SuggestionSet {
        let prompt = self.prompt_builder.build(profile);
        let request = LLMRequest::new(prompt);
        match tokio::time::timeout(self.model_timeout, self.adapter.generate_response(request))
            .await
        {
            Ok(Ok(response)) => suggestions::parse_and_validate(&response.content, profile),
            Ok(Err(error)) => {
                warn!(%error, "model call failed, serving fallback suggestions");
                suggestions::fallback_set(profile)
            }
            Err(_) => {
                warn!(
                    timeout_seconds = self.model_timeout.as_secs(),
                    "model call timed out, serving fallback suggestions"
                );
                suggestions::fallback_set(profile)
            }
        }
    }

    pub fn chart_data(&self, session: &Uuid, request: &ChartRequest) -> Result<ChartSeries> {
        let relation = self
            .sessions
            .relation(session)
            .ok_or(SessionError::NotFound { session: *session })?;
        Ok(aggregator::aggregate_request(&relation, request)?)
    }

    pub fn end_session(&self, session: &Uuid) -> bool {
        self.sessions.end(session)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}
