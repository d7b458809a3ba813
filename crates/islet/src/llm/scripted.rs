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

use async_trait::async_trait;
use llm_contracts::{LLMAdapter, LLMError, LLMRequest, LLMResponse, LLMResult, Provider};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Deterministic adapter that replays queued responses, for offline runs and tests.
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    replies: Mutex<VecDeque<LLMResult<String>>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(text: impl Into<String>) -> Self {
        let adapter = Self::new();
        adapter.push_reply(text);
        adapter
    }

    pub fn with_failure(error: LLMError) -> Self {
        let adapter = Self::new();
        adapter.push_failure(error);
        adapter
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(text.into()));
        }
    }

    pub fn push_failure(&self, error: LLMError) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(error));
        }
    }
}

#[async_trait]
impl LLMAdapter for ScriptedAdapter {
    async fn generate_response(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
        let next = self
            .replies
            .lock()
            .map_err(|_| LLMError::Internal("scripted reply queue is poisoned".to_string()))?
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(LLMResponse::new(
                request.id,
                text,
                "scripted",
                Provider::Scripted,
            )),
            Some(Err(error)) => Err(error),
            None => Err(LLMError::Internal(
                "scripted adapter has no replies queued".to_string(),
            )),
        }
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}
