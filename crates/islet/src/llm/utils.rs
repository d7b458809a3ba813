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

use serde_json::Value;
use tracing::{debug, warn};

pub fn extract_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        debug!("parsed entire response as JSON");
        return Some(value);
    }
    for (language, block) in fenced_blocks(trimmed) {
        if matches!(language.as_deref(), Some("json") | None) {
            if let Ok(value) = serde_json::from_str::<Value>(&block) {
                debug!("extracted JSON from a fenced code block");
                return Some(value);
            }
        }
    }
    // Arrays first: the suggestion format is a JSON array, and an object-first
    // scan would stop at the first element.
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let Some(slice) = balanced_slice(trimmed, open, close) {
            match serde_json::from_str(slice) {
                Ok(value) => {
                    debug!("extracted a balanced JSON fragment from surrounding prose");
                    return Some(value);
                }
                Err(_) => warn!("found a JSON-shaped fragment that failed to parse"),
            }
        }
    }
    None
}

fn balanced_slice(text: &str, open: char, close: char) -> Option<&str> {
    let mut balance = 0usize;
    let mut start_index = None;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if balance == 0 {
            if ch == open {
                start_index = Some(i);
                balance = 1;
                in_string = false;
                escaped = false;
            }
            continue;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => balance += 1,
            c if c == close && !in_string => {
                balance -= 1;
                if balance == 0 {
                    return Some(&text[start_index?..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn fenced_blocks(text: &str) -> Vec<(Option<String>, String)> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let Some(tag) = line.trim().strip_prefix("```") else {
            continue;
        };
        let language = (!tag.trim().is_empty()).then(|| tag.trim().to_string());
        let mut content = String::new();
        for body_line in lines.by_ref() {
            if body_line.trim().starts_with("```") {
                break;
            }
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(body_line);
        }
        blocks.push((language, content));
    }
    blocks
}
