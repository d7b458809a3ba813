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

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use islet::{
    ChartKind, ChartRequest, GeminiClient, InsightEngine, LLMAdapter, ScriptedAdapter,
    UploadSummary,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();

    let matches = Command::new("islet-insight-demo")
        .version("1.0.0")
        .author("Thinking Systems Project")
        .about("Profiles a tabular file, proposes charts and prints chart-ready series")
        .arg(
            Arg::new("file")
                .value_name("FILE")
                .help("CSV or Excel file to analyse")
                .required(true),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .action(clap::ArgAction::SetTrue)
                .help("Skip the Gemini call and serve deterministic fallback suggestions"),
        )
        .arg(
            Arg::new("chart")
                .long("chart")
                .value_name("KIND")
                .help("Chart type to aggregate (bar, line, area, pie, scatter)")
                .required(false),
        )
        .arg(
            Arg::new("x")
                .long("x")
                .value_name("COLUMN")
                .help("X axis column for --chart")
                .required(false),
        )
        .arg(
            Arg::new("y")
                .long("y")
                .value_name("COLUMN")
                .help("Optional numeric y axis column for --chart")
                .required(false),
        )
        .get_matches();

    let path = PathBuf::from(matches.get_one::<String>("file").unwrap());
    let offline = matches.get_flag("offline");

    let bytes =
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.csv")
        .to_string();

    let adapter: Arc<dyn LLMAdapter> = if offline {
        info!("Offline mode: fallback suggestions only");
        Arc::new(ScriptedAdapter::default())
    } else {
        match GeminiClient::from_env() {
            Ok(client) => {
                info!("Using Gemini model {} for chart suggestions", client.model());
                Arc::new(client)
            }
            Err(e) => {
                warn!("Gemini unavailable ({}), serving fallback suggestions", e);
                Arc::new(ScriptedAdapter::default())
            }
        }
    };

    let engine = InsightEngine::new(adapter);

    let (session, summary) = engine.analyse_upload(&bytes, &filename).await?;

    info!(
        "Analysed {} ({} rows, {} columns, suggestions from {:?})",
        summary.filename,
        summary.row_count,
        summary.column_names.len(),
        summary.suggestion_source
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let Some(request) = chart_request(&matches, &summary)? else {
        warn!("No chart suggestions produced, nothing to aggregate");
        engine.end_session(&session);
        return Ok(());
    };

    info!(
        "Aggregating {} chart over x={} y={:?}",
        request.chart_type, request.x, request.y
    );
    match engine.chart_data(&session, &request) {
        Ok(series) => {
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
        Err(e) => {
            error!("Aggregation failed: {}", e);
        }
    }

    engine.end_session(&session);
    info!("Session {} closed", session);
    Ok(())
}

fn chart_request(matches: &ArgMatches, summary: &UploadSummary) -> Result<Option<ChartRequest>> {
    if let Some(kind_name) = matches.get_one::<String>("chart") {
        let chart_type = ChartKind::from_name(kind_name)
            .ok_or_else(|| anyhow::anyhow!("unknown chart type: {kind_name}"))?;
        let x = matches
            .get_one::<String>("x")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("--chart requires --x"))?;
        let y = matches.get_one::<String>("y").cloned();
        return Ok(Some(ChartRequest { chart_type, x, y }));
    }

    Ok(summary.suggestions.first().map(|first| {
        info!("Using first suggestion: {}", first.title);
        ChartRequest {
            chart_type: first.chart_type,
            x: first.parameters.x.clone(),
            y: first.parameters.y.clone(),
        }
    }))
}
