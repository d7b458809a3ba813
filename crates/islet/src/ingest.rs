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

use crate::error::IngestError;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

#[derive(Debug, Clone)]
pub struct Relation {
    filename: String,
    df: DataFrame,
}

impl Relation {
    pub fn from_bytes(bytes: &[u8], filename: &str) -> Result<Self, IngestError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let df = match extension.as_str() {
            "csv" => read_csv(bytes, filename)?,
            "xlsx" | "xls" => read_spreadsheet(bytes, filename)?,
            _ => return Err(IngestError::UnsupportedFormat { extension }),
        };
        if df.height() == 0 {
            return Err(IngestError::EmptyTable);
        }
        debug!(
            filename,
            rows = df.height(),
            columns = df.width(),
            "loaded relation"
        );
        Ok(Self {
            filename: filename.to_string(),
            df,
        })
    }

    pub fn from_dataframe(df: DataFrame, filename: impl Into<String>) -> Result<Self, IngestError> {
        if df.height() == 0 {
            return Err(IngestError::EmptyTable);
        }
        Ok(Self {
            filename: filename.into(),
            df,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn row_count(&self) -> usize {
        self.df.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.df.column(name).ok()
    }
}

fn read_csv(bytes: &[u8], filename: &str) -> Result<DataFrame, IngestError> {
    let mut df = CsvReader::new(Cursor::new(bytes)).finish().map_err(|e| match e {
        PolarsError::NoData(_) => IngestError::EmptyTable,
        other => IngestError::Parse {
            filename: filename.to_string(),
            reason: other.to_string(),
        },
    })?;
    let tidied = tidy_headers(
        df.get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect(),
    );
    df.set_column_names(tidied).map_err(|e| IngestError::Parse {
        filename: filename.to_string(),
        reason: e.to_string(),
    })?;
    Ok(df)
}

fn read_spreadsheet(bytes: &[u8], filename: &str) -> Result<DataFrame, IngestError> {
    let parse_err = |reason: String| IngestError::Parse {
        filename: filename.to_string(),
        reason,
    };
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| parse_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| parse_err("workbook contains no sheets".to_string()))?
        .map_err(|e| parse_err(e.to_string()))?;
    let mut rows = range.rows();
    let header_row = rows.next().ok_or(IngestError::EmptyTable)?;
    let headers = tidy_headers(
        header_row
            .iter()
            .map(|cell| cell_to_value(cell).unwrap_or_default())
            .collect(),
    );
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (idx, slot) in cells.iter_mut().enumerate() {
            slot.push(row.get(idx).and_then(cell_to_value));
        }
    }
    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::new(name.into(), values))
        .collect::<Vec<_>>();
    DataFrame::new(columns).map_err(|e| parse_err(e.to_string()))
}

fn tidy_headers(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                trimmed.to_string()
            }
        })
        .collect()
}

fn cell_to_value(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => Some(
            dt.as_datetime()
                .map(|naive| naive.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| dt.as_f64().to_string()),
        ),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
    }
}
