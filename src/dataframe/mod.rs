//! Dataset bindings: schema, materialized rows, lazy connectors, file loading.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single column: name plus declared dtype ("int64", "float64", "bool",
/// "object").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: String,
}

/// Materialized tabular values, row-major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl TableData {
    pub fn head(&self, n: usize) -> TableData {
        TableData {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Lazy source for a dataset too large (or too remote) to materialize.
///
/// Only the head sample and schema are ever pulled into a prompt; full query
/// execution stays on the connector side.
pub trait DatasetConnector: Send + Sync {
    fn row_count(&self) -> Result<usize>;
    fn head(&self, n: usize) -> Result<TableData>;
    fn schema(&self) -> Result<Vec<Column>>;
    fn execute_query(&self, sql: &str) -> Result<TableData>;
}

enum Source {
    Materialized(TableData),
    Connector(Box<dyn DatasetConnector>),
}

/// One bound dataset: name, optional description, and its rows or connector.
///
/// Immutable for the duration of a chat turn.
pub struct DataFrame {
    pub name: String,
    pub description: Option<String>,
    source: Source,
}

impl std::fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            Source::Materialized(_) => "Materialized",
            Source::Connector(_) => "Connector",
        };
        f.debug_struct("DataFrame")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("source", &source)
            .finish()
    }
}

impl DataFrame {
    pub fn new(name: impl Into<String>, data: TableData) -> Self {
        Self { name: name.into(), description: None, source: Source::Materialized(data) }
    }

    pub fn from_connector(name: impl Into<String>, connector: Box<dyn DatasetConnector>) -> Self {
        Self { name: name.into(), description: None, source: Source::Connector(connector) }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn schema(&self) -> Result<Vec<Column>> {
        match &self.source {
            Source::Materialized(t) => Ok(t.columns.clone()),
            Source::Connector(c) => c.schema(),
        }
    }

    pub fn rows_count(&self) -> Result<usize> {
        match &self.source {
            Source::Materialized(t) => Ok(t.rows.len()),
            Source::Connector(c) => c.row_count(),
        }
    }

    pub fn columns_count(&self) -> Result<usize> {
        Ok(self.schema()?.len())
    }

    /// Bounded sample of leading rows.
    pub fn head(&self, n: usize) -> Result<TableData> {
        match &self.source {
            Source::Materialized(t) => Ok(t.head(n)),
            Source::Connector(c) => c.head(n),
        }
    }

    /// The rows handed to the execution harness: everything for materialized
    /// frames, a bounded head for connector-backed ones.
    pub fn execution_rows(&self) -> Result<TableData> {
        match &self.source {
            Source::Materialized(t) => Ok(t.clone()),
            Source::Connector(c) => c.head(100),
        }
    }

    /// Digest of the ordered column names; part of the cache fingerprint.
    pub fn column_hash(&self) -> Result<String> {
        let names = self.schema()?.iter().map(|c| c.name.clone()).collect::<Vec<_>>().join(",");
        Ok(format!("{:x}", md5::compute(names.as_bytes())))
    }

    /// Load from a file, dispatching on extension (.csv or .json records).
    pub fn from_file(path: &str) -> Result<Self> {
        let stem = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".into());
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        if path.ends_with(".csv") {
            Ok(Self::new(stem, parse_csv(&text)?))
        } else if path.ends_with(".json") {
            Ok(Self::new(stem, parse_json_records(&text)?))
        } else {
            bail!("unsupported dataset file: {} (expected .csv or .json)", path)
        }
    }
}

/// Minimal CSV reader: header row, double-quote escaping, dtype inference
/// from the first data row.
fn parse_csv(text: &str) -> Result<TableData> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().context("empty csv input")?;
    let names = split_csv_line(header);

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for line in lines {
        let fields = split_csv_line(line);
        if fields.len() != names.len() {
            bail!("csv row has {} fields, header has {}", fields.len(), names.len());
        }
        rows.push(fields.iter().map(|f| infer_value(f)).collect());
    }

    let columns = names
        .iter()
        .enumerate()
        .map(|(i, name)| Column {
            name: name.clone(),
            dtype: rows
                .first()
                .map(|r| dtype_of(&r[i]).to_string())
                .unwrap_or_else(|| "object".into()),
        })
        .collect();

    Ok(TableData { columns, rows })
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn infer_value(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = field.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        return Value::from(f);
    }
    match field {
        "true" | "True" => Value::from(true),
        "false" | "False" => Value::from(false),
        _ => Value::from(field.to_string()),
    }
}

pub(crate) fn dtype_of(v: &Value) -> &'static str {
    match v {
        Value::Number(n) if n.is_i64() || n.is_u64() => "int64",
        Value::Number(_) => "float64",
        Value::Bool(_) => "bool",
        _ => "object",
    }
}

/// JSON records form: `[{"col": value, ...}, ...]`. Columns are taken from
/// the first record, in map iteration order.
fn parse_json_records(text: &str) -> Result<TableData> {
    let records: Vec<serde_json::Map<String, Value>> =
        serde_json::from_str(text).context("parsing json records")?;
    let first = records.first().context("empty json records input")?;
    let names: Vec<String> = first.keys().cloned().collect();

    let mut rows = Vec::with_capacity(records.len());
    for rec in &records {
        rows.push(
            names
                .iter()
                .map(|n| rec.get(n).cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>(),
        );
    }

    let columns = names
        .iter()
        .enumerate()
        .map(|(i, name)| Column {
            name: name.clone(),
            dtype: rows
                .first()
                .map(|r| dtype_of(&r[i]).to_string())
                .unwrap_or_else(|| "object".into()),
        })
        .collect();

    Ok(TableData { columns, rows })
}

/// Build a TableData from named columns of equal length. Convenience for
/// embedders and tests.
pub fn table_from_columns(cols: Vec<(&str, Vec<Value>)>) -> TableData {
    let len = cols.first().map(|(_, v)| v.len()).unwrap_or(0);
    let columns = cols
        .iter()
        .map(|(name, values)| Column {
            name: name.to_string(),
            dtype: values.first().map(dtype_of).unwrap_or("object").to_string(),
        })
        .collect();
    let mut rows = Vec::with_capacity(len);
    for i in 0..len {
        rows.push(cols.iter().map(|(_, v)| v[i].clone()).collect());
    }
    TableData { columns, rows }
}
