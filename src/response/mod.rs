//! Typed result parsing: the declared `result` payload becomes one of a
//! closed set of response variants, or the turn fails with `InvalidResult`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::error::ChatError;

/// Tabular result value in headers/rows form.
#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Presentation hook for dataframe results (e.g. save to disk, convert to a
/// wire format). Runs after shape validation, before the result is returned.
pub trait DataframePresenter: Send + Sync {
    fn present(&self, table: &TableView) -> Result<()>;
}

/// The closed set of answer shapes a chat turn can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatResponse {
    Text(String),
    Number(serde_json::Number),
    Table(TableView),
    Chart(PathBuf),
}

impl ChatResponse {
    /// Short human rendering recorded into conversation memory.
    pub fn render(&self) -> String {
        match self {
            ChatResponse::Text(s) => s.clone(),
            ChatResponse::Number(n) => n.to_string(),
            ChatResponse::Table(t) => {
                format!("dataframe {}x{}", t.rows.len(), t.headers.len())
            }
            ChatResponse::Chart(p) => p.display().to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ChatResponse::Text(_) => "string",
            ChatResponse::Number(_) => "number",
            ChatResponse::Table(_) => "dataframe",
            ChatResponse::Chart(_) => "plot",
        }
    }
}

/// Validate the raw execution payload against the `{type, value}` contract.
///
/// This only runs after the engine reported success, so every rejection here
/// is terminal for the turn: the code ran, its declared result is just wrong.
pub fn parse(
    raw: &Value,
    config: &PipelineConfig,
    hook: Option<&dyn DataframePresenter>,
) -> Result<ChatResponse, ChatError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| invalid(format!("expected a mapping, got {}", type_of(raw))))?;
    let tag = obj
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| invalid("missing or non-string `type` field".into()))?;
    let value = obj
        .get("value")
        .ok_or_else(|| invalid("missing `value` field".into()))?;

    match tag {
        "string" => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid(format!("string result with {} value", type_of(value))))?;
            Ok(ChatResponse::Text(s.to_string()))
        }
        "number" => {
            let n = value
                .as_number()
                .ok_or_else(|| invalid(format!("number result with {} value", type_of(value))))?;
            Ok(ChatResponse::Number(n.clone()))
        }
        "dataframe" => {
            let table = parse_table(value)?;
            if let Some(hook) = hook {
                hook.present(&table)
                    .map_err(|e| invalid(format!("presentation hook failed: {}", e)))?;
            }
            Ok(ChatResponse::Table(table))
        }
        "plot" => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid(format!("plot result with {} value", type_of(value))))?;
            let path = resolve_chart_path(s, &config.charts_dir);
            if config.verify_charts && !path.exists() {
                return Err(invalid(format!("chart file does not exist: {}", path.display())));
            }
            Ok(ChatResponse::Chart(path))
        }
        other => Err(invalid(format!("unknown result type '{}'", other))),
    }
}

/// Accepts headers/rows form or a records array and normalizes to a table.
fn parse_table(value: &Value) -> Result<TableView, ChatError> {
    if let Some(obj) = value.as_object() {
        let headers = obj
            .get("headers")
            .and_then(|h| h.as_array())
            .ok_or_else(|| invalid("dataframe value missing `headers` array".into()))?
            .iter()
            .map(|h| h.as_str().map(String::from))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid("dataframe headers must be strings".into()))?;
        let rows_raw = obj
            .get("rows")
            .and_then(|r| r.as_array())
            .ok_or_else(|| invalid("dataframe value missing `rows` array".into()))?;
        let mut rows = Vec::with_capacity(rows_raw.len());
        for row in rows_raw {
            let cells = row
                .as_array()
                .ok_or_else(|| invalid("dataframe rows must be arrays".into()))?;
            if cells.len() != headers.len() {
                return Err(invalid(format!(
                    "dataframe row has {} cells, headers has {}",
                    cells.len(),
                    headers.len()
                )));
            }
            rows.push(cells.clone());
        }
        return Ok(TableView { headers, rows });
    }

    if let Some(records) = value.as_array() {
        let first = records
            .first()
            .and_then(|r| r.as_object())
            .ok_or_else(|| invalid("dataframe records must be non-empty mappings".into()))?;
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut rows = Vec::with_capacity(records.len());
        for rec in records {
            let obj = rec
                .as_object()
                .ok_or_else(|| invalid("dataframe records must be mappings".into()))?;
            rows.push(headers.iter().map(|h| obj.get(h).cloned().unwrap_or(Value::Null)).collect());
        }
        return Ok(TableView { headers, rows });
    }

    Err(invalid(format!("dataframe result with {} value", type_of(value))))
}

fn resolve_chart_path(s: &str, charts_dir: &Path) -> PathBuf {
    let p = Path::new(s);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        charts_dir.join(p)
    }
}

fn invalid(message: String) -> ChatError {
    ChatError::InvalidResult(message)
}

fn type_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn number_result_parses_and_renders() {
        let raw = json!({"type": "number", "value": 15000});
        let parsed = parse(&raw, &config(), None).unwrap();
        assert_eq!(parsed, ChatResponse::Number(serde_json::Number::from(15000)));
        assert_eq!(parsed.render(), "15000");
    }

    #[test]
    fn number_with_text_value_is_invalid_shape() {
        let raw = json!({"type": "number", "value": "not-a-number"});
        let err = parse(&raw, &config(), None).unwrap_err();
        assert!(matches!(err, ChatError::InvalidResult(_)));
    }

    #[test]
    fn string_result_parses() {
        let raw = json!({"type": "string", "value": "Test Result"});
        let parsed = parse(&raw, &config(), None).unwrap();
        assert_eq!(parsed.render(), "Test Result");
        assert_eq!(parsed.type_name(), "string");
    }

    #[test]
    fn missing_type_or_value_is_invalid() {
        assert!(parse(&json!({"value": 1}), &config(), None).is_err());
        assert!(parse(&json!({"type": "number"}), &config(), None).is_err());
        assert!(parse(&json!("just text"), &config(), None).is_err());
        assert!(parse(&json!({"type": "tuple", "value": 1}), &config(), None).is_err());
    }

    #[test]
    fn dataframe_headers_rows_form() {
        let raw = json!({"type": "dataframe", "value": {
            "headers": ["country", "gdp"],
            "rows": [["France", 2411255037952i64], ["Japan", 4380756541440i64]],
        }});
        match parse(&raw, &config(), None).unwrap() {
            ChatResponse::Table(t) => {
                assert_eq!(t.headers, vec!["country", "gdp"]);
                assert_eq!(t.rows.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn dataframe_records_form_is_converted() {
        let raw = json!({"type": "dataframe", "value": [
            {"country": "France", "gdp": 1},
            {"country": "Japan", "gdp": 2},
        ]});
        match parse(&raw, &config(), None).unwrap() {
            ChatResponse::Table(t) => {
                assert_eq!(t.headers, vec!["country", "gdp"]);
                assert_eq!(t.rows[1], vec![json!("Japan"), json!(2)]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn ragged_dataframe_is_invalid() {
        let raw = json!({"type": "dataframe", "value": {
            "headers": ["a", "b"],
            "rows": [[1]],
        }});
        assert!(parse(&raw, &config(), None).is_err());
    }

    #[test]
    fn chart_existence_checked_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.charts_dir = dir.path().to_path_buf();
        cfg.verify_charts = true;

        let missing = json!({"type": "plot", "value": "chart.png"});
        assert!(parse(&missing, &cfg, None).is_err());

        std::fs::write(dir.path().join("chart.png"), b"png").unwrap();
        let parsed = parse(&missing, &cfg, None).unwrap();
        assert!(matches!(parsed, ChatResponse::Chart(_)));
    }

    #[test]
    fn dataframe_hook_runs_on_parse() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        struct Counting;
        impl DataframePresenter for Counting {
            fn present(&self, _table: &TableView) -> Result<()> {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let raw = json!({"type": "dataframe", "value": {"headers": ["a"], "rows": [[1]]}});
        parse(&raw, &config(), Some(&Counting)).unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
