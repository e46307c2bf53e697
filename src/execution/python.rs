//! Python subprocess harness: bound dataframes in, one JSON result line out.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::config::{Config, PipelineConfig};
use crate::error::ChatError;

use super::{CodeRunner, ExecutionOutcome, ExecutionRequest};

/// Bootstrap program executed with `python -u -c`. It reads the request
/// payload from stdin, binds `dfs` (and `execute_sql_query` in SQL mode),
/// runs the validated code, and prints exactly one JSON object on stdout.
/// Charts go to the request's charts directory via chdir.
const BOOTSTRAP: &str = r#"
import json, sys

def _main():
    payload = json.loads(sys.stdin.read())
    import pandas as pd
    dfs = [pd.DataFrame(d["rows"], columns=d["columns"]) for d in payload["dfs"]]
    env = {"dfs": dfs, "pd": pd}
    if payload.get("direct_sql"):
        import sqlite3
        conn = sqlite3.connect(":memory:")
        for d, frame in zip(payload["dfs"], dfs):
            frame.to_sql(d["name"], conn, index=False)
        def execute_sql_query(sql_query):
            return pd.read_sql_query(sql_query, conn)
        env["execute_sql_query"] = execute_sql_query
    try:
        import matplotlib
        matplotlib.use("Agg")
    except ImportError:
        pass
    import os
    os.makedirs(payload["charts_dir"], exist_ok=True)
    os.chdir(payload["charts_dir"])
    try:
        exec(compile(payload["code"], "<generated>", "exec"), env)
    except BaseException as exc:
        print(json.dumps({"ok": False, "kind": type(exc).__name__, "message": str(exc)}))
        return
    result = env.get("result")
    if result is None:
        print(json.dumps({"ok": False, "kind": "MissingResult",
                          "message": "code finished without assigning `result`"}))
        return
    if isinstance(result, dict) and isinstance(result.get("value"), pd.DataFrame):
        frame = result["value"]
        result = dict(result)
        result["value"] = {"headers": [str(c) for c in frame.columns],
                           "rows": frame.values.tolist()}
    print(json.dumps({"ok": True, "result": result}, default=str))

_main()
"#;

#[derive(Debug, Deserialize)]
struct HarnessReply {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Runs validated code in a fresh `python3` process per attempt, with a hard
/// wall-clock bound. The subprocess sees only the serialized dataframe rows,
/// never the binding objects themselves.
#[derive(Debug, Clone)]
pub struct PythonRunner {
    python_bin: String,
    timeout_secs: u64,
}

impl PythonRunner {
    pub fn from_config(cfg: &Config, pipeline: &PipelineConfig) -> Self {
        Self {
            python_bin: cfg.get("PYTHON_BIN").unwrap_or_else(|| "python3".into()),
            timeout_secs: pipeline.exec_timeout,
        }
    }

    pub fn new(python_bin: impl Into<String>, timeout_secs: u64) -> Self {
        Self { python_bin: python_bin.into(), timeout_secs }
    }
}

#[async_trait]
impl CodeRunner for PythonRunner {
    async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, ChatError> {
        let payload = serde_json::to_vec(request).map_err(|e| ChatError::Execution {
            kind: "payload".into(),
            message: e.to_string(),
        })?;

        let mut child = Command::new(&self.python_bin)
            .arg("-u")
            .arg("-c")
            .arg(BOOTSTRAP)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChatError::Execution {
                kind: "spawn".into(),
                message: format!("{}: {}", self.python_bin, e),
            })?;

        {
            let mut stdin = child.stdin.take().ok_or_else(|| ChatError::Execution {
                kind: "spawn".into(),
                message: "no stdin handle".into(),
            })?;
            stdin.write_all(&payload).await.map_err(|e| ChatError::Execution {
                kind: "io".into(),
                message: e.to_string(),
            })?;
            // dropping closes the pipe, unblocking the harness read
        }

        let output = match timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
        {
            Ok(done) => done.map_err(|e| ChatError::Execution {
                kind: "io".into(),
                message: e.to_string(),
            })?,
            // kill_on_drop reaps the runaway process
            Err(_) => return Err(ChatError::Timeout(self.timeout_secs)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(status = ?output.status, "python harness finished");
        match parse_reply(&stdout) {
            Some(reply) => Ok(reply),
            None => Ok(ExecutionOutcome::Error {
                kind: "harness".into(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

/// The harness prints one JSON object; tolerate stray lines from the code
/// itself by scanning from the end.
fn parse_reply(stdout: &str) -> Option<ExecutionOutcome> {
    for line in stdout.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(reply) = serde_json::from_str::<HarnessReply>(line) {
            if reply.ok {
                return Some(ExecutionOutcome::Success(reply.result.unwrap_or(Value::Null)));
            }
            return Some(ExecutionOutcome::Error {
                kind: reply.kind.unwrap_or_else(|| "Exception".into()),
                message: reply.message.unwrap_or_default(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_success_reply() {
        let out = "warming up\n{\"ok\": true, \"result\": {\"type\": \"number\", \"value\": 42}}\n";
        match parse_reply(out).unwrap() {
            ExecutionOutcome::Success(v) => assert_eq!(v["value"], 42),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn parse_error_reply() {
        let out = "{\"ok\": false, \"kind\": \"ZeroDivisionError\", \"message\": \"division by zero\"}";
        match parse_reply(out).unwrap() {
            ExecutionOutcome::Error { kind, message } => {
                assert_eq!(kind, "ZeroDivisionError");
                assert!(message.contains("zero"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn garbage_output_is_no_reply() {
        assert!(parse_reply("Traceback (most recent call last):\n  boom\n").is_none());
        assert!(parse_reply("").is_none());
    }
}
