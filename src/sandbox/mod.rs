//! Static gate for generated code: cleaning, structural analysis, whitelist.
//!
//! Everything here runs before any generated code executes. The analysis is
//! a line-level scan of the import/call surface; it fails closed, so a banned
//! pattern anywhere in the text rejects the whole candidate.

use regex::Regex;

use crate::config::PipelineConfig;
use crate::error::ChatError;

/// Import roots allowed without extra configuration.
pub const DEFAULT_WHITELIST: &[&str] = &[
    "pandas",
    "numpy",
    "matplotlib",
    "datetime",
    "json",
    "math",
    "statistics",
];

/// The variable the generated code must assign its answer to.
pub const RESULT_VAR: &str = "result";

/// One recognized statement from the structural scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PyStmt {
    /// `import x`, `import x as y` (root module per target)
    Import { module: String },
    /// `from x.y import z` (root module)
    FromImport { module: String },
    /// `name = ...` at statement level
    Assign { target: String },
    Other,
}

/// Import/call surface of a candidate, derived once and checked against the
/// policy.
#[derive(Debug, Clone, Default)]
pub struct CodeAnalysis {
    pub statements: Vec<PyStmt>,
    /// Root modules named by import statements.
    pub imports: Vec<String>,
    /// Dotted call targets, e.g. `pd.read_csv`, `eval`.
    pub calls: Vec<String>,
    /// Statement-level assignment targets.
    pub assigns: Vec<String>,
}

impl CodeAnalysis {
    pub fn assigns_result(&self) -> bool {
        self.assigns.iter().any(|a| a == RESULT_VAR)
    }
}

/// Strip Markdown fences and language tags the backend tends to wrap code in.
pub fn clean_code(raw: &str) -> String {
    let mut out = String::new();
    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Line-level structural scan. Not a full grammar: the whitelist decisions
/// only need the import/call surface.
pub fn analyze(code: &str) -> CodeAnalysis {
    let call_re = Regex::new(r"([A-Za-z_][A-Za-z0-9_.]*)\s*\(").unwrap();
    let assign_re = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=[^=]").unwrap();

    let mut analysis = CodeAnalysis::default();
    for line in code.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        if let Some(rest) = stripped.strip_prefix("import ") {
            for target in rest.split(',') {
                let module = target
                    .trim()
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .split('.')
                    .next()
                    .unwrap_or("")
                    .to_string();
                if !module.is_empty() {
                    analysis.imports.push(module.clone());
                    analysis.statements.push(PyStmt::Import { module });
                }
            }
        } else if let Some(rest) = stripped.strip_prefix("from ") {
            let module = rest
                .split_whitespace()
                .next()
                .unwrap_or("")
                .split('.')
                .next()
                .unwrap_or("")
                .to_string();
            if !module.is_empty() {
                analysis.imports.push(module.clone());
                analysis.statements.push(PyStmt::FromImport { module });
            }
        } else if let Some(caps) = assign_re.captures(stripped) {
            let target = caps[1].to_string();
            analysis.assigns.push(target.clone());
            analysis.statements.push(PyStmt::Assign { target });
        } else {
            analysis.statements.push(PyStmt::Other);
        }

        for caps in call_re.captures_iter(stripped) {
            analysis.calls.push(caps[1].to_string());
        }
    }
    analysis
}

/// The allow-list plus the banned-construct patterns applied to every
/// candidate.
pub struct WhitelistPolicy {
    allowed_imports: Vec<String>,
    banned: Vec<(Regex, &'static str)>,
}

impl WhitelistPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut allowed: Vec<String> =
            DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect();
        allowed.extend(config.custom_whitelisted_dependencies.iter().cloned());
        Self { allowed_imports: allowed, banned: banned_patterns() }
    }

    /// Check a cleaned candidate. Returns its analysis on acceptance so later
    /// stages do not re-scan.
    pub fn validate(&self, code: &str) -> Result<CodeAnalysis, ChatError> {
        for (re, what) in &self.banned {
            if re.is_match(code) {
                return Err(ChatError::Validation(format!("disallowed construct: {}", what)));
            }
        }

        let analysis = analyze(code);
        for module in &analysis.imports {
            if !self.allowed_imports.iter().any(|a| a == module) {
                return Err(ChatError::Validation(format!(
                    "import of '{}' is not whitelisted",
                    module
                )));
            }
        }

        if !analysis.assigns_result() {
            return Err(ChatError::Validation(format!(
                "code never assigns the `{}` variable",
                RESULT_VAR
            )));
        }

        Ok(analysis)
    }
}

fn banned_patterns() -> Vec<(Regex, &'static str)> {
    // Bare-name builtins must not be preceded by a dot (method calls like
    // df.eval are pandas, not the builtin).
    let bare = |name: &str| format!(r"(^|[^\w.]){}\s*\(", name);
    vec![
        (Regex::new(&bare("eval")).unwrap(), "eval()"),
        (Regex::new(&bare("exec")).unwrap(), "exec()"),
        (Regex::new(&bare("compile")).unwrap(), "compile()"),
        (Regex::new(&bare("open")).unwrap(), "open()"),
        (Regex::new(&bare("input")).unwrap(), "input()"),
        (Regex::new(&bare("getattr")).unwrap(), "getattr()"),
        (Regex::new(&bare("setattr")).unwrap(), "setattr()"),
        (Regex::new(&bare("delattr")).unwrap(), "delattr()"),
        (Regex::new(&bare("globals")).unwrap(), "globals()"),
        (Regex::new(&bare("locals")).unwrap(), "locals()"),
        (Regex::new(&bare("vars")).unwrap(), "vars()"),
        (Regex::new(r"__import__").unwrap(), "__import__"),
        (Regex::new(r"\.\s*__[A-Za-z_]+__").unwrap(), "dunder attribute access"),
        (Regex::new(r"\bos\s*\.").unwrap(), "os module"),
        (Regex::new(r"\bsys\s*\.").unwrap(), "sys module"),
        (Regex::new(r"\bsubprocess\s*\.").unwrap(), "subprocess module"),
        (Regex::new(r"\bsocket\s*\.").unwrap(), "socket module"),
        (Regex::new(r"\bshutil\s*\.").unwrap(), "shutil module"),
        (Regex::new(r"\bimportlib\s*\.").unwrap(), "importlib module"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> WhitelistPolicy {
        WhitelistPolicy::from_config(&PipelineConfig::default())
    }

    #[test]
    fn clean_strips_fences_and_tags() {
        let raw = "```python\nresult = {\"type\": \"number\", \"value\": 1}\n```";
        let cleaned = clean_code(raw);
        assert_eq!(cleaned, "result = {\"type\": \"number\", \"value\": 1}");
    }

    #[test]
    fn analyze_collects_imports_and_assigns() {
        let code = "import pandas as pd\nfrom numpy.linalg import norm\navg = dfs[0]['gdp'].mean()\nresult = {\"type\": \"number\", \"value\": avg}\n";
        let a = analyze(code);
        assert_eq!(a.imports, vec!["pandas", "numpy"]);
        assert_eq!(a.assigns, vec!["avg", "result"]);
        assert!(a.calls.iter().any(|c| c.ends_with("mean")));
        assert!(a.assigns_result());
        assert_eq!(a.statements[0], PyStmt::Import { module: "pandas".into() });
        assert_eq!(a.statements[1], PyStmt::FromImport { module: "numpy".into() });
    }

    #[test]
    fn accepts_plain_pandas_code() {
        let code = "import pandas as pd\navg = dfs[0]['gdp'].mean()\nresult = {\"type\": \"number\", \"value\": avg}";
        assert!(policy().validate(code).is_ok());
    }

    #[test]
    fn rejects_non_whitelisted_import() {
        let code = "import os\nresult = {\"type\": \"string\", \"value\": os.getcwd()}";
        let err = policy().validate(code).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(err.to_string().contains("os"));
    }

    #[test]
    fn rejects_dynamic_evaluation() {
        for code in [
            "result = eval('1+1')",
            "exec('x = 1')\nresult = {\"type\": \"number\", \"value\": 1}",
            "m = __import__('os')\nresult = {\"type\": \"number\", \"value\": 1}",
        ] {
            assert!(policy().validate(code).is_err(), "should reject: {}", code);
        }
    }

    #[test]
    fn rejects_dunder_escape() {
        let code = "x = ().__class__.__bases__\nresult = {\"type\": \"number\", \"value\": 1}";
        assert!(policy().validate(code).is_err());
    }

    #[test]
    fn rejects_file_access() {
        let code = "f = open('/etc/passwd')\nresult = {\"type\": \"string\", \"value\": f.read()}";
        assert!(policy().validate(code).is_err());
    }

    #[test]
    fn method_named_like_builtin_is_allowed() {
        let code = "out = dfs[0].eval('gdp * 2')\nresult = {\"type\": \"number\", \"value\": out.sum()}";
        assert!(policy().validate(code).is_ok());
    }

    #[test]
    fn rejects_missing_result_variable() {
        let code = "avg = dfs[0]['gdp'].mean()\nprint(avg)";
        let err = policy().validate(code).unwrap_err();
        assert!(err.to_string().contains("result"));
    }

    #[test]
    fn custom_whitelist_extends_defaults() {
        let mut config = PipelineConfig::default();
        config.custom_whitelisted_dependencies = vec!["scipy".into()];
        let policy = WhitelistPolicy::from_config(&config);
        let code = "import scipy\nresult = {\"type\": \"number\", \"value\": 1}";
        assert!(policy.validate(code).is_ok());
    }
}
