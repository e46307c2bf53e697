use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use directories::BaseDirs;

/// Raw key-value configuration loaded from `.dfchatrc` overlaid with the
/// environment.
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .dfchatrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Config with every key at its built-in default, detached from the
    /// environment. Used by tests and embedders.
    pub fn defaults() -> Self {
        Self { inner: default_map(), config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.inner.insert(key.to_string(), value.to_string());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(self.get("CACHE_PATH").unwrap())
    }

    pub fn charts_path(&self) -> PathBuf {
        PathBuf::from(self.get("CHARTS_PATH").unwrap())
    }
}

/// Serialization style for dataframe previews embedded in prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerType {
    Csv,
    Yml,
    Json,
}

impl SerializerType {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "yml" | "yaml" => Self::Yml,
            "json" => Self::Json,
            _ => Self::Csv,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Yml => "yml",
            Self::Json => "json",
        }
    }
}

/// Typed view over the raw config, resolved once per pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub enable_cache: bool,
    pub direct_sql: bool,
    pub enforce_privacy: bool,
    pub serializer: SerializerType,
    pub max_retries: usize,
    pub custom_whitelisted_dependencies: Vec<String>,
    /// Wall-clock bound for one generated-code execution, in seconds.
    pub exec_timeout: u64,
    /// Directory generated plots are saved into.
    pub charts_dir: PathBuf,
    /// Require plot result paths to exist on disk.
    pub verify_charts: bool,
}

impl PipelineConfig {
    pub fn from_config(cfg: &Config) -> Self {
        let custom = cfg
            .get("CUSTOM_WHITELISTED_DEPENDENCIES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            enable_cache: cfg.get_bool("ENABLE_CACHE"),
            direct_sql: cfg.get_bool("DIRECT_SQL"),
            enforce_privacy: cfg.get_bool("ENFORCE_PRIVACY"),
            serializer: SerializerType::parse(
                &cfg.get("DATAFRAME_SERIALIZER").unwrap_or_else(|| "csv".into()),
            ),
            max_retries: cfg.get_usize("MAX_RETRIES").unwrap_or(3),
            custom_whitelisted_dependencies: custom,
            exec_timeout: cfg
                .get("EXEC_TIMEOUT")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            charts_dir: cfg.charts_path(),
            verify_charts: cfg.get_bool("VERIFY_CHARTS"),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::defaults())
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "OPENAI_API_KEY",
        "API_BASE_URL",
        "CACHE_PATH",
        "CACHE_LENGTH",
        "CHARTS_PATH",
        "REQUEST_TIMEOUT",
        "DEFAULT_MODEL",
        "ENABLE_CACHE",
        "DIRECT_SQL",
        "ENFORCE_PRIVACY",
        "DATAFRAME_SERIALIZER",
        "MAX_RETRIES",
        "CUSTOM_WHITELISTED_DEPENDENCIES",
        "EXEC_TIMEOUT",
        "VERIFY_CHARTS",
        "PYTHON_BIN",
    ];

    KEYS.contains(&k) || k.starts_with("DFCHAT_") || k.starts_with("OPENAI_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("dfchat").join(".dfchatrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    let temp = env::temp_dir().join("dfchat");

    // Paths
    m.insert(
        "CACHE_PATH".into(),
        temp.join("cache").to_string_lossy().into_owned(),
    );
    m.insert(
        "CHARTS_PATH".into(),
        temp.join("charts").to_string_lossy().into_owned(),
    );

    // Numbers
    m.insert("CACHE_LENGTH".into(), "100".into());
    m.insert("REQUEST_TIMEOUT".into(), "60".into());
    m.insert("MAX_RETRIES".into(), "3".into());
    m.insert("EXEC_TIMEOUT".into(), "30".into());

    // Strings
    m.insert("DEFAULT_MODEL".into(), "gpt-4o".into());
    m.insert("API_BASE_URL".into(), "default".into());
    m.insert("DATAFRAME_SERIALIZER".into(), "csv".into());
    m.insert("PYTHON_BIN".into(), "python3".into());

    // Bools as strings
    m.insert("ENABLE_CACHE".into(), "true".into());
    m.insert("DIRECT_SQL".into(), "false".into());
    m.insert("ENFORCE_PRIVACY".into(), "false".into());
    m.insert("VERIFY_CHARTS".into(), "false".into());

    m
}
