use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "dfchat", about = "Chat with tabular data", version)]
#[command(group(ArgGroup::new("cache_switch").args(["cache", "no_cache"]).multiple(false)))]
pub struct Cli {
    /// The question to ask about the bound data.
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Dataset file (.csv or .json records). Can be used multiple times:
    /// --file sales.csv --file regions.json
    #[arg(short = 'f', long = "file", action = clap::ArgAction::Append)]
    pub file: Vec<String>,

    /// Large language model to use.
    #[arg(long)]
    pub model: Option<String>,

    /// Start an interactive session over the bound data.
    #[arg(long)]
    pub repl: bool,

    /// Answer questions through SQL over the bound tables.
    #[arg(long = "direct-sql")]
    pub direct_sql: bool,

    /// Keep sample rows out of every generated prompt.
    #[arg(long)]
    pub privacy: bool,

    /// Cache generated code per (query, schema, config).
    #[arg(long)]
    pub cache: bool,
    /// Disable the code cache.
    #[arg(long = "no-cache")]
    pub no_cache: bool,

    /// Regeneration attempts allowed after a failed execution.
    #[arg(long = "max-retries")]
    pub max_retries: Option<usize>,

    /// Dataframe preview style in prompts (csv|yml|json).
    #[arg(long)]
    pub serializer: Option<String>,

    /// Wall-clock bound for one code execution, in seconds.
    #[arg(long = "exec-timeout")]
    pub exec_timeout: Option<u64>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
