use anyhow::{bail, Result};
use is_terminal::IsTerminal;
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

use dfchat::cli::Cli;
use dfchat::config::Config;
use dfchat::handlers::{chat::ChatHandler, repl::ReplHandler};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let mut cfg = Config::load();

    // CLI switches override config
    if let Some(model) = &args.model {
        cfg.set("DEFAULT_MODEL", model);
    }
    if args.direct_sql {
        cfg.set("DIRECT_SQL", "true");
    }
    if args.privacy {
        cfg.set("ENFORCE_PRIVACY", "true");
    }
    if args.cache {
        cfg.set("ENABLE_CACHE", "true");
    }
    if args.no_cache {
        cfg.set("ENABLE_CACHE", "false");
    }
    if let Some(n) = args.max_retries {
        cfg.set("MAX_RETRIES", &n.to_string());
    }
    if let Some(s) = &args.serializer {
        cfg.set("DATAFRAME_SERIALIZER", s);
    }
    if let Some(t) = args.exec_timeout {
        cfg.set("EXEC_TIMEOUT", &t.to_string());
    }

    // stdin handling (pipe support: `echo "question" | dfchat -f data.csv`)
    let mut prompt_from_stdin = String::new();
    if !io::stdin().is_terminal() && !args.repl {
        io::stdin().read_to_string(&mut prompt_from_stdin)?;
    }

    let arg_query = args.query.unwrap_or_default();
    let query = if !prompt_from_stdin.trim().is_empty() && !arg_query.is_empty() {
        format!("{}\n\n{}", prompt_from_stdin.trim(), arg_query)
    } else if !prompt_from_stdin.trim().is_empty() {
        prompt_from_stdin.trim().to_string()
    } else {
        arg_query
    };

    if args.repl {
        return ReplHandler::run(&cfg, &args.file).await;
    }
    if query.is_empty() {
        bail!("provide a question, or --repl for an interactive session");
    }
    ChatHandler::run(&cfg, &query, &args.file).await
}
