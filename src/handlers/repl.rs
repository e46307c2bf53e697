//! Interactive session: follow-up questions share one context and memory.

use std::io::{self, Write};

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::config::Config;

use super::chat::{build_context, build_pipeline};
use super::{print_failure, print_response};

pub struct ReplHandler;

impl ReplHandler {
    pub async fn run(cfg: &Config, files: &[String]) -> Result<()> {
        let mut ctx = build_context(cfg, files)?;
        let pipeline = build_pipeline(cfg, &ctx.config)?;

        let names = ctx
            .dataframes()
            .iter()
            .map(|df| df.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!("Bound dataframes: {}", names);
        println!("Ask questions about the data; exit() to quit.");

        loop {
            print!("{} ", ">>>".cyan());
            io::stdout().flush().ok();
            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                break; // EOF
            }
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            if query == "exit()" || query == "quit" {
                break;
            }

            match pipeline.chat(&mut ctx, query).await {
                Ok(response) => print_response(&response),
                // Keep the session alive; the failed turn is already in memory.
                Err(failure) => print_failure(&failure),
            }
        }

        Ok(())
    }
}
