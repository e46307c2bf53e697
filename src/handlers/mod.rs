//! CLI-facing drivers over the chat pipeline.

use owo_colors::OwoColorize;

use crate::error::TurnFailure;
use crate::response::ChatResponse;

pub mod chat;
pub mod repl;

pub(crate) fn print_response(response: &ChatResponse) {
    match response {
        ChatResponse::Text(s) => println!("{}", s),
        ChatResponse::Number(n) => println!("{}", n),
        ChatResponse::Table(t) => {
            println!("{}", t.headers.join("\t").bold());
            for row in &t.rows {
                let line = row
                    .iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("\t");
                println!("{}", line);
            }
        }
        ChatResponse::Chart(path) => println!("chart saved to {}", path.display()),
    }
}

pub(crate) fn print_failure(failure: &TurnFailure) {
    eprintln!(
        "{} [{}] {}",
        "error:".red().bold(),
        failure.error.kind(),
        failure.message()
    );
    if failure.attempts > 0 {
        eprintln!("gave up after {} retries", failure.attempts);
    }
    if let Some(code) = &failure.last_code {
        eprintln!("\nlast generated code:\n{}", code.dimmed());
    }
}
