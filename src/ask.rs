//! `docrag ask` and `docrag prompt`.

use anyhow::{bail, Result};
use futures::StreamExt;
use std::io::Write;

use docrag_core::generate::StreamEvent;

use crate::app::build_service;
use crate::config::Config;

/// Answer `query` from the index, streaming fragments to stdout as they
/// arrive unless `no_stream` is set.
pub async fn run_ask(
    config: &Config,
    query: &str,
    k: Option<usize>,
    model: Option<&str>,
    no_stream: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let app = build_service(config).await?;

    if no_stream {
        let answer = app.service.answer_query(query, k, model).await?;
        println!("{}", answer);
        return Ok(());
    }

    let mut stream = app.service.answer_query_stream(query, k, model).await?;
    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Fragment(fragment) => {
                stdout.write_all(fragment.as_bytes())?;
                stdout.flush()?;
            }
            StreamEvent::Completed => break,
            StreamEvent::Failed(e) => {
                println!();
                return Err(e.into());
            }
        }
    }
    println!();
    Ok(())
}

/// Print the prompt that `ask` would send, without calling the model.
pub async fn run_prompt(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let app = build_service(config).await?;
    let prompt = app.service.render_prompt(query, k).await?;
    println!("{}", prompt);
    Ok(())
}
