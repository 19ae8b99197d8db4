use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod remote;
mod reviews;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use app::{AppFactory, SearchOutcome, TextQuery};
use cli::Command;
use config::Config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let base_path = AppFactory::get_base_path()?;
    let config = Config::load_with(&base_path)?;
    let engine = AppFactory::create_engine(&config)?;

    match args.command {
        Command::Serve { listen, warm } => {
            if warm {
                engine.embeddings().initialize()?;
            }
            let listen = listen.unwrap_or_else(|| config.listen.clone());
            web::start_daemon(engine, &listen)
        }

        Command::Search { query, flavors } => {
            let text = TextQuery::parse(query, flavors);
            match engine.search_text(&text)? {
                SearchOutcome::Ready(ready) => {
                    println!("{}", ready.message);
                }
                SearchOutcome::Results(response) => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
            }
            Ok(())
        }

        Command::Alchemist { add, sub } => {
            let formula = Command::formula(&add, &sub);
            let response = engine.alchemist(&formula)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        Command::Concepts {} => {
            for label in engine.concepts().concepts {
                println!("{label}");
            }
            Ok(())
        }
    }
}
