use clap::{Parser, Subcommand};

use crate::semantic::FormulaStep;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Address to listen on (overrides config)
        #[clap(short, long)]
        listen: Option<String>,

        /// Load the embedding model before accepting requests
        #[clap(long, default_value = "false")]
        warm: bool,
    },

    /// Free-text semantic search
    Search {
        /// Search text
        #[clap(short, long)]
        query: Option<String>,

        /// Comma separated flavor notes
        #[clap(short, long)]
        flavors: Option<String>,
    },

    /// Rank reviews by concept arithmetic, e.g. --add Chocolate --sub Light:0.5
    Alchemist {
        /// Concept to add, optionally weighted as LABEL:WEIGHT
        #[clap(short, long, value_parser = parse_weighted)]
        add: Vec<(String, f32)>,

        /// Concept to subtract, optionally weighted as LABEL:WEIGHT
        #[clap(short, long, value_parser = parse_weighted)]
        sub: Vec<(String, f32)>,
    },

    /// List concept labels usable in formulas
    Concepts {},
}

impl Command {
    /// Formula steps for the `alchemist` subcommand.
    pub fn formula(add: &[(String, f32)], sub: &[(String, f32)]) -> Vec<FormulaStep> {
        add.iter()
            .map(|(label, weight)| FormulaStep::add(label, *weight))
            .chain(
                sub.iter()
                    .map(|(label, weight)| FormulaStep::sub(label, *weight)),
            )
            .collect()
    }
}

fn parse_weighted(value: &str) -> Result<(String, f32), String> {
    match value.rsplit_once(':') {
        Some((label, weight)) => {
            let weight = weight
                .parse::<f32>()
                .map_err(|err| format!("invalid weight {weight:?}: {err}"))?;
            if !weight.is_finite() {
                return Err(format!("invalid weight {weight}"));
            }
            Ok((label.to_string(), weight))
        }
        None => Ok((value.to_string(), 1.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weighted() {
        assert_eq!(parse_weighted("Fruit"), Ok(("Fruit".to_string(), 1.0)));
        assert_eq!(parse_weighted("Light:0.5"), Ok(("Light".to_string(), 0.5)));
        assert!(parse_weighted("Light:heavy").is_err());
    }

    #[test]
    fn test_alchemist_args() {
        let args = Args::try_parse_from([
            "brewintel",
            "alchemist",
            "--add",
            "Chocolate",
            "--sub",
            "Light:0.5",
        ])
        .unwrap();

        match args.command {
            Command::Alchemist { add, sub } => {
                assert_eq!(
                    Command::formula(&add, &sub),
                    vec![
                        FormulaStep::add("Chocolate", 1.0),
                        FormulaStep::sub("Light", 0.5)
                    ]
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
