use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlscribe::{commands, ConfigArgs, ModelClient, Session};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Introspect the database, write the context files and print the schema document
    Schema,
    /// Turn a question into SQL, run it and record the attempt
    Ask {
        question: String,
        /// Model to use instead of DEFAULT_MODEL
        #[arg(short, long)]
        model: Option<String>,
        /// Also write returned rows to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// List the models offered by the model service
    Models,
    /// Summarize the recorded query history
    History {
        /// Number of recent attempts to show
        #[arg(short, long, default_value_t = 10)]
        recent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::History { recent } = &cli.command {
        let dir = cli
            .config
            .history_enabled
            .then_some(cli.config.history_dir.as_path());
        print!("{}", commands::history(dir, *recent)?);
        return Ok(());
    }

    if let Command::Models = cli.command {
        let model = cli.config.model_config();
        let client = ModelClient::new(&model.api_url)
            .context("Failed to build model client")?
            .with_fallback_models(model.available_models);
        println!("{}", commands::models(&client).await);
        return Ok(());
    }

    let config = cli.config.resolve().context("Invalid configuration")?;
    let mut session = Session::connect(&config)
        .await
        .context("Failed to start session")?;

    let output = match cli.command {
        Command::Schema => commands::schema(&mut session).await?,
        Command::Ask {
            question,
            model,
            csv,
        } => {
            let model = model.unwrap_or_else(|| config.model.default_model.clone());
            commands::ask(&mut session, &question, &model, csv.as_deref()).await?
        }
        Command::Models | Command::History { .. } => unreachable!("handled before connecting"),
    };
    println!("{output}");

    session.disconnect();
    Ok(())
}
