//! Courier - Command Line Entry Point
//!
//! Two surfaces: `serve-tools` runs the stdio tool server over the mail
//! store, `ask` runs one orchestrated assistant query against it.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use courier::services::assistant::Assistant;
use courier::services::llm::OpenAIProvider;
use courier::services::mailbox::MailboxService;
use courier::services::tool_server::ToolServer;
use courier::services::tools::session::ToolServerConfig;
use courier::storage::config::ConfigService;
use courier::storage::database::Database;
use courier::utils::error::{AppError, AppResult};
use courier::utils::paths;

#[derive(Parser)]
#[command(name = "courier", version, about = "Messaging service with a tool-calling AI assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the mailbox tool server on stdin/stdout
    ServeTools {
        /// Database file (defaults to ~/.courier/data.db)
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Ask the assistant a question about the mail store
    Ask {
        /// Config file (defaults to ~/.courier/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// The question to answer
        query: String,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr: stdout of serve-tools is the protocol channel
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::ServeTools { database } => serve_tools(database).await,
        Commands::Ask { config, query } => ask(config, &query).await,
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Run the tool server until stdin closes
async fn serve_tools(database: Option<PathBuf>) -> AppResult<()> {
    let db_path = match database {
        Some(path) => path,
        None => paths::database_path()?,
    };

    let db = Database::open(&db_path)?;
    let server = ToolServer::new(MailboxService::new(db));
    server.serve(tokio::io::stdin(), tokio::io::stdout()).await
}

/// Answer one query end-to-end
async fn ask(config: Option<PathBuf>, query: &str) -> AppResult<()> {
    let config_service = match config {
        Some(path) => ConfigService::at(&path)?,
        None => ConfigService::new()?,
    };
    let config = config_service.get_config().clone();

    if config.provider.api_key.is_none() {
        return Err(AppError::config(
            "No API key configured; set OPENAI_API_KEY or edit the config file",
        ));
    }

    let server = resolve_tool_server(&config.tool_server, config.database_path.as_deref())?;
    let provider = Arc::new(OpenAIProvider::new(config.provider));

    let mut assistant = Assistant::new(provider, server);

    // Ctrl-C cancels the run; the session is still released
    let cancel = assistant.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    assistant.connect().await?;
    let result = assistant.answer_query(query).await;
    assistant.shutdown().await;

    println!("{}", result?);
    Ok(())
}

/// An empty configured command means "spawn ourselves as the tool server"
fn resolve_tool_server(
    configured: &ToolServerConfig,
    database: Option<&std::path::Path>,
) -> AppResult<ToolServerConfig> {
    if !configured.command.is_empty() {
        return Ok(configured.clone());
    }

    let exe = std::env::current_exe()
        .map_err(|e| AppError::config(format!("Cannot locate own executable: {}", e)))?;

    let mut args = vec!["serve-tools".to_string()];
    if let Some(path) = database {
        args.push("--database".to_string());
        args.push(path.to_string_lossy().to_string());
    }

    Ok(ToolServerConfig::new(
        configured.name.clone(),
        exe.to_string_lossy().to_string(),
        args,
    ))
}
