use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use toolchat_agent::{PlainChat, ToolChatAgent};
use toolchat_config::{load_dotenv, AppConfig, Credentials};
use toolchat_conversation::ConversationState;
use toolchat_llm::{GroqClient, LlmClient};
use toolchat_mcp::{McpConfig, RetryPolicy, ServerPool};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "toolchat")]
#[command(about = "Chat with a hosted LLM that can call MCP tool servers", long_about = None)]
struct Cli {
    /// Application config (YAML); defaults to ~/.toolchat/toolchat.yaml when present
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tool-server descriptor, overriding `mcp.config_file`
    #[arg(short, long, value_name = "FILE")]
    servers: Option<PathBuf>,

    #[arg(long, value_name = "FILE", default_value = ".env")]
    env_file: PathBuf,

    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive conversation
    Chat {
        /// Stream replies without tool servers
        #[arg(long, action = clap::ArgAction::SetTrue)]
        plain: bool,
    },

    /// Answer a single prompt and exit
    Ask {
        prompt: String,

        #[arg(long, action = clap::ArgAction::SetTrue)]
        plain: bool,
    },

    /// Start the tool servers and list their tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    load_dotenv(&cli.env_file)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Tools => list_tools(&config, cli.servers.as_deref()).await,
        Commands::Chat { plain: true } => plain_chat(llm_client(&config)?, None).await,
        Commands::Ask { prompt, plain: true } => plain_chat(llm_client(&config)?, Some(prompt)).await,
        Commands::Chat { plain: false } => {
            tool_chat(&config, cli.servers.as_deref(), llm_client(&config)?, None).await
        }
        Commands::Ask { prompt, plain: false } => {
            tool_chat(&config, cli.servers.as_deref(), llm_client(&config)?, Some(prompt)).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        info!("Loading configuration from: {:?}", path);
        return AppConfig::from_yaml(path)
            .with_context(|| format!("Failed to load {}", path.display()));
    }

    let default_path = AppConfig::default_config_path();
    if default_path.exists() {
        info!("Loading configuration from: {:?}", default_path);
        Ok(AppConfig::from_yaml(&default_path)?)
    } else {
        info!("Using default configuration");
        Ok(AppConfig::default())
    }
}

fn llm_client(config: &AppConfig) -> Result<Arc<dyn LlmClient>> {
    let credentials = Credentials::from_env(&config.llm.api_key_env)?;
    Ok(Arc::new(GroqClient::new(config.llm.clone(), credentials)?))
}

async fn start_servers(config: &AppConfig, servers: Option<&Path>) -> Result<ServerPool> {
    let path = servers.unwrap_or(config.mcp.config_file.as_path());
    let mcp_config = McpConfig::load_from_file(path).await?;

    let mut pool = ServerPool::from_config(&mcp_config, RetryPolicy::from(&config.mcp.retry));
    pool.initialize_all(config.mcp.startup_policy).await?;
    Ok(pool)
}

async fn list_tools(config: &AppConfig, servers: Option<&Path>) -> Result<()> {
    let pool = start_servers(config, servers).await?;

    let mut outcome = Ok(());
    for name in pool.server_names() {
        let Some(server) = pool.get(&name) else { continue };
        match server.list_tools().await {
            Ok(tools) => {
                println!("\n{} ({} tools)", name, tools.len());
                println!("═══════════════════════════════════════");
                for tool in tools {
                    print!("{}", tool.format_for_llm());
                }
            }
            Err(e) => {
                outcome = Err(e.into());
                break;
            }
        }
    }

    pool.cleanup_all().await;
    outcome
}

async fn tool_chat(
    config: &AppConfig,
    servers: Option<&Path>,
    llm: Arc<dyn LlmClient>,
    prompt: Option<String>,
) -> Result<()> {
    let pool = start_servers(config, servers).await?;
    let mut agent = ToolChatAgent::new(llm, pool.tool_servers());

    if let Err(e) = agent.prepare().await {
        pool.cleanup_all().await;
        return Err(e.into());
    }

    let mut state = ConversationState::new();

    let outcome = match prompt {
        Some(prompt) => {
            println!("{}", agent.process_message(&mut state, &prompt).await);
            Ok(())
        }
        None => {
            println!("toolchat ({} tool servers)", pool.len());
            println!("Type 'exit' or 'quit' to end the conversation");
            println!("═══════════════════════════════════════\n");

            loop {
                let input = match read_input() {
                    Ok(Some(input)) => input,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                };
                let answer = agent.process_message(&mut state, &input).await;
                println!("\nAssistant> {answer}\n");
            }
        }
    };

    pool.cleanup_all().await;
    outcome
}

async fn plain_chat(llm: Arc<dyn LlmClient>, prompt: Option<String>) -> Result<()> {
    let chat = PlainChat::new(llm);
    let mut state = ConversationState::new();

    if prompt.is_none() {
        println!("toolchat (plain)");
        println!("Type 'exit' or 'quit' to end the conversation");
        println!("═══════════════════════════════════════\n");
    }

    let single_shot = prompt.is_some();
    let mut pending = prompt;

    loop {
        let input = match pending.take() {
            Some(input) => input,
            None if single_shot => break,
            None => match read_input()? {
                Some(input) => input,
                None => break,
            },
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let printer = tokio::spawn(async move {
            while let Some(fragment) = rx.recv().await {
                print!("{fragment}");
                io::stdout().flush().ok();
            }
        });

        if !single_shot {
            print!("\nAssistant> ");
            io::stdout().flush()?;
        }

        let answer = chat.send(&mut state, &input, tx).await;
        if let Err(e) = printer.await {
            warn!("Output task failed: {}", e);
        }
        if answer.starts_with("Error processing message:") {
            print!("{answer}");
        }
        println!("\n");
    }

    Ok(())
}

/// Read one line from stdin; `None` on end of input or an exit command.
fn read_input() -> Result<Option<String>> {
    loop {
        print!("You> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            return Ok(None);
        }

        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            return Ok(None);
        }
        if !input.is_empty() {
            return Ok(Some(input.to_string()));
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(())
}
