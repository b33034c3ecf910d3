//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use cohort_core::config;

mod commands;

#[derive(Parser)]
#[command(name = "cohort")]
#[command(version)]
#[command(about = "Terminal client for the campus multi-agent chat platform")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Open a specific session instead of the active one
    #[arg(long, value_name = "ID", global = true)]
    session: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Chat with the platform agents (default command)
    Chat,

    /// Log in and store the issued tokens
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },

    /// Register a new account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long = "student-id")]
        student_id: String,
        #[arg(long)]
        college: String,
        #[arg(long = "class-name")]
        class_name: String,
    },

    /// Log out and clear the stored tokens
    Logout,

    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// List the platform's active agents
    Agents,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum SessionCommands {
    /// Lists known sessions
    List,
    /// Starts a fresh session and makes it active
    New,
    /// Switches the active session
    Switch {
        #[arg(value_name = "SESSION_ID")]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

/// Logs go to stderr so streamed replies on stdout stay clean.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    let Cli { command, session } = cli;

    // default to chat mode
    let Some(command) = command else {
        return commands::chat::run(&config, session.as_deref()).await;
    };

    match command {
        Commands::Chat => commands::chat::run(&config, session.as_deref()).await,

        Commands::Login { username, password } => {
            commands::auth::login(&config, &username, &password).await
        }
        Commands::Register {
            username,
            password,
            email,
            name,
            student_id,
            college,
            class_name,
        } => {
            commands::auth::register(
                &config,
                cohort_core::api::RegisterRequest {
                    username,
                    password,
                    email,
                    name,
                    student_id,
                    college,
                    class_name,
                },
            )
            .await
        }
        Commands::Logout => commands::auth::logout(&config).await,

        Commands::Sessions { command } => match command {
            SessionCommands::List => commands::sessions::list(),
            SessionCommands::New => commands::sessions::new(),
            SessionCommands::Switch { id } => commands::sessions::switch(&id),
        },

        Commands::Agents => commands::agents::list(&config).await,

        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
