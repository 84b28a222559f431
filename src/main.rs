use aideck::cli;
use aideck::config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "aideck", version, about = "Tool-calling agent and activity tracker")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one message to the agent and print its reply
    Chat {
        /// User message to send
        #[arg(short, long)]
        message: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Title for a newly created conversation
        #[arg(long)]
        title: Option<String>,
    },
    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },
    /// Track and analyse activity snapshots
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },
    /// Print the registered tool descriptors as JSON
    Tools,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConversationAction {
    /// List conversations, most recently updated first
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Print a conversation with all its messages
    Show { id: String },
    /// Create an empty conversation and print its id
    New {
        #[arg(long)]
        title: Option<String>,
    },
    /// Delete a conversation and its messages
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum ActivityAction {
    /// Record and categorize one activity snapshot
    Track {
        #[arg(long)]
        app: String,
        #[arg(long, default_value = "")]
        window: String,
        #[arg(long, default_value = "")]
        content: String,
        /// What the user is doing
        #[arg(long)]
        activity: String,
        /// Activity log file (defaults to the data directory's log)
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Summarise tracked time per app and category
    Summary {
        #[arg(long)]
        log: Option<PathBuf>,
        /// ISO-8601 start of the window (inclusive)
        #[arg(long)]
        start: Option<String>,
        /// ISO-8601 end of the window (inclusive)
        #[arg(long)]
        end: Option<String>,
    },
    /// Productivity score, insights and recommendations
    Insights {
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Re-run categorization over uncategorized entries
    Categorize {
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| aideck::aideck_home().join("config.yaml"));

    if let Command::Init { force } = cli.command {
        return cli::init_config(&config_path, force).await;
    }

    let cfg = config::Config::load(&config_path).await?;
    aideck::logs::init(&cfg.logging)?;
    info!(path = %config_path.display(), "configuration loaded");

    match cli.command {
        Command::Chat {
            message,
            conversation,
            title,
        } => cli::chat(&cfg, &message, conversation.as_deref(), title.as_deref()).await,
        Command::Conversations { action } => match action {
            ConversationAction::List { limit, offset } => {
                cli::list_conversations(&cfg, limit, offset)
            }
            ConversationAction::Show { id } => cli::show_conversation(&cfg, &id),
            ConversationAction::New { title } => cli::new_conversation(&cfg, title.as_deref()),
            ConversationAction::Delete { id } => cli::delete_conversation(&cfg, &id),
        },
        Command::Activity { action } => match action {
            ActivityAction::Track {
                app,
                window,
                content,
                activity,
                log,
            } => {
                cli::activity_track(&cfg, log.as_deref(), &app, &window, &content, &activity)
                    .await
            }
            ActivityAction::Summary { log, start, end } => {
                cli::activity_summary(&cfg, log.as_deref(), start.as_deref(), end.as_deref())
                    .await
            }
            ActivityAction::Insights { log } => cli::activity_insights(&cfg, log.as_deref()).await,
            ActivityAction::Categorize { log } => {
                cli::activity_categorize(&cfg, log.as_deref()).await
            }
        },
        Command::Tools => cli::print_tools(&cfg),
        Command::Init { .. } => unreachable!("handled before config load"),
    }
}
