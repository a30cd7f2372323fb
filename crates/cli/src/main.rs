use clap::{Parser, Subcommand};
use lib::api::BackendClient;
use lib::session::ChatSession;

#[derive(Parser)]
#[command(name = "aura")]
#[command(about = "Aura CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: AURA_CONFIG_PATH or ~/.aura/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Chat with the assistant backend (interactive).
    Chat {
        /// Config file path (default: AURA_CONFIG_PATH or ~/.aura/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Optional existing thread id to continue.
        #[arg(long, value_name = "ID")]
        thread: Option<String>,
    },

    /// List threads stored on the backend.
    Threads {
        /// Config file path (default: AURA_CONFIG_PATH or ~/.aura/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run backend diagnostics and print the step log.
    Diagnose {
        /// Config file path (default: AURA_CONFIG_PATH or ~/.aura/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("aura {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, thread }) => {
            if let Err(e) = run_chat(config, thread).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Threads { config }) => {
            if let Err(e) = run_threads(config).await {
                log::error!("threads failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Diagnose { config }) => {
            if let Err(e) = run_diagnose(config).await {
                log::error!("diagnose failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = lib::config::init_config(config_path)?;
    println!("initialized configuration at {}", path.display());
    Ok(())
}

fn client_from(config_path: Option<std::path::PathBuf>) -> anyhow::Result<BackendClient> {
    let (config, _) = lib::config::load_config(config_path)?;
    Ok(BackendClient::from_config(&config)?)
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    thread: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let client = client_from(config_path)?;
    let mut session = ChatSession::new();

    if let Some(target) = session.navigate(thread) {
        let result = client
            .thread_history(&target)
            .await
            .map_err(|e| e.to_string());
        session.apply_history(&target, result);
        for m in session.transcript().messages() {
            let prefix = match m.role {
                lib::session::Role::User => ">",
                lib::session::Role::Model => "<",
            };
            println!("{} {}", prefix, m.content.trim());
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/new") {
            session.navigate(None);
            println!("(new conversation)");
            continue;
        }

        let Some(pending) = session.begin_send(input) else {
            continue;
        };
        let result = client
            .send_chat(&pending.text, pending.bound.as_deref())
            .await
            .map_err(|e| e.chat_display());
        if let Some(id) = session.apply_send(result) {
            println!("(thread {})", id);
        }
        if let Some(last) = session.transcript().messages().last() {
            println!("< {}", last.content.trim());
        }
    }

    Ok(())
}

async fn run_threads(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let client = client_from(config_path)?;
    let threads = client.list_threads().await?;
    if threads.is_empty() {
        println!("no threads");
        return Ok(());
    }
    for t in threads {
        println!("{}  {}", t.id, t.title);
    }
    Ok(())
}

async fn run_diagnose(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let client = client_from(config_path)?;
    let report = client.diagnose().await?;
    println!(
        "env api key: {}",
        if report.env_api_key_present { "present" } else { "missing" }
    );
    println!("active model: {}", report.active_model_id);
    for step in &report.logs {
        println!("[{}] {}: {}", step.status, step.step, step.details);
    }
    println!("result: {}", if report.success { "ok" } else { "failed" });
    Ok(())
}
