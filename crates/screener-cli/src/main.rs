use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use screener_core::{
    Answer, CaptureOutcome, CaptureService, FileCapture, LocalDiscovery, Region, Session,
    SessionController, SessionStore, Settings,
};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;

mod app;
mod commands;
mod markdown;
mod theme;

#[derive(Parser)]
#[command(name = "screener")]
#[command(about = "Screener - ask a local vision model about a screenshot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Ollama model to use for this run
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Color theme (dark, light, tokyo-night)
    #[arg(long, global = true)]
    theme: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a screenshot and start a conversation about it (default)
    Capture(CaptureArgs),
    /// Re-open a saved session (the latest one unless an id is given)
    Reopen {
        id: Option<String>,
    },
    /// List saved sessions, newest first
    Sessions,
    /// Delete a saved session
    Delete {
        id: String,
    },
    /// List the configured quick actions
    Actions,
    /// Check that the Ollama server answers
    Ping,
    /// List models installed on the Ollama server
    Models,
}

#[derive(Args, Default)]
struct CaptureArgs {
    /// Use an existing image file instead of running the capture command
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Selection as x,y,width,height
    #[arg(short, long, value_parser = parse_region)]
    region: Option<Region>,

    /// Quick action whose prompt is sent first
    #[arg(short, long, conflicts_with = "prompt")]
    action: Option<String>,

    /// Custom initial prompt
    #[arg(short, long)]
    prompt: Option<String>,

    /// Print the first answer and exit instead of opening the window
    #[arg(long)]
    print: bool,
}

impl Commands {
    fn opens_window(&self) -> bool {
        match self {
            Commands::Capture(args) => !args.print,
            Commands::Reopen { .. } => true,
            _ => false,
        }
    }
}

fn parse_region(s: &str) -> std::result::Result<Region, String> {
    s.parse::<Region>().map_err(|e| e.to_string())
}

/// Logs go to a daily file while the window owns the terminal, otherwise to
/// stderr. The guard must live until exit so buffered lines are flushed.
fn init_tracing(settings: &Settings, interactive: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::EnvFilter;

    if interactive {
        let log_dir = settings.log_dir();
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let appender = tracing_appender::rolling::daily(
                &log_dir,
                screener_core::constants::storage::LOG_FILE_PREFIX,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .with_writer(writer)
                .with_ansi(false)
                .init();
            return Some(guard);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load();
    if let Some(ref model) = cli.model {
        settings = settings.with_model(model)?;
    }
    if let Some(ref theme) = cli.theme {
        settings = settings.with_theme(theme)?;
    }

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Capture(CaptureArgs::default()));
    let _guard = init_tracing(&settings, command.opens_window());

    match command {
        Commands::Capture(args) => capture(settings, args).await,
        Commands::Reopen { id } => reopen(settings, id).await,
        Commands::Sessions => list_sessions(&settings),
        Commands::Delete { id } => {
            open_store(&settings)?.delete(&id)?;
            println!("Deleted session {id}");
            Ok(())
        }
        Commands::Actions => {
            for action in &settings.actions {
                println!("{:<14} {}", action.name, action.description);
            }
            Ok(())
        }
        Commands::Ping => {
            let status =
                LocalDiscovery::ping(&settings.ollama.base_url, settings.ping_timeout()).await;
            println!("{status} ({})", settings.ollama.base_url);
            if !status.is_reachable() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Models => {
            let models =
                LocalDiscovery::list_models(&settings.ollama.base_url, settings.ping_timeout())
                    .await?;
            for model in &models {
                let marker = if *model == settings.ollama.model { "*" } else { " " };
                println!("{marker} {model}");
            }
            if !LocalDiscovery::has_model(&models, &settings.ollama.model) {
                eprintln!(
                    "Configured model '{}' is not installed; run `ollama pull {}`",
                    settings.ollama.model, settings.ollama.model
                );
            }
            Ok(())
        }
    }
}

fn open_store(settings: &Settings) -> Result<SessionStore> {
    let dir = settings.sessions_dir();
    SessionStore::with_dir(&dir)
        .with_context(|| format!("cannot open session directory {}", dir.display()))
}

fn initial_prompt(settings: &Settings, args: &CaptureArgs) -> Result<String> {
    if let Some(ref prompt) = args.prompt {
        return Ok(prompt.clone());
    }
    let action = match args.action {
        Some(ref name) => settings.action(name).with_context(|| {
            let known: Vec<&str> = settings.actions.iter().map(|a| a.name.as_str()).collect();
            format!("unknown action '{}', expected one of: {}", name, known.join(", "))
        })?,
        None => settings
            .default_action()
            .context("no quick actions configured")?,
    };
    Ok(action.prompt.clone())
}

async fn capture(settings: Settings, args: CaptureArgs) -> Result<()> {
    let prompt = initial_prompt(&settings, &args)?;

    let outcome = match args.image {
        Some(ref path) => FileCapture::new(path).capture(args.region)?,
        None => settings.build_capture_command()?.capture(args.region)?,
    };
    let image = match outcome {
        CaptureOutcome::Captured(image) => image,
        CaptureOutcome::Cancelled => {
            println!("Capture cancelled.");
            return Ok(());
        }
    };

    let session = Session::start_with_min_size(
        image,
        &prompt,
        settings.capture.min_width,
        settings.capture.min_height,
    )?;
    let store = open_store(&settings)?;
    let (mut controller, mut replies) = SessionController::new(settings.build_model_client());
    controller.start(session)?;

    if !args.print {
        return app::run_tui(settings, controller, replies, store).await;
    }

    controller.wait_for_reply(&mut replies).await;
    let path = controller.save(&store)?;
    let answer = controller
        .conversation()
        .map(|c| c.root().answer.clone())
        .unwrap_or(Answer::Pending);
    match answer {
        Answer::Answered(text) => {
            println!("{text}");
            eprintln!("Session saved to {}", path.display());
            Ok(())
        }
        Answer::Failed(err) => bail!("{err} (session saved to {})", path.display()),
        Answer::Pending => bail!("no answer received"),
    }
}

async fn reopen(settings: Settings, id: Option<String>) -> Result<()> {
    let store = open_store(&settings)?;
    let session = match id {
        Some(id) => store.load(&id)?,
        None => match store.load_latest()? {
            Some(session) => session,
            None => {
                println!("No saved sessions in {}", store.base_dir().display());
                return Ok(());
            }
        },
    };

    let (mut controller, replies) = SessionController::new(settings.build_model_client());
    controller.open(session);
    app::run_tui(settings, controller, replies, store).await
}

fn list_sessions(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No saved sessions in {}", store.base_dir().display());
        return Ok(());
    }
    for s in sessions {
        let prompt: String = s.initial_prompt.chars().take(50).collect();
        println!(
            "{}  {}  {:>3} turns  {}",
            s.id,
            s.saved_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M"),
            s.turn_count,
            prompt
        );
    }
    Ok(())
}
