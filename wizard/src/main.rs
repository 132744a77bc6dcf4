//! CloudReactor AWS setup wizard.
//!
//! Interactively configures the AWS resources CloudReactor needs, deploys
//! the permissions stack, and registers a run environment. Answers are saved
//! next to the working directory so the wizard can be resumed.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use wizard::controller;
use wizard::core::property::Registry;
use wizard::exit_codes;
use wizard::inventory;
use wizard::io::aws_cli::AwsCliProviderFactory;
use wizard::io::config::{API_BASE_URL_ENV, DEFAULT_CONFIG_PATH, WizardConfig, load_config};
use wizard::io::console::{Console, TerminalConsole};
use wizard::io::control_plane::HttpControlPlaneFactory;
use wizard::io::interrupt;
use wizard::io::session_store::{LoadOutcome, SessionStore};
use wizard::io::template::MiniJinjaRenderer;
use wizard::logging;
use wizard::provisioning::{CancelToken, SleepTicker};
use wizard::session::{Collaborators, Session};

const WELCOME: &str = "Welcome to the CloudReactor AWS setup wizard!

This wizard helps you set up your AWS environment for use with CloudReactor.
It can create the IAM roles CloudReactor needs to run and monitor tasks, an
ECS cluster and a VPC, then register a Run Environment with CloudReactor.
Your answers are saved so you can stop at any time and pick up where you
left off.
";

#[derive(Parser)]
#[command(
    name = "wizard",
    version,
    about = "Set up an AWS environment for CloudReactor"
)]
struct Cli {
    /// CloudReactor deployment environment the session targets.
    #[arg(long, default_value = "production")]
    environment: String,

    /// Diagnostic log level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List organizations and their run environments, authenticating with
    /// `CLOUDREACTOR_USERNAME` and `CLOUDREACTOR_PASSWORD`.
    ListEnvironments,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
    std::process::exit(exit_codes::OK);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let config = load_config(Path::new(DEFAULT_CONFIG_PATH))?
        .with_env_overrides(std::env::var(API_BASE_URL_ENV).ok());
    info!(api_base_url = %config.api_base_url, "configuration loaded");

    match cli.command {
        Some(Command::ListEnvironments) => cmd_list_environments(&config),
        None => cmd_wizard(&config, &cli.environment),
    }
}

fn cmd_list_environments(config: &WizardConfig) -> Result<()> {
    let mut client = inventory::client_from_env(&config.api_base_url)?;
    let stdout = std::io::stdout();
    inventory::list_environments(&mut client, &mut stdout.lock())
}

fn cmd_wizard(config: &WizardConfig, environment: &str) -> Result<()> {
    let registry = Registry::standard().context("build property registry")?;
    let store = SessionStore::new(config.session_path.clone());
    let (mut session, outcome) = Session::open(store, registry, environment)?;

    let mut console = TerminalConsole::stdio();
    console.say(WELCOME);
    match outcome {
        LoadOutcome::Fresh => console.say("No save file found, starting a new save file.\n"),
        LoadOutcome::Restored => info!(path = %config.session_path.display(), "session restored"),
        LoadOutcome::Discarded(reason) => {
            info!(%reason, "saved session discarded");
            console.say("Couldn't read save file, starting over. Sorry about that!\n");
        }
    }
    if environment != "production" {
        console.say(&format!("Using deployment environment '{environment}'\n"));
    }

    let providers = AwsCliProviderFactory::new(config.aws_cli.clone());
    let control_plane = HttpControlPlaneFactory::new(config.api_base_url.clone());
    let templates = MiniJinjaRenderer::new().context("load stack templates")?;
    let ticker = SleepTicker;
    let cancel = CancelToken::default();
    interrupt::install(cancel.clone())?;

    let mut deps = Collaborators {
        console: &mut console,
        providers: &providers,
        control_plane: &control_plane,
        templates: &templates,
        ticker: &ticker,
        cancel,
        poll_interval: config.poll_interval(),
    };
    controller::run(&mut session, &mut deps)
}
