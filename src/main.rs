//! qdev - Development-session orchestrator
//!
//! This is the binary entry point. All logic lives in the library crates.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use qdev_app::config::{init_config_dir, load_settings, CONFIG_FILENAME, QDEV_DIR};
use qdev_app::SessionOptions;
use qdev_core::{logging, DevMode, MobileTarget};

/// qdev - dev server, rebuilds and platform shells in one session
#[derive(Parser, Debug)]
#[command(name = "qdev")]
#[command(about = "Run a development session: dev server, rebuilds and platform shells", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Project directory (defaults to the current directory)
    #[arg(short, long, value_name = "PATH", global = true)]
    project: Option<PathBuf>,

    /// What to serve: spa, ssr, pwa, cordova, capacitor or electron
    #[arg(short, long, default_value = "spa")]
    mode: DevMode,

    /// Native platform for cordova and capacitor: android or ios
    #[arg(short = 'T', long)]
    target: Option<MobileTarget>,

    /// Host to bind (loopback names bind all interfaces)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to bind; the next free port is used when it is taken
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Open devtools in the platform shell
    #[arg(short, long)]
    devtools: bool,

    /// Run in headless mode (JSON events on stdout)
    #[arg(long)]
    headless: bool,

    /// Extra arguments forwarded to the platform launcher (after `--`)
    #[arg(last = true, value_name = "ARGS")]
    extra: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default .qdev/config.toml
    Init,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let project = args
        .project
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(Command::Init) = args.command {
        if init_config_dir(&project)? {
            eprintln!("✅ Created {}/{}", QDEV_DIR, CONFIG_FILENAME);
        } else {
            eprintln!("{}/{} already exists", QDEV_DIR, CONFIG_FILENAME);
        }
        return Ok(());
    }

    logging::init()?;
    if !args.headless {
        if let Ok(log_file) = logging::get_current_log_file() {
            eprintln!("Logging to {}", log_file.display());
        }
    }

    let settings = load_settings(&project);
    let options = SessionOptions {
        host: args.host.or_else(|| settings.dev.host.clone()),
        port: args.port.or(settings.dev.port),
        mode: args.mode,
        target: args.target,
        devtools: args.devtools || settings.dev.devtools,
        extra_args: args.extra,
        project_root: project,
    };

    qdev::run_session(options, settings, args.headless).await?;
    Ok(())
}
