//! Session runner - wires the command toolchain into a session controller
//!
//! Triggers come from stdin (`b`/`build`, `a`/`app`, `q`/`quit`) and Ctrl-C.
//! Session events are printed to stderr, or to stdout as NDJSON in headless
//! mode.

use std::sync::Arc;

use tokio::sync::broadcast;

use qdev_app::config::Settings;
use qdev_app::toolchain::{CommandCompiler, CommandEndpointFactory};
use qdev_app::{
    AddressNegotiator, PlatformLauncher, RouteIpResolver, SessionController, SessionEvent,
    SessionOptions, TcpPortProber, Trigger, TriggerSender,
};
use qdev_core::prelude::*;
use qdev_daemon::SystemRunner;

use crate::headless::HeadlessEvent;

/// Run one dev session until quit, Ctrl-C or a fatal error
pub async fn run_session(
    options: SessionOptions,
    settings: Settings,
    headless: bool,
) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("qdev starting {} session", options.mode);
    info!("Project: {}", options.project_root.display());
    info!("═══════════════════════════════════════════════════════");

    let runner = Arc::new(SystemRunner::new());
    let compiler = CommandCompiler::new(
        runner.clone(),
        options.project_root.clone(),
        settings.build.clone(),
        settings.hooks.clone(),
        settings.dev.devtools,
    );
    let factory = CommandEndpointFactory::new(
        runner.clone(),
        options.project_root.clone(),
        settings.serve.clone(),
    );
    let negotiator = AddressNegotiator::new(
        Box::new(TcpPortProber),
        Box::new(RouteIpResolver::default()),
    )
    .with_port_search_limit(settings.dev.port_search_limit);
    let launcher =
        PlatformLauncher::for_mode(options.mode, options.target, &settings, runner.clone())?;

    let controller = SessionController::new(options, compiler, factory, negotiator, launcher);

    let printer = tokio::spawn(print_events(controller.subscribe(), headless));

    let stdin_tx = controller.trigger_sender();
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(stdin_tx);
    });

    let signal_tx = controller.trigger_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = signal_tx.send(Trigger::Shutdown);
        }
    });

    let result = controller.run().await;

    // Anything a launcher or endpoint left behind.
    runner.shutdown_all().await;
    if let Err(e) = printer.await {
        warn!("Event printer task failed: {}", e);
    }

    info!("qdev exiting");
    result
}

/// Print session events until the controller is gone
async fn print_events(mut events: broadcast::Receiver<SessionEvent>, headless: bool) {
    loop {
        match events.recv().await {
            Ok(event) if headless => HeadlessEvent::from(&event).emit(),
            Ok(event) => print_notice(&event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Dropped {} session events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_notice(event: &SessionEvent) {
    match event {
        SessionEvent::PortSubstituted { message, .. } => eprintln!("⚠️  {}", message),
        SessionEvent::AddressFailed { message, fatal } => {
            if *fatal {
                eprintln!("❌ Could not start the dev server: {}", message);
            } else {
                eprintln!("⚠️  {} (still serving the previous build)", message);
            }
        }
        SessionEvent::Listening { url, .. } => eprintln!("✅ Dev server listening at {}", url),
        SessionEvent::Error { message, fatal } => {
            if *fatal {
                eprintln!("❌ {}", message);
            } else {
                eprintln!("⚠️  {}", message);
            }
        }
        _ => {}
    }
}

/// Map one stdin line to a trigger
fn parse_trigger(line: &str) -> Option<Trigger> {
    match line.trim() {
        "b" | "build" => Some(Trigger::BuildChanged),
        "a" | "app" => Some(Trigger::AppChanged),
        "q" | "quit" => Some(Trigger::Shutdown),
        _ => None,
    }
}

/// Read trigger commands from stdin (blocking, runs on its own thread)
fn spawn_stdin_reader_blocking(tx: TriggerSender) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_trigger(trimmed) {
                    Some(trigger) => {
                        info!("Stdin: {:?} requested", trigger);
                        if tx.send(trigger).is_err() || trigger == Trigger::Shutdown {
                            break;
                        }
                    }
                    None => warn!("Unknown stdin command: {}", trimmed),
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}
