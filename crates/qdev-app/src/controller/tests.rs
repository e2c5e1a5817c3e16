use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use qdev_core::{Address, DevMode, MobileTarget};
use qdev_daemon::test_utils::{RecordingRunner, RunnerCall};
use tokio::sync::broadcast::error::TryRecvError;

use super::*;
use crate::collaborators::{hook_fn, BuildConfig, HookFn};
use crate::config::Settings;
use crate::network::{IpResolver, PortProber, PortStatus};

type Journal = Arc<Mutex<Vec<String>>>;

fn record(journal: &Journal, entry: impl Into<String>) {
    journal.lock().unwrap().push(entry.into());
}

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default, Clone)]
struct CompilerScript {
    fail_prepare: bool,
    /// 1-based compile call that fails
    fail_compile_on: Option<usize>,
    fail_before_dev: bool,
    fail_after_dev: bool,
}

/// Triggers a compile call sends while its cycle is still running
type MidCompile = Arc<Mutex<Option<(usize, TriggerSender, Vec<Trigger>)>>>;

struct FakeCompiler {
    journal: Journal,
    compiles: usize,
    script: CompilerScript,
    mid_compile: MidCompile,
}

fn journaling_hook(journal: &Journal, name: &'static str, fail: bool) -> HookFn {
    let journal = journal.clone();
    hook_fn(move |config: BuildConfig| {
        let journal = journal.clone();
        async move {
            tokio::task::yield_now().await;
            let port = config.dev_server.map(|a| a.port).unwrap_or_default();
            record(&journal, format!("{}:{}", name, port));
            if fail {
                Err(Error::process(format!("{} script exited with code 1", name)))
            } else {
                Ok(())
            }
        }
    })
}

impl BuildCompiler for FakeCompiler {
    async fn prepare(&mut self) -> Result<()> {
        record(&self.journal, "prepare");
        if self.script.fail_prepare {
            return Err(Error::compiler("entry point not found"));
        }
        Ok(())
    }

    async fn compile(&mut self) -> Result<()> {
        self.compiles += 1;
        tokio::task::yield_now().await;
        record(&self.journal, "compile");

        let queued = {
            let mut slot = self.mid_compile.lock().unwrap();
            match slot.as_ref() {
                Some((call, _, _)) if *call == self.compiles => slot.take(),
                _ => None,
            }
        };
        if let Some((_, tx, triggers)) = queued {
            for trigger in triggers {
                tx.send(trigger).unwrap();
            }
        }

        if self.script.fail_compile_on == Some(self.compiles) {
            return Err(Error::process("bundler exited with code 2"));
        }
        Ok(())
    }

    async fn regenerate_app(&mut self) -> Result<()> {
        tokio::task::yield_now().await;
        record(&self.journal, "regenerate");
        Ok(())
    }

    fn build_config(&self) -> BuildConfig {
        BuildConfig {
            before_dev: Some(journaling_hook(
                &self.journal,
                "beforeDev",
                self.script.fail_before_dev,
            )),
            after_dev: Some(journaling_hook(
                &self.journal,
                "afterDev",
                self.script.fail_after_dev,
            )),
            devtools: false,
            dev_server: None,
        }
    }
}

struct FakeEndpoint {
    journal: Journal,
    address: Address,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    fail_listen: bool,
    listening: bool,
}

impl ServingEndpoint for FakeEndpoint {
    async fn listen(&mut self) -> Result<()> {
        tokio::task::yield_now().await;
        if self.fail_listen {
            record(&self.journal, format!("listen-failed:{}", self.address.port));
            return Err(Error::endpoint(format!("{} refused to bind", self.address)));
        }
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.listening = true;
        record(&self.journal, format!("listen:{}", self.address.port));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        tokio::task::yield_now().await;
        if self.listening {
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.listening = false;
        }
        record(&self.journal, format!("stop:{}", self.address.port));
        Ok(())
    }
}

struct FakeFactory {
    journal: Journal,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    created: AtomicUsize,
    /// 1-based endpoint whose `listen` fails
    fail_listen_on: Option<usize>,
}

impl EndpointFactory for FakeFactory {
    type Endpoint = FakeEndpoint;

    fn create(&self, _config: &BuildConfig, address: &Address) -> Result<FakeEndpoint> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakeEndpoint {
            journal: self.journal.clone(),
            address: address.clone(),
            live: self.live.clone(),
            peak: self.peak.clone(),
            fail_listen: self.fail_listen_on == Some(n),
            listening: false,
        })
    }
}

/// Pops scripted probe results, then reports every port free
struct ScriptedProber {
    script: Mutex<VecDeque<PortStatus>>,
}

impl PortProber for ScriptedProber {
    fn probe(&self, _host: &str, _port: u16) -> PortStatus {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PortStatus::Free)
    }
}

struct CountingResolver {
    calls: Arc<AtomicUsize>,
    ip: Option<&'static str>,
}

impl IpResolver for CountingResolver {
    fn external_ip(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ip
            .map(str::to_string)
            .ok_or_else(|| Error::address_unavailable("external", "no routable interface"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

type TestController = SessionController<FakeCompiler, FakeFactory, RecordingRunner>;

struct Setup {
    options: SessionOptions,
    script: CompilerScript,
    probes: Vec<PortStatus>,
    port_search_limit: u16,
    external_ip: Option<&'static str>,
    fail_listen_on: Option<usize>,
    runner: RecordingRunner,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            options: SessionOptions::default(),
            script: CompilerScript::default(),
            probes: Vec::new(),
            port_search_limit: u16::MAX,
            external_ip: None,
            fail_listen_on: None,
            runner: RecordingRunner::new(),
        }
    }
}

struct Harness {
    journal: Journal,
    peak: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    discoveries: Arc<AtomicUsize>,
    runner: Arc<RecordingRunner>,
    mid_compile: MidCompile,
}

impl Harness {
    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.journal().iter().filter(|e| *e == entry).count()
    }

    /// Have the `call`-th compile send `triggers` before it returns
    fn send_during_compile(&self, call: usize, tx: TriggerSender, triggers: &[Trigger]) {
        *self.mid_compile.lock().unwrap() = Some((call, tx, triggers.to_vec()));
    }
}

fn build(setup: Setup) -> (TestController, Harness) {
    let journal: Journal = Arc::default();
    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let discoveries = Arc::new(AtomicUsize::new(0));
    let runner = Arc::new(setup.runner);
    let mid_compile: MidCompile = Arc::default();

    let compiler = FakeCompiler {
        journal: journal.clone(),
        compiles: 0,
        script: setup.script,
        mid_compile: mid_compile.clone(),
    };
    let factory = FakeFactory {
        journal: journal.clone(),
        live: live.clone(),
        peak: peak.clone(),
        created: AtomicUsize::new(0),
        fail_listen_on: setup.fail_listen_on,
    };
    let negotiator = AddressNegotiator::new(
        Box::new(ScriptedProber {
            script: Mutex::new(setup.probes.into()),
        }),
        Box::new(CountingResolver {
            calls: discoveries.clone(),
            ip: setup.external_ip,
        }),
    )
    .with_port_search_limit(setup.port_search_limit);
    let launcher = PlatformLauncher::for_mode(
        setup.options.mode,
        setup.options.target,
        &Settings::default(),
        runner.clone(),
    )
    .unwrap();

    let controller = SessionController::new(setup.options, compiler, factory, negotiator, launcher);
    let harness = Harness {
        journal,
        peak,
        live,
        discoveries,
        runner,
        mid_compile,
    };
    (controller, harness)
}

/// Queue `triggers`, close the chain and run the session to completion
async fn run_with(controller: TestController, triggers: &[Trigger]) -> Result<()> {
    let tx = controller.trigger_sender();
    for trigger in triggers {
        tx.send(*trigger).unwrap();
    }
    drop(tx);
    controller.run().await
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(n)) => panic!("lagged {} events", n),
        }
    }
    events
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle ordering
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_cycle_runs_hooks_around_listen() {
    let (controller, h) = build(Setup::default());
    assert_eq!(controller.session().phase, SessionPhase::Idle);

    run_with(controller, &[]).await.unwrap();

    assert_eq!(
        h.journal(),
        vec![
            "prepare",
            "compile",
            "beforeDev:9000",
            "listen:9000",
            "afterDev:9000",
            "stop:9000",
        ]
    );
}

#[tokio::test]
async fn test_hooks_run_once_across_rebuilds() {
    let (controller, h) = build(Setup::default());

    run_with(
        controller,
        &[Trigger::BuildChanged, Trigger::BuildChanged, Trigger::Shutdown],
    )
    .await
    .unwrap();

    assert_eq!(
        h.journal(),
        vec![
            "prepare",
            "compile",
            "beforeDev:9000",
            "listen:9000",
            "afterDev:9000",
            "compile",
            "stop:9000",
            "listen:9000",
            "compile",
            "stop:9000",
            "listen:9000",
            "stop:9000",
        ]
    );
    assert_eq!(h.peak.load(Ordering::SeqCst), 1);
    assert_eq!(h.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_app_changed_runs_after_queued_restart_settles() {
    let (controller, h) = build(Setup::default());

    run_with(
        controller,
        &[Trigger::BuildChanged, Trigger::AppChanged, Trigger::Shutdown],
    )
    .await
    .unwrap();

    let journal = h.journal();
    let regenerate = journal.iter().position(|e| e == "regenerate").unwrap();
    let last_listen = journal.iter().rposition(|e| e == "listen:9000").unwrap();
    assert!(regenerate > last_listen, "{:?}", journal);
    assert_eq!(h.count("listen:9000"), 2);
    assert_eq!(h.count("compile"), 2);
}

#[tokio::test]
async fn test_app_changed_mid_restart_waits_for_the_cycle() {
    let (controller, h) = build(Setup::default());
    h.send_during_compile(2, controller.trigger_sender(), &[Trigger::AppChanged]);

    run_with(controller, &[Trigger::BuildChanged]).await.unwrap();

    assert_eq!(
        h.journal(),
        vec![
            "prepare",
            "compile",
            "beforeDev:9000",
            "listen:9000",
            "afterDev:9000",
            "compile",
            "stop:9000",
            "listen:9000",
            "regenerate",
            "stop:9000",
        ]
    );
    assert!(h.mid_compile.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_stops_draining_the_chain() {
    let (controller, h) = build(Setup::default());

    run_with(controller, &[Trigger::Shutdown, Trigger::BuildChanged])
        .await
        .unwrap();

    assert_eq!(h.count("compile"), 1);
    assert_eq!(h.journal().last().map(String::as_str), Some("stop:9000"));
}

#[tokio::test]
async fn test_phase_events_for_first_cycle() {
    let (controller, _h) = build(Setup::default());
    let mut rx = controller.subscribe();

    run_with(controller, &[]).await.unwrap();

    let phases: Vec<SessionPhase> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::PhaseChanged { new_phase, .. } => Some(new_phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            SessionPhase::Resolving,
            SessionPhase::Building,
            SessionPhase::Starting,
            SessionPhase::Listening,
            SessionPhase::Stopping,
            SessionPhase::Idle,
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Address negotiation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_port_substitution_is_reported_once() {
    let (controller, h) = build(Setup {
        options: SessionOptions {
            host: Some("127.0.0.1".into()),
            port: Some(8080),
            ..Default::default()
        },
        probes: vec![PortStatus::Occupied, PortStatus::Free],
        ..Default::default()
    });
    let mut rx = controller.subscribe();

    run_with(controller, &[]).await.unwrap();

    let substitutions: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::PortSubstituted { .. }))
        .collect();
    assert_eq!(substitutions.len(), 1);
    assert!(matches!(
        substitutions[0],
        SessionEvent::PortSubstituted {
            requested: 8080,
            resolved: 8081,
            ..
        }
    ));
    assert_eq!(h.count("listen:8081"), 1);
}

#[tokio::test]
async fn test_rebuild_returns_to_requested_port_once_free() {
    let (controller, h) = build(Setup {
        options: SessionOptions {
            port: Some(8080),
            ..Default::default()
        },
        probes: vec![PortStatus::Occupied, PortStatus::Free],
        ..Default::default()
    });

    run_with(controller, &[Trigger::BuildChanged]).await.unwrap();

    let journal = h.journal();
    let tail: Vec<&str> = journal[journal.len() - 3..]
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(tail, vec!["stop:8081", "listen:8080", "stop:8080"]);
}

#[tokio::test]
async fn test_first_resolution_failure_is_fatal() {
    let (controller, h) = build(Setup {
        options: SessionOptions {
            host: Some("10.254.0.9".into()),
            ..Default::default()
        },
        probes: vec![PortStatus::HostUnavailable(
            "Cannot assign requested address".into(),
        )],
        ..Default::default()
    });
    let mut rx = controller.subscribe();

    let err = run_with(controller, &[Trigger::BuildChanged])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NetworkAddressUnavailable { .. }));
    assert_eq!(h.journal(), vec!["prepare"]);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::AddressFailed { fatal: true, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::PhaseChanged {
            new_phase: SessionPhase::Failed,
            ..
        }
    )));
    // Reported once, as an address failure.
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::Error { .. })));
}

#[tokio::test]
async fn test_no_free_port_is_fatal() {
    let (controller, h) = build(Setup {
        probes: vec![PortStatus::Occupied; 3],
        port_search_limit: 9002,
        ..Default::default()
    });

    let err = run_with(controller, &[]).await.unwrap_err();

    match err {
        Error::NetworkPortUnavailable { port, .. } => assert_eq!(port, 9000),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.count("compile"), 0);
}

#[tokio::test]
async fn test_later_resolution_failure_keeps_endpoint_serving() {
    let (controller, h) = build(Setup {
        options: SessionOptions {
            port: Some(8080),
            ..Default::default()
        },
        // First cycle lands on 8081; the second hits a socket error on 8080.
        probes: vec![
            PortStatus::Occupied,
            PortStatus::Free,
            PortStatus::Failed("Network is down".into()),
        ],
        ..Default::default()
    });
    let mut rx = controller.subscribe();

    run_with(controller, &[Trigger::BuildChanged, Trigger::Shutdown])
        .await
        .unwrap();

    assert_eq!(
        h.journal(),
        vec![
            "prepare",
            "compile",
            "beforeDev:8081",
            "listen:8081",
            "afterDev:8081",
            "stop:8081",
        ]
    );
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::AddressFailed { fatal: false, .. })));
}

#[tokio::test]
async fn test_mobile_discovery_happens_once_per_session() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("src-capacitor")).unwrap();

    let (controller, h) = build(Setup {
        options: SessionOptions {
            mode: DevMode::Capacitor,
            target: Some(MobileTarget::Android),
            project_root: root.path().to_path_buf(),
            ..Default::default()
        },
        external_ip: Some("192.168.1.50"),
        ..Default::default()
    });
    let mut rx = controller.subscribe();

    run_with(controller, &[Trigger::BuildChanged, Trigger::BuildChanged])
        .await
        .unwrap();

    assert_eq!(h.discoveries.load(Ordering::SeqCst), 1);
    assert_eq!(h.count("listen:9000"), 3);

    let listening: Vec<Address> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Listening { address, .. } => Some(address),
            _ => None,
        })
        .collect();
    assert_eq!(listening, vec![Address::new("192.168.1.50", 9000); 3]);

    let lines = h.runner.command_lines();
    let syncs = lines.iter().filter(|l| *l == "npx cap sync android").count();
    let opens = lines.iter().filter(|l| *l == "npx cap open android").count();
    assert_eq!((syncs, opens), (3, 1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure policy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_prepare_failure_is_fatal() {
    let (controller, h) = build(Setup {
        script: CompilerScript {
            fail_prepare: true,
            ..Default::default()
        },
        ..Default::default()
    });

    let err = run_with(controller, &[]).await.unwrap_err();

    assert!(matches!(err, Error::Compiler { .. }));
    assert_eq!(h.journal(), vec!["prepare"]);
}

#[tokio::test]
async fn test_compiler_failure_is_fatal_after_listening() {
    let (controller, h) = build(Setup {
        script: CompilerScript {
            fail_compile_on: Some(2),
            ..Default::default()
        },
        ..Default::default()
    });
    let mut rx = controller.subscribe();

    let err = run_with(controller, &[Trigger::BuildChanged, Trigger::BuildChanged])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Compiler { ref message } if message.contains("bundler")));
    assert_eq!(h.count("compile"), 2);
    // The old endpoint is still released on the way out.
    assert_eq!(h.journal().last().map(String::as_str), Some("stop:9000"));
    assert_eq!(h.live.load(Ordering::SeqCst), 0);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::Error { fatal: true, .. })));
}

#[tokio::test]
async fn test_before_dev_failure_is_fatal() {
    let (controller, h) = build(Setup {
        script: CompilerScript {
            fail_before_dev: true,
            ..Default::default()
        },
        ..Default::default()
    });

    let err = run_with(controller, &[]).await.unwrap_err();

    match err {
        Error::Hook { phase, origin, .. } => {
            assert_eq!(phase, HookPhase::BeforeDev);
            assert_eq!(origin, "user config");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.count("listen:9000"), 0);
}

#[tokio::test]
async fn test_after_dev_failure_is_logged_not_fatal() {
    let (controller, h) = build(Setup {
        script: CompilerScript {
            fail_after_dev: true,
            ..Default::default()
        },
        ..Default::default()
    });
    let mut rx = controller.subscribe();

    run_with(controller, &[Trigger::BuildChanged]).await.unwrap();

    assert_eq!(h.count("afterDev:9000"), 1);
    assert_eq!(h.count("listen:9000"), 2);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::Error { fatal: false, .. })));
}

#[tokio::test]
async fn test_first_listen_failure_is_fatal() {
    let (controller, h) = build(Setup {
        fail_listen_on: Some(1),
        ..Default::default()
    });

    let err = run_with(controller, &[]).await.unwrap_err();

    assert!(matches!(err, Error::Endpoint { .. }));
    assert_eq!(h.count("afterDev:9000"), 0);
}

#[tokio::test]
async fn test_later_listen_failure_recovers_on_next_build() {
    let (controller, h) = build(Setup {
        fail_listen_on: Some(2),
        ..Default::default()
    });

    run_with(controller, &[Trigger::BuildChanged, Trigger::BuildChanged])
        .await
        .unwrap();

    assert_eq!(h.count("listen-failed:9000"), 1);
    assert_eq!(h.count("listen:9000"), 2);
    assert_eq!(h.peak.load(Ordering::SeqCst), 1);
    assert_eq!(h.live.load(Ordering::SeqCst), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Platform launcher
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_launcher_init_failure_is_fatal() {
    let (controller, h) = build(Setup {
        options: SessionOptions {
            mode: DevMode::Electron,
            ..Default::default()
        },
        runner: RecordingRunner::new().with_missing_tool("electron"),
        ..Default::default()
    });

    let err = run_with(controller, &[]).await.unwrap_err();

    assert!(matches!(err, Error::ToolNotFound { .. }));
    assert_eq!(h.journal(), vec!["prepare"]);
}

#[tokio::test]
async fn test_launcher_runs_after_every_listen() {
    let (controller, h) = build(Setup {
        options: SessionOptions {
            mode: DevMode::Electron,
            extra_args: vec!["--no-sandbox".into()],
            ..Default::default()
        },
        ..Default::default()
    });

    run_with(controller, &[Trigger::BuildChanged]).await.unwrap();

    let calls = h.runner.calls();
    let spawns = calls
        .iter()
        .filter(|c| matches!(c, RunnerCall::Spawn(..)))
        .count();
    assert_eq!(spawns, 2);
    assert_eq!(
        h.runner.command_lines()[0],
        "electron .qdev/electron/electron-main.js --no-sandbox"
    );
    assert_eq!(h.runner.live_processes(), 0);
}

#[tokio::test]
async fn test_devtools_flag_reaches_platform_shell() {
    let (controller, h) = build(Setup {
        options: SessionOptions {
            mode: DevMode::Electron,
            devtools: true,
            ..Default::default()
        },
        ..Default::default()
    });

    run_with(controller, &[]).await.unwrap();

    let RunnerCall::Spawn(command, _) = &h.runner.calls()[0] else {
        panic!("expected spawn");
    };
    assert_eq!(command.env_value(crate::launcher::DEVTOOLS_ENV), Some("1"));
}
