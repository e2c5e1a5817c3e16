//! Lifecycle hook pipeline and extension registry
//!
//! A hook phase runs the user hook from the build config first (if any), then
//! every extension hook registered for that phase, in registration order.
//! Each body is awaited to completion before the next starts; the first error
//! aborts the rest of the phase.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use qdev_core::prelude::*;
use qdev_core::{DevMode, HookPhase, MobileTarget};

use crate::collaborators::{BuildConfig, HookFn};

/// Who supplied a hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookSource {
    UserConfig,
    Extension(String),
}

impl fmt::Display for HookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookSource::UserConfig => f.write_str("user config"),
            HookSource::Extension(id) => write!(f, "extension \"{}\"", id),
        }
    }
}

/// One hook body bound to its phase and source
#[derive(Clone)]
pub struct HookInvocation {
    pub phase: HookPhase,
    pub source: HookSource,
    body: HookFn,
}

impl HookInvocation {
    pub fn new(phase: HookPhase, source: HookSource, body: HookFn) -> Self {
        Self {
            phase,
            source,
            body,
        }
    }

    /// Run the body, tagging any failure with this hook's phase and source
    pub async fn invoke(&self, config: BuildConfig) -> Result<()> {
        (self.body)(config).await.map_err(|e| match e {
            hook_err @ Error::Hook { .. } => hook_err,
            other => Error::hook(self.phase, self.source.to_string(), other.to_string()),
        })
    }
}

impl fmt::Debug for HookInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookInvocation")
            .field("phase", &self.phase)
            .field("source", &self.source)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extensions
// ─────────────────────────────────────────────────────────────────────────────

/// Session facts handed to extensions when they register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionContext {
    pub mode: DevMode,
    pub target: Option<MobileTarget>,
    pub devtools: bool,
}

/// Registration surface passed to [`Extension::register`]
pub struct ExtensionApi<'a> {
    ctx: &'a ExtensionContext,
    hooks: Vec<(HookPhase, HookFn)>,
}

impl<'a> ExtensionApi<'a> {
    pub fn context(&self) -> &ExtensionContext {
        self.ctx
    }

    pub fn on_before_dev(&mut self, hook: HookFn) {
        self.hooks.push((HookPhase::BeforeDev, hook));
    }

    pub fn on_after_dev(&mut self, hook: HookFn) {
        self.hooks.push((HookPhase::AfterDev, hook));
    }
}

/// A third-party package that contributes lifecycle hooks.
pub trait Extension: Send + Sync {
    /// Stable identity, shown in logs and errors
    fn id(&self) -> &str;

    fn register(&self, api: &mut ExtensionApi<'_>);
}

/// Installed extensions and the hooks they registered
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<dyn Extension>>,
    hooks: Vec<HookInvocation>,
    registered: bool,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an extension; its hooks are collected by `register_extensions`
    pub fn add(&mut self, extension: Arc<dyn Extension>) {
        self.extensions.push(extension);
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Let every extension register its hooks, in installation order.
    ///
    /// Runs once per session; later calls are ignored.
    pub fn register_extensions(&mut self, ctx: &ExtensionContext) {
        if self.registered {
            return;
        }
        self.registered = true;

        for extension in &self.extensions {
            let mut api = ExtensionApi {
                ctx,
                hooks: Vec::new(),
            };
            extension.register(&mut api);
            debug!(
                "Extension {} registered {} hook(s)",
                extension.id(),
                api.hooks.len()
            );
            for (phase, body) in api.hooks {
                self.hooks.push(HookInvocation::new(
                    phase,
                    HookSource::Extension(extension.id().to_string()),
                    body,
                ));
            }
        }
    }

    /// Invoke `callback` once per hook registered for `phase`, in order.
    ///
    /// Stops at the first error.
    pub async fn run_hook<F, Fut>(&self, phase: HookPhase, mut callback: F) -> Result<()>
    where
        F: FnMut(HookInvocation) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        for hook in self.hooks.iter().filter(|h| h.phase == phase) {
            callback(hook.clone()).await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Run every hook of `phase`: the user hook first, then extension hooks.
pub async fn run_phase(
    phase: HookPhase,
    config: &BuildConfig,
    registry: &ExtensionRegistry,
) -> Result<()> {
    let user_hook = match phase {
        HookPhase::BeforeDev => config.before_dev.clone(),
        HookPhase::AfterDev => config.after_dev.clone(),
    };

    if let Some(body) = user_hook {
        info!("Running \"{}\" hook from user config", phase);
        HookInvocation::new(phase, HookSource::UserConfig, body)
            .invoke(config.clone())
            .await?;
    }

    registry
        .run_hook(phase, |hook| {
            let config = config.clone();
            async move {
                info!("Running \"{}\" hook from {}", phase, hook.source);
                hook.invoke(config).await
            }
        })
        .await
}
