//! Contracts for the external services a session drives
//!
//! The session never compiles or serves anything itself. A [`BuildCompiler`]
//! produces build output and the [`BuildConfig`] snapshot; an
//! [`EndpointFactory`] turns that snapshot plus a resolved address into a
//! [`ServingEndpoint`].

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use qdev_core::prelude::*;
use qdev_core::Address;

/// Future returned by a lifecycle hook body
pub type HookFuture = BoxFuture<'static, Result<()>>;

/// Asynchronous lifecycle callback receiving the current build config
pub type HookFn = Arc<dyn Fn(BuildConfig) -> HookFuture + Send + Sync>;

/// Wrap an async closure as a [`HookFn`]
pub fn hook_fn<F, Fut>(f: F) -> HookFn
where
    F: Fn(BuildConfig) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |config| Box::pin(f(config)))
}

/// Snapshot of the build configuration for one cycle
#[derive(Clone, Default)]
pub struct BuildConfig {
    /// `build.beforeDev`: runs once before the first dev server start
    pub before_dev: Option<HookFn>,
    /// `build.afterDev`: runs once after the first successful start
    pub after_dev: Option<HookFn>,
    /// Devtools toggle forwarded to platform shells
    pub devtools: bool,
    /// Address the dev server of this cycle binds, once resolved
    pub dev_server: Option<Address>,
}

impl BuildConfig {
    /// URL a browser or platform shell should load
    pub fn app_url(&self) -> Option<String> {
        self.dev_server.as_ref().map(Address::http_url)
    }
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("before_dev", &self.before_dev.is_some())
            .field("after_dev", &self.after_dev.is_some())
            .field("devtools", &self.devtools)
            .field("dev_server", &self.dev_server)
            .finish()
    }
}

/// Produces the build output the dev server serves.
#[trait_variant::make(BuildCompiler: Send)]
pub trait LocalBuildCompiler {
    /// One-time preparation at session start
    async fn prepare(&mut self) -> Result<()>;

    /// Regenerate all build-dependent output ("build changed")
    async fn compile(&mut self) -> Result<()>;

    /// Incremental regeneration of app sources only ("app changed")
    async fn regenerate_app(&mut self) -> Result<()>;

    /// Current build configuration snapshot
    fn build_config(&self) -> BuildConfig;
}

/// A running (or about to run) dev server instance.
#[trait_variant::make(ServingEndpoint: Send)]
pub trait LocalServingEndpoint {
    /// Start accepting connections
    async fn listen(&mut self) -> Result<()>;

    /// Stop serving; the bound address must be released before this returns
    async fn stop(&mut self) -> Result<()>;
}

/// Builds a fresh [`ServingEndpoint`] for each cycle.
pub trait EndpointFactory {
    type Endpoint: ServingEndpoint;

    fn create(&self, config: &BuildConfig, address: &Address) -> Result<Self::Endpoint>;
}
