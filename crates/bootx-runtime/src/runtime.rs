//! Application bootstrap and lifecycle.
//!
//! ```rust,ignore
//! use bootx_runtime::{Application, BootxRuntime};
//!
//! let runtime = BootxRuntime::builder()
//!     .config_file("deploy/bootx.toml")
//!     .build()?;
//! runtime.run(FooApp).await?;
//! ```

use std::future::Future;

use async_trait::async_trait;
use tokio::signal;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use bootx_core::BoxError;
use bootx_framework::Web;
use bootx_transport::{HttpServer, TransportResult};

use crate::config::{BootxConfig, ConfigLoader, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// A bootx application.
///
/// `bootstrap` registers routes and middleware on the shared [`Web`];
/// `shutdown` runs once the server has drained, unless bootstrap failed.
#[async_trait]
pub trait Application: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    async fn bootstrap(&self, web: &Web) -> Result<(), BoxError>;

    async fn shutdown(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Builds the [`Web`], runs an [`Application`] on it and serves HTTP until
/// shutdown.
pub struct BootxRuntime {
    config: BootxConfig,
}

impl BootxRuntime {
    /// Loads and validates configuration from the default locations.
    pub fn new() -> RuntimeResult<Self> {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Uses `config` as is and initializes logging from it.
    pub fn from_config(config: BootxConfig) -> Self {
        logging::init_from_config(&config.logging);
        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );
        Self { config }
    }

    pub fn config(&self) -> &BootxConfig {
        &self.config
    }

    /// A fresh [`Web`] built from the `web` section.
    pub fn web(&self) -> Web {
        self.config.web.web_builder().build()
    }

    /// Runs `app` until Ctrl+C or SIGTERM.
    pub async fn run<A: Application>(&self, app: A) -> RuntimeResult<()> {
        self.serve(&app, wait_for_shutdown()).await
    }

    /// Runs `app` until `shutdown` resolves.
    pub async fn run_until<A, F>(&self, app: A, shutdown: F) -> RuntimeResult<()>
    where
        A: Application,
        F: Future<Output = ()>,
    {
        self.serve(&app, async move {
            shutdown.await;
            Ok(())
        })
        .await
    }

    async fn serve<A, F>(&self, app: &A, shutdown: F) -> RuntimeResult<()>
    where
        A: Application,
        F: Future<Output = RuntimeResult<()>>,
    {
        let name = app.name().to_string();
        info!(app = %name, version = %app.version(), "{name} {} bootstrap ...", app.version());

        let web = self.web();
        app.bootstrap(&web)
            .await
            .map_err(|source| RuntimeError::Bootstrap {
                app: name.clone(),
                source,
            })?;

        let server = match HttpServer::new(&web, self.config.web.server_config()) {
            Ok(server) => server,
            Err(err) => {
                self.stop(app).await?;
                return Err(err.into());
            }
        };

        let token = CancellationToken::new();
        let mut task = tokio::spawn(server.run(token.clone()));
        info!(
            app = %name,
            routes = web.routes().len(),
            addr = %self.config.web.server_config().addr(),
            "{name} is running"
        );

        let outcome = tokio::select! {
            joined = &mut task => {
                error!(app = %name, "HTTP server stopped unexpectedly");
                server_outcome(joined)
            }
            signal = shutdown => {
                token.cancel();
                let stopped = server_outcome(task.await);
                signal.and(stopped)
            }
        };

        let stopped = self.stop(app).await;
        info!(app = %name, "{name} stopped");
        outcome.and(stopped)
    }

    async fn stop<A: Application>(&self, app: &A) -> RuntimeResult<()> {
        app.shutdown().await.map_err(|source| {
            error!(app = %app.name(), error = %source, "Application shutdown failed");
            RuntimeError::Shutdown {
                app: app.name().to_string(),
                source,
            }
        })
    }
}

fn server_outcome(joined: Result<TransportResult<()>, JoinError>) -> RuntimeResult<()> {
    joined?.map_err(RuntimeError::from)
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            received = signal::ctrl_c() => {
                received.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration, validates it and creates a [`BootxRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new()
                .with_current_dir()
                .with_user_config_dir(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Overrides file and environment settings.
    pub fn merge(mut self, config: BootxConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> RuntimeResult<BootxRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(BootxRuntime::from_config(config))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bootx_core::{Context, HttpError, StatusCode};
    use bootx_framework::Chain;
    use bootx_transport::TransportError;

    use super::*;

    #[derive(Default)]
    struct Calls {
        bootstrap: AtomicUsize,
        shutdown: AtomicUsize,
    }

    struct TestApp {
        calls: Arc<Calls>,
        fail_bootstrap: bool,
    }

    impl TestApp {
        fn new(calls: &Arc<Calls>) -> Self {
            Self {
                calls: Arc::clone(calls),
                fail_bootstrap: false,
            }
        }
    }

    async fn hello(ctx: Context) -> Result<(), HttpError> {
        ctx.string(StatusCode::OK, "hello");
        Ok(())
    }

    #[async_trait]
    impl Application for TestApp {
        fn name(&self) -> &str {
            "Test"
        }

        fn version(&self) -> &str {
            "0.1.0"
        }

        async fn bootstrap(&self, web: &Web) -> Result<(), BoxError> {
            self.calls.bootstrap.fetch_add(1, Ordering::SeqCst);
            if self.fail_bootstrap {
                return Err("no database".into());
            }
            web.get("/hello", hello, Chain::new());
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), BoxError> {
            self.calls.shutdown.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn local_config(port: u16) -> BootxConfig {
        let mut config = BootxConfig::default();
        config.web.host = "127.0.0.1".to_string();
        config.web.port = port;
        config
    }

    #[tokio::test]
    async fn test_run_until_lifecycle() {
        let calls = Arc::new(Calls::default());
        let runtime = BootxRuntime::from_config(local_config(0));

        let result = runtime
            .run_until(
                TestApp::new(&calls),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.bootstrap.load(Ordering::SeqCst), 1);
        assert_eq!(calls.shutdown.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_skips_shutdown() {
        let calls = Arc::new(Calls::default());
        let runtime = BootxRuntime::from_config(local_config(0));
        let app = TestApp {
            fail_bootstrap: true,
            ..TestApp::new(&calls)
        };

        let result = runtime.run_until(app, std::future::pending()).await;

        assert!(matches!(result, Err(RuntimeError::Bootstrap { ref app, .. }) if app == "Test"));
        assert_eq!(calls.shutdown.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_ends_run() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let calls = Arc::new(Calls::default());
        let runtime = BootxRuntime::from_config(local_config(port));

        let result = runtime
            .run_until(TestApp::new(&calls), std::future::pending())
            .await;

        assert!(matches!(
            result,
            Err(RuntimeError::Transport(TransportError::Bind { .. }))
        ));
        assert_eq!(calls.shutdown.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_web_follows_config() {
        let mut config = local_config(8080);
        config.web.debug = true;
        let runtime = BootxRuntime::from_config(config);
        assert!(runtime.web().debug());
        assert!(runtime.web().routes().is_empty());
    }
}
