//! voxhook webhook server library logic.

pub mod api;
pub mod api_admin;
pub mod api_webhook;
pub mod application;
pub mod background;
pub mod callbacks;
pub mod config;
pub mod demo;
pub mod metrics;
pub mod middleware;

use application::Application;
use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Extension, Router};
use callbacks::{CallbackWorker, EventBus, Observers, RequestEvent, ResponseEvent};
use config::ConfigError;
use metrics::Metrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use voxhook_types::RequestType;

/// Maximum request body size (2 MiB). Protects against OOM from oversized payloads.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Process-wide settings that do not belong to a single application.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Production mode hides diagnostic endpoints and error details.
    pub production: bool,
    /// Pause between cache purge sweeps.
    pub purge_interval: Duration,
    /// Cache entries older than this are evicted by a sweep.
    pub max_age: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        let cache = config::CacheConfig::default();
        Self {
            production: false,
            purge_interval: cache.purge_interval(),
            max_age: cache.max_age(),
        }
    }
}

impl From<&config::Config> for RuntimeSettings {
    fn from(config: &config::Config) -> Self {
        Self {
            production: config.server.production,
            purge_interval: config.cache.purge_interval(),
            max_age: config.cache.max_age(),
        }
    }
}

/// State shared by every request handler and background task.
///
/// Built once at startup and passed around as `Arc<ServerContext>`.
pub struct ServerContext {
    /// Runtime settings.
    pub settings: RuntimeSettings,
    /// Configured applications, one per webhook path.
    pub applications: Vec<Arc<Application>>,
    /// Observers that apply to every application.
    pub global_observers: Arc<Observers>,
    /// Producer side of the callback queue.
    pub events: EventBus,
    /// Prometheus metrics.
    pub metrics: Metrics,
}

impl ServerContext {
    pub fn builder(settings: RuntimeSettings) -> ServerContextBuilder {
        ServerContextBuilder {
            settings,
            applications: Vec::new(),
            observers: Observers::new(),
        }
    }

    pub fn application(&self, server_path: &str) -> Option<&Arc<Application>> {
        self.applications
            .iter()
            .find(|app| app.server_path() == server_path)
    }

    /// Clears every cache of every application.
    pub fn clear_caches(&self) {
        for app in &self.applications {
            for cache in app.caches() {
                cache.clear();
            }
        }
    }
}

/// Errors that prevent the server context from being built.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Collects applications and global observers before serving starts.
pub struct ServerContextBuilder {
    settings: RuntimeSettings,
    applications: Vec<Application>,
    observers: Observers,
}

impl ServerContextBuilder {
    pub fn application(mut self, application: Application) -> Self {
        self.applications.push(application);
        self
    }

    pub fn on_all_requests<F, Fut>(mut self, observer: F) -> Self
    where
        F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.observers.on_all_requests(observer);
        self
    }

    pub fn on_request<F, Fut>(mut self, request_type: RequestType, observer: F) -> Self
    where
        F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.observers.on_request(request_type, observer);
        self
    }

    pub fn on_all_responses<F, Fut>(mut self, observer: F) -> Self
    where
        F: Fn(ResponseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.observers.on_all_responses(observer);
        self
    }

    pub fn on_response<F, Fut>(mut self, request_type: RequestType, observer: F) -> Self
    where
        F: Fn(ResponseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.observers.on_response(request_type, observer);
        self
    }

    /// Validates the applications and creates the context plus the worker
    /// that must be spawned to drain its callback queue.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] for invalid or duplicate application paths or
    /// if metrics cannot be registered.
    pub fn build(self) -> Result<(Arc<ServerContext>, CallbackWorker), StartupError> {
        config::validate_applications(self.applications.iter().map(Application::config))?;

        let global_observers = Arc::new(self.observers);
        let (events, rx) = EventBus::new();
        let worker = CallbackWorker::new(global_observers.clone(), rx);

        let context = ServerContext {
            settings: self.settings,
            applications: self.applications.into_iter().map(Arc::new).collect(),
            global_observers,
            events,
            metrics: Metrics::new()?,
        };

        Ok((Arc::new(context), worker))
    }
}

/// Builds the application router with all routes.
pub fn app(context: Arc<ServerContext>) -> Router {
    let mut router = Router::new()
        .route("/ping", get(api::ping))
        .route("/health", get(api::health));

    if !context.settings.production {
        router = router
            .route("/metrics", get(api_admin::metrics_handler))
            .route("/caches", get(api_admin::get_caches_handler))
            .route("/clearCaches", get(api_admin::clear_caches_handler));
    }

    for application in &context.applications {
        tracing::info!(path = application.server_path(), "serving application");
        let webhook = Router::new()
            .route(application.server_path(), post(api_webhook::webhook_handler))
            .route_layer(axum::middleware::from_fn(middleware::secret_middleware))
            .layer(Extension(application.clone()));
        router = router.merge(webhook);
    }

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(context))
}
