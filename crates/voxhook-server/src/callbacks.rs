//! Request/response callback fan-out.
//!
//! The webhook handler never runs observers inline. It pushes a
//! [`CallbackEvent`] onto an unbounded channel and returns; a single
//! [`CallbackWorker`] drains the channel in arrival order and spawns one task
//! per interested observer, so a slow or failing observer delays nobody.
//!
//! Response payloads are produced lazily: the worker only materializes the
//! JSON when at least one response observer applies to the event.

use crate::application::Application;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voxhook_cache::panic_message;
use voxhook_types::{EventKind, RequestType};

/// An inbound webhook, as seen by request observers.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// Server path of the application that received the request.
    pub application: String,
    pub request_type: RequestType,
    pub payload: Arc<Value>,
}

/// The answer sent for a webhook, as seen by response observers.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub application: String,
    pub request_type: RequestType,
    pub response: Arc<Value>,
    pub elapsed: Duration,
}

pub type RequestObserver = Arc<dyn Fn(RequestEvent) -> BoxFuture<'static, ()> + Send + Sync>;
pub type ResponseObserver = Arc<dyn Fn(ResponseEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Produces the response JSON on demand.
pub type LazyResponse = Box<dyn FnOnce() -> Result<Value, serde_json::Error> + Send>;

/// A set of registered observers.
///
/// Observers are registered while the server context is being built and are
/// read-only afterwards.
#[derive(Clone, Default)]
pub struct Observers {
    all_requests: Vec<RequestObserver>,
    typed_requests: Vec<(RequestType, RequestObserver)>,
    all_responses: Vec<ResponseObserver>,
    typed_responses: Vec<(RequestType, ResponseObserver)>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes every request.
    pub fn on_all_requests<F, Fut>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.all_requests.push(boxed_request(observer));
        self
    }

    /// Observes requests of one type.
    pub fn on_request<F, Fut>(&mut self, request_type: RequestType, observer: F) -> &mut Self
    where
        F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.typed_requests
            .push((request_type, boxed_request(observer)));
        self
    }

    /// Observes every response.
    pub fn on_all_responses<F, Fut>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(ResponseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.all_responses.push(boxed_response(observer));
        self
    }

    /// Observes responses to requests of one type.
    pub fn on_response<F, Fut>(&mut self, request_type: RequestType, observer: F) -> &mut Self
    where
        F: Fn(ResponseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.typed_responses
            .push((request_type, boxed_response(observer)));
        self
    }

    fn request_observers(
        &self,
        request_type: RequestType,
    ) -> impl Iterator<Item = &RequestObserver> + '_ {
        self.all_requests.iter().chain(
            self.typed_requests
                .iter()
                .filter(move |(t, _)| *t == request_type)
                .map(|(_, observer)| observer),
        )
    }

    fn response_observers(
        &self,
        request_type: RequestType,
    ) -> impl Iterator<Item = &ResponseObserver> + '_ {
        self.all_responses.iter().chain(
            self.typed_responses
                .iter()
                .filter(move |(t, _)| *t == request_type)
                .map(|(_, observer)| observer),
        )
    }
}

fn boxed_request<F, Fut>(observer: F) -> RequestObserver
where
    F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event: RequestEvent| -> BoxFuture<'static, ()> { Box::pin(observer(event)) })
}

fn boxed_response<F, Fut>(observer: F) -> ResponseObserver
where
    F: Fn(ResponseEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event: ResponseEvent| -> BoxFuture<'static, ()> { Box::pin(observer(event)) })
}

/// What a callback event carries.
pub enum EventPayload {
    Request(Arc<Value>),
    Response {
        producer: LazyResponse,
        elapsed: Duration,
    },
}

/// One queued lifecycle event. Consumed exactly once by the worker.
pub struct CallbackEvent {
    pub application: Arc<Application>,
    pub request_type: RequestType,
    pub payload: EventPayload,
}

impl CallbackEvent {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Request(_) => EventKind::Request,
            EventPayload::Response { .. } => EventKind::Response,
        }
    }
}

/// Producer side of the callback queue.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<CallbackEvent>,
}

impl EventBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CallbackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueues an event without waiting.
    pub fn emit(&self, event: CallbackEvent) {
        let kind = event.kind();
        let request_type = event.request_type;
        if self.tx.send(event).is_err() {
            tracing::warn!(
                ?kind,
                request_type = request_type.as_str(),
                "callback worker is not running; event dropped"
            );
        }
    }

    pub fn emit_request(
        &self,
        application: Arc<Application>,
        request_type: RequestType,
        payload: Arc<Value>,
    ) {
        self.emit(CallbackEvent {
            application,
            request_type,
            payload: EventPayload::Request(payload),
        });
    }

    pub fn emit_response(
        &self,
        application: Arc<Application>,
        request_type: RequestType,
        elapsed: Duration,
        producer: LazyResponse,
    ) {
        self.emit(CallbackEvent {
            application,
            request_type,
            payload: EventPayload::Response { producer, elapsed },
        });
    }
}

/// Consumer side of the callback queue.
pub struct CallbackWorker {
    global: Arc<Observers>,
    rx: mpsc::UnboundedReceiver<CallbackEvent>,
}

impl CallbackWorker {
    pub fn new(global: Arc<Observers>, rx: mpsc::UnboundedReceiver<CallbackEvent>) -> Self {
        Self { global, rx }
    }

    /// Drains the queue until every [`EventBus`] has been dropped.
    pub async fn run(mut self) {
        tracing::info!("starting callback worker");

        while let Some(event) = self.rx.recv().await {
            let kind = event.kind();
            let request_type = event.request_type;
            let global = &self.global;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| dispatch(global, event))) {
                tracing::error!(
                    ?kind,
                    request_type = request_type.as_str(),
                    "callback dispatch panicked: {}",
                    panic_message(&*payload)
                );
            }
        }

        tracing::info!("callback channel closed, callback worker stopping");
    }
}

fn dispatch(global: &Observers, event: CallbackEvent) {
    let CallbackEvent {
        application,
        request_type,
        payload,
    } = event;
    let path = application.server_path().to_string();
    let local = application.observers();

    match payload {
        EventPayload::Request(payload) => {
            let event = RequestEvent {
                application: path,
                request_type,
                payload,
            };
            for observer in global
                .request_observers(request_type)
                .chain(local.request_observers(request_type))
            {
                spawn_observer(observer(event.clone()), "request", request_type);
            }
        }
        EventPayload::Response { producer, elapsed } => {
            let observers: Vec<&ResponseObserver> = global
                .response_observers(request_type)
                .chain(local.response_observers(request_type))
                .collect();
            if observers.is_empty() {
                return;
            }

            let response = match producer() {
                Ok(value) => Arc::new(value),
                Err(e) => {
                    tracing::error!(
                        request_type = request_type.as_str(),
                        application = %path,
                        "failed to materialize response for callbacks: {}",
                        e
                    );
                    return;
                }
            };
            let event = ResponseEvent {
                application: path,
                request_type,
                response,
                elapsed,
            };
            for observer in observers {
                spawn_observer(observer(event.clone()), "response", request_type);
            }
        }
    }
}

fn spawn_observer(future: BoxFuture<'static, ()>, stage: &'static str, request_type: RequestType) {
    let handle = tokio::spawn(future);
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            tracing::warn!(
                stage,
                request_type = request_type.as_str(),
                error = %e,
                "callback observer failed"
            );
        }
    });
}
