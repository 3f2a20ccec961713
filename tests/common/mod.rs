// Each integration test binary compiles this module independently and
// uses a different subset of it.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use repairshop_api::{
    api_v1_routes,
    config::AppConfig,
    db::{self, DbConfig},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    payments::{CreateIntentRequest, PaymentIntent, PaymentProvider},
    services::notifications::{NotificationError, Notifier, OrderConfirmation},
    AppState,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// In-memory payment processor double. Records every create-intent request
/// and can be armed to fail the next call.
pub struct FakeProvider {
    pub requests: Mutex<Vec<CreateIntentRequest>>,
    pub fail_next: AtomicBool,
    counter: AtomicU64,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
            counter: AtomicU64::new(1),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::PaymentProviderError(
                "payment processor unreachable".to_string(),
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        Ok(PaymentIntent {
            id: format!("pi_test_{n}"),
            client_secret: format!("pi_test_{n}_secret_local"),
        })
    }
}

/// Notifier double that records confirmations instead of sending email.
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<OrderConfirmation>>,
    pub fail_next: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(NotificationError::Rejected("smtp relay down".to_string()));
        }
        self.sent.lock().unwrap().push(confirmation.clone());
        Ok(())
    }
}

/// Test harness: application state backed by an in-memory SQLite database,
/// a fake payment provider and a recording notifier.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: Arc<FakeProvider>,
    pub notifier: Arc<RecordingNotifier>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
            "sk_test_secret_key".to_string(),
            WEBHOOK_SECRET.to_string(),
        );

        // A single pooled connection keeps the in-memory database alive and
        // shared for the lifetime of the test.
        let db_cfg = DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            idle_timeout: Duration::from_secs(3600),
            ..Default::default()
        };
        let db_pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("test database");
        db::run_migrations(&db_pool).await.expect("migrations");
        let db_arc = Arc::new(db_pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let provider = Arc::new(FakeProvider::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            provider.clone(),
            notifier.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            provider,
            notifier,
            _event_task: event_task,
        }
    }

    /// Issue a JSON request against the router.
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                builder.body(Body::from(json.to_string())).unwrap()
            }
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request should complete")
    }

    /// Deliver a webhook body signed with the shared test secret.
    pub async fn post_webhook(&self, body: &[u8]) -> Response {
        let ts = chrono::Utc::now().timestamp();
        let sig = sign_webhook(ts, body);
        self.post_webhook_raw(body, &ts.to_string(), &sig).await
    }

    /// Deliver a webhook with explicit timestamp/signature headers.
    pub async fn post_webhook_raw(&self, body: &[u8], ts: &str, sig: &str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("x-timestamp", ts)
            .header("x-signature", sig)
            .body(Body::from(body.to_vec()))
            .unwrap();

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request should complete")
    }
}

/// Hex HMAC-SHA256 over `{ts}.{body}`, matching the production scheme.
pub fn sign_webhook(ts: i64, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(ts.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// The processor's "payment succeeded" event shape for an intent.
pub fn succeeded_event(
    intent_ref: &str,
    amount: i64,
    currency: &str,
    receipt_email: Option<&str>,
    metadata: Value,
) -> Value {
    json!({
        "id": format!("evt_{intent_ref}"),
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": intent_ref,
                "object": "payment_intent",
                "amount": amount,
                "amount_received": amount,
                "currency": currency.to_ascii_lowercase(),
                "receipt_email": receipt_email,
                "metadata": metadata,
            }
        }
    })
}

/// A terminal failure event for an intent.
pub fn failed_event(intent_ref: &str, amount: i64, currency: &str) -> Value {
    json!({
        "id": format!("evt_fail_{intent_ref}"),
        "type": "payment_intent.payment_failed",
        "data": {
            "object": {
                "id": intent_ref,
                "object": "payment_intent",
                "amount": amount,
                "currency": currency.to_ascii_lowercase(),
                "metadata": {},
            }
        }
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
