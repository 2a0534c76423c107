//! Webhook event fan-out.
//!
//! The dispatcher consumes the daemon's event bus and POSTs matching events
//! to subscribed URLs. Delivery is fire-and-forget from the producer's point
//! of view: each delivery runs in its own task with a fixed per-request
//! timeout and up to three attempts with exponential backoff. There is no
//! persistent queue — a daemon restart drops undelivered events.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use agentgw_core::event::{AgentEvent, EventBus, EventKind};

/// A webhook subscription declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSubscription {
    pub name: String,
    pub url: String,

    /// Event kinds this subscription wants (dotted names in YAML)
    pub events: Vec<EventKind>,

    /// Sent as `X-Webhook-Secret` when present
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct WebhooksFile {
    #[serde(default)]
    webhooks: Vec<WebhookSubscription>,
}

/// Parse the webhooks YAML file. Missing or malformed files yield nothing.
pub fn load_subscriptions(path: &Path) -> Vec<WebhookSubscription> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            info!(path = %path.display(), "No webhooks config found");
            return Vec::new();
        }
    };

    match serde_yaml::from_str::<WebhooksFile>(&content) {
        Ok(file) => file.webhooks,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to parse webhooks config");
            Vec::new()
        }
    }
}

/// Fans events out to subscriptions with retries.
pub struct WebhookDispatcher {
    subscriptions: Vec<WebhookSubscription>,
    client: reqwest::Client,
    max_attempts: u32,
    backoff_base: Duration,
}

impl WebhookDispatcher {
    /// `max_attempts` is the total attempt count per event per subscription;
    /// `timeout_secs` bounds each POST.
    pub fn new(max_attempts: u32, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            subscriptions: Vec::new(),
            client,
            max_attempts: max_attempts.max(1),
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Shrink the backoff for tests.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Register a subscription.
    pub fn register(&mut self, subscription: WebhookSubscription) {
        info!(
            webhook = %subscription.name,
            events = ?subscription.events.iter().map(|e| e.as_str()).collect::<Vec<_>>(),
            "Registered webhook"
        );
        self.subscriptions.push(subscription);
    }

    /// Register every subscription from a YAML file.
    pub fn load_from_file(&mut self, path: &Path) {
        for sub in load_subscriptions(path) {
            self.register(sub);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Consume the event bus until `cancel` trips. Every matching event
    /// spawns an independent delivery task per subscription — producers
    /// never wait on delivery.
    pub fn spawn(
        self: Arc<Self>,
        bus: &EventBus,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        info!(subscriptions = self.subscriptions.len(), "Webhook dispatcher started");

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Webhook dispatcher shutting down");
                        return;
                    }
                    received = rx.recv() => match received {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "Webhook dispatcher lagged behind the event bus");
                            continue;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                };

                self.clone().dispatch(event);
            }
        })
    }

    /// Fan one event out to every matching subscription.
    fn dispatch(self: Arc<Self>, event: Arc<AgentEvent>) {
        for (index, sub) in self.subscriptions.iter().enumerate() {
            if !sub.enabled || !sub.events.contains(&event.kind) {
                continue;
            }
            let dispatcher = self.clone();
            let event = event.clone();
            tokio::spawn(async move {
                dispatcher.deliver(index, &event).await;
            });
        }
    }

    /// Deliver one event to one subscription, retrying on failure.
    async fn deliver(&self, subscription_index: usize, event: &AgentEvent) {
        let sub = &self.subscriptions[subscription_index];
        let payload = serde_json::json!({
            "event": event.kind.as_str(),
            "timestamp": event.timestamp.to_rfc3339(),
            "data": event.data,
        });

        for attempt in 1..=self.max_attempts {
            let mut request = self
                .client
                .post(&sub.url)
                .header("Content-Type", "application/json")
                .header("User-Agent", "agentgw-webhook/1.0")
                .json(&payload);

            if let Some(secret) = &sub.secret {
                request = request.header("X-Webhook-Secret", secret);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!(
                        webhook = %sub.name,
                        event = event.kind.as_str(),
                        status = response.status().as_u16(),
                        attempt,
                        "Webhook delivered"
                    );
                    return;
                }
                Ok(response) => {
                    warn!(
                        webhook = %sub.name,
                        status = response.status().as_u16(),
                        attempt,
                        max = self.max_attempts,
                        "Webhook returned non-success status"
                    );
                }
                Err(e) => {
                    warn!(
                        webhook = %sub.name,
                        error = %e,
                        attempt,
                        max = self.max_attempts,
                        "Webhook delivery failed"
                    );
                }
            }

            if attempt < self.max_attempts {
                // 1s, 2s, 4s... scaled by backoff_base
                let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }
        }

        error!(
            webhook = %sub.name,
            event = event.kind.as_str(),
            attempts = self.max_attempts,
            "Webhook delivery failed after all attempts, dropping event"
        );
    }
}
