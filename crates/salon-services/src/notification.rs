//! Outbound booking notifications
//!
//! Lifecycle transitions enqueue events on a bounded channel and never wait on
//! delivery or on the identity service. A background worker resolves each
//! recipient and drains the channel into a `NotificationDispatcher`; delivery
//! failures are logged and dropped.

use async_trait::async_trait;
use reqwest::Client;
use salon_core::{
    models::NotificationEvent,
    traits::{IdentityService, NotificationDispatcher},
    AppError, AppResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Sending half of the notification channel
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<NotificationEvent>,
}

impl NotificationQueue {
    /// Create a queue and the receiver the worker drains
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Hand an event to the worker without waiting
    pub fn enqueue(&self, event: NotificationEvent) {
        let name = event.name();
        let booking_id = event.booking_id();

        match self.sender.try_send(event) {
            Ok(()) => debug!("Queued {} for booking {}", name, booking_id),
            Err(TrySendError::Full(_)) => {
                warn!("Notification queue full, dropping {} for booking {}", name, booking_id)
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Notification worker stopped, dropping {} for booking {}", name, booking_id)
            }
        }
    }
}

/// Drain the queue into `dispatcher` until every sender is dropped
///
/// An event whose recipient cannot be resolved is still delivered with only
/// the user id.
pub fn spawn_worker(
    mut receiver: mpsc::Receiver<NotificationEvent>,
    identity: Arc<dyn IdentityService>,
    dispatcher: Arc<dyn NotificationDispatcher>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Notification worker started");

        while let Some(mut event) = receiver.recv().await {
            resolve_recipient(identity.as_ref(), &mut event).await;

            if let Err(e) = dispatcher.dispatch(&event).await {
                warn!(
                    "Failed to deliver {} for booking {}: {}",
                    event.name(),
                    event.booking_id(),
                    e
                );
            }
        }

        info!("Notification worker stopped");
    })
}

async fn resolve_recipient(identity: &dyn IdentityService, event: &mut NotificationEvent) {
    let notice = event.notice_mut();
    if notice.recipient.is_some() {
        return;
    }

    match identity.validate_user(notice.user_id).await {
        Ok(user) => notice.recipient = Some(user),
        Err(e) => warn!(
            "Recipient lookup failed for booking {}, sending without contact details: {}",
            notice.booking_id, e
        ),
    }
}

/// Delivers events as JSON POSTs to a webhook
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build notification client: {}", e)))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    #[instrument(skip(self, event), fields(event = event.name(), booking_id = %event.booking_id()))]
    async fn dispatch(&self, event: &NotificationEvent) -> AppResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| AppError::Collaborator(format!("Notification request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Collaborator(format!(
                "Notification endpoint returned {}",
                response.status()
            )));
        }

        debug!("Notification delivered");
        Ok(())
    }
}

/// Logs events instead of delivering them; used when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn dispatch(&self, event: &NotificationEvent) -> AppResult<()> {
        info!(
            event = event.name(),
            booking_id = %event.booking_id(),
            "Notification (no delivery endpoint configured)"
        );
        Ok(())
    }
}
