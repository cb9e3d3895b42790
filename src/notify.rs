//! Outbound notifications for dossier participants
//!
//! The store publishes events on an unbounded channel after its transaction
//! commits. A separate worker task drains the channel and hands each event
//! to a sink. Neither a closed channel nor a failing sink ever reaches the
//! operation that produced the event.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::SignatureRecord;

/// Everyone attached to a dossier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participants {
    pub maker_id: Uuid,
    pub receiver_id: Uuid,
    pub zone_manager_ids: Vec<Uuid>,
}

impl Participants {
    /// Build from a dossier's maker, receiver and ledger. Every signer other
    /// than the receiver is a zone manager.
    pub fn from_ledger(maker_id: Uuid, receiver_id: Uuid, records: &[SignatureRecord]) -> Self {
        Self {
            maker_id,
            receiver_id,
            zone_manager_ids: records
                .iter()
                .map(|r| r.signer_id)
                .filter(|id| *id != receiver_id)
                .collect(),
        }
    }

    fn signers(&self) -> Vec<Uuid> {
        std::iter::once(self.receiver_id)
            .chain(self.zone_manager_ids.iter().copied())
            .collect()
    }
}

/// Events emitted by the dossier store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NotificationEvent {
    #[serde(rename_all = "camelCase")]
    DossierCreated {
        dossier_id: Uuid,
        participants: Participants,
    },
    #[serde(rename_all = "camelCase")]
    DossierUpdated {
        dossier_id: Uuid,
        participants: Participants,
    },
    #[serde(rename_all = "camelCase")]
    DossierDeleted {
        dossier_id: Uuid,
        participants: Participants,
    },
    #[serde(rename_all = "camelCase")]
    DossierAccepted {
        dossier_id: Uuid,
        signer_id: Uuid,
        participants: Participants,
    },
    #[serde(rename_all = "camelCase")]
    CommentCreated {
        dossier_id: Uuid,
        comment_id: Uuid,
        author_id: Uuid,
        category: String,
        participants: Participants,
    },
}

impl NotificationEvent {
    pub fn dossier_id(&self) -> Uuid {
        match self {
            NotificationEvent::DossierCreated { dossier_id, .. }
            | NotificationEvent::DossierUpdated { dossier_id, .. }
            | NotificationEvent::DossierDeleted { dossier_id, .. }
            | NotificationEvent::DossierAccepted { dossier_id, .. }
            | NotificationEvent::CommentCreated { dossier_id, .. } => *dossier_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::DossierCreated { .. } => "dossierCreated",
            NotificationEvent::DossierUpdated { .. } => "dossierUpdated",
            NotificationEvent::DossierDeleted { .. } => "dossierDeleted",
            NotificationEvent::DossierAccepted { .. } => "dossierAccepted",
            NotificationEvent::CommentCreated { .. } => "commentCreated",
        }
    }

    /// Users who should hear about the event
    pub fn recipients(&self) -> Vec<Uuid> {
        match self {
            NotificationEvent::DossierCreated { participants, .. }
            | NotificationEvent::DossierUpdated { participants, .. }
            | NotificationEvent::DossierDeleted { participants, .. } => participants.signers(),
            NotificationEvent::DossierAccepted {
                signer_id,
                participants,
                ..
            } => {
                let mut recipients: Vec<Uuid> = participants
                    .signers()
                    .into_iter()
                    .filter(|id| id != signer_id)
                    .collect();
                recipients.push(participants.maker_id);
                recipients
            }
            NotificationEvent::CommentCreated { participants, .. } => vec![participants.maker_id],
        }
    }
}

/// Publishing half of the notification channel
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand an event to the worker. Never fails the caller.
    pub fn publish(&self, event: NotificationEvent) {
        let kind = event.kind();
        let dossier_id = event.dossier_id();
        if self.tx.send(event).is_err() {
            tracing::warn!(event = kind, dossier_id = %dossier_id, "Notification dropped, no worker running");
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook responded with {0}")]
    Status(StatusCode),
}

/// Where the worker delivers events
pub enum Sink {
    /// Log each event and do nothing else
    Log,
    /// POST each event as JSON to a URL
    Webhook(WebhookSink),
}

impl Sink {
    pub async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        match self {
            Sink::Log => {
                tracing::info!(
                    event = event.kind(),
                    dossier_id = %event.dossier_id(),
                    recipients = event.recipients().len(),
                    "Notification"
                );
                Ok(())
            }
            Sink::Webhook(webhook) => webhook.deliver(event).await,
        }
    }
}

pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(event).send().await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }

        Ok(())
    }
}

/// Spawn the worker that drains the channel until every notifier is dropped
pub fn spawn_worker(mut rx: mpsc::UnboundedReceiver<NotificationEvent>, sink: Sink) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = sink.deliver(&event).await {
                tracing::warn!(
                    event = event.kind(),
                    dossier_id = %event.dossier_id(),
                    "Failed to deliver notification: {}",
                    e
                );
            }
        }
        tracing::debug!("Notification worker stopped");
    })
}
