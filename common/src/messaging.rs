// SMS messaging seam: transports, the SMS medium wrapper and communication dispatch

use crate::errors::{JobError, TransportError};
use crate::models::{Communication, RecipientStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Payload for a single direct SMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    /// Id of the SMS "From" defined value
    pub from_value_id: i64,
    pub body: String,
}

impl SmsMessage {
    /// Medium data in the `FromValue` / `Message` shape transports expect
    pub fn medium_data(&self) -> HashMap<String, String> {
        let mut data = HashMap::new();
        data.insert("FromValue".to_string(), self.from_value_id.to_string());
        data.insert("Message".to_string(), self.body.clone());
        data
    }
}

/// SmsTransport trait defines the interface for delivering text messages
#[async_trait]
pub trait SmsTransport: Send + Sync {
    fn is_active(&self) -> bool;

    async fn send(
        &self,
        message: &SmsMessage,
        destinations: &[String],
        app_root: &str,
        theme_root: Option<&str>,
    ) -> Result<(), TransportError>;
}

/// The SMS communication medium and the transport configured for it
#[derive(Clone)]
pub struct SmsMedium {
    pub is_active: bool,
    pub transport: Option<Arc<dyn SmsTransport>>,
}

impl SmsMedium {
    pub fn new(transport: Arc<dyn SmsTransport>) -> Self {
        Self {
            is_active: true,
            transport: Some(transport),
        }
    }

    /// The active transport, or the fatal error explaining why there is none
    pub fn active_transport(&self) -> Result<Arc<dyn SmsTransport>, JobError> {
        if !self.is_active {
            return Err(JobError::TransportUnavailable(
                "SMS Medium is Inactive".to_string(),
            ));
        }
        match &self.transport {
            Some(transport) if transport.is_active() => Ok(Arc::clone(transport)),
            _ => Err(JobError::TransportUnavailable(
                "No valid SMS transport active".to_string(),
            )),
        }
    }
}

/// Sends a persisted communication to all of its recipients
#[async_trait]
pub trait CommunicationDispatcher: Send + Sync {
    async fn dispatch(&self, communication: &mut Communication) -> Result<(), TransportError>;
}

/// Dispatches communications by sending each recipient's body through an SMS transport
pub struct TransportDispatcher {
    medium: SmsMedium,
    app_root: String,
    theme_root: Option<String>,
}

impl TransportDispatcher {
    pub fn new(medium: SmsMedium, app_root: String, theme_root: Option<String>) -> Self {
        Self {
            medium,
            app_root,
            theme_root,
        }
    }
}

#[async_trait]
impl CommunicationDispatcher for TransportDispatcher {
    #[instrument(skip_all, fields(communication = %communication.guid, recipients = communication.recipients.len()))]
    async fn dispatch(&self, communication: &mut Communication) -> Result<(), TransportError> {
        let transport = self
            .medium
            .active_transport()
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        for recipient in communication.recipients.iter_mut() {
            let message = SmsMessage {
                from_value_id: communication.sms_from_value_id,
                body: recipient.message.clone(),
            };
            transport
                .send(
                    &message,
                    std::slice::from_ref(&recipient.number),
                    &self.app_root,
                    self.theme_root.as_deref(),
                )
                .await?;
            recipient.status = RecipientStatus::Delivered;
        }
        Ok(())
    }
}

/// Transport that records each send in the log instead of contacting a gateway
#[derive(Debug, Default)]
pub struct LogSmsTransport;

#[async_trait]
impl SmsTransport for LogSmsTransport {
    fn is_active(&self) -> bool {
        true
    }

    async fn send(
        &self,
        message: &SmsMessage,
        destinations: &[String],
        app_root: &str,
        _theme_root: Option<&str>,
    ) -> Result<(), TransportError> {
        let medium_data = message.medium_data();
        info!(
            medium_data = ?medium_data,
            destinations = ?destinations,
            app_root = app_root,
            "SMS sent"
        );
        Ok(())
    }
}
