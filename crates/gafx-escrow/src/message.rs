//! # Chat Messages
//!
//! Messages are immutable once appended. Attachment bytes live in an
//! external blob store; a message only carries the metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gafx_core::{ActorId, OrderId, Role};

use crate::config::EngineConfig;
use crate::error::EscrowError;

/// How the client should render an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    File,
}

impl AttachmentKind {
    pub fn for_mime(mime: &str) -> Self {
        if mime.trim().to_ascii_lowercase().starts_with("image/") {
            Self::Image
        } else {
            Self::File
        }
    }
}

/// Content of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        text: String,
    },
    Attachment {
        name: String,
        mime: String,
        size: u64,
        kind: AttachmentKind,
    },
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// An attachment whose kind is derived from its MIME type.
    pub fn attachment(name: impl Into<String>, mime: impl Into<String>, size: u64) -> Self {
        let mime = mime.into();
        Self::Attachment {
            kind: AttachmentKind::for_mime(&mime),
            name: name.into(),
            mime,
            size,
        }
    }

    /// Check a participant-supplied body against the configured limits.
    pub fn validate(&self, config: &EngineConfig) -> Result<(), EscrowError> {
        match self {
            Self::Text { text } => {
                if text.trim().is_empty() {
                    return Err(EscrowError::Validation("message text must not be empty".into()));
                }
                if text.chars().count() > config.max_text_len {
                    return Err(EscrowError::Validation(format!(
                        "message text exceeds {} characters",
                        config.max_text_len
                    )));
                }
            }
            Self::Attachment {
                name,
                mime,
                size,
                kind,
            } => {
                if name.trim().is_empty() || name.len() > 255 {
                    return Err(EscrowError::Validation(
                        "attachment name must be 1-255 bytes".into(),
                    ));
                }
                if !config.attachments.allows(mime) {
                    return Err(EscrowError::Validation(format!(
                        "attachment type {mime} is not accepted"
                    )));
                }
                if *size == 0 || *size > config.attachments.max_bytes {
                    return Err(EscrowError::Validation(format!(
                        "attachment size must be between 1 and {} bytes",
                        config.attachments.max_bytes
                    )));
                }
                if *kind != AttachmentKind::for_mime(mime) {
                    return Err(EscrowError::Validation(format!(
                        "attachment kind does not match type {mime}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One entry in an order's chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Per-order sequence number, starting at 1, without gaps.
    pub seq: u64,
    pub order_id: OrderId,
    pub sender_id: ActorId,
    pub sender_role: Role,
    pub body: MessageBody,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn is_system(&self) -> bool {
        self.sender_role == Role::System
    }
}
