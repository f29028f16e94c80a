//! Message types for the Murmur message bus
//!
//! Identifiers, the normalized inbound record a transport adapter produces,
//! and the outbound side effects the engine emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::history::Message;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifies a private or group chat.
    ConversationId
);
string_id!(
    /// Identifies a chat participant.
    UserId
);

impl From<&UserId> for ConversationId {
    /// A private conversation is keyed by its only participant.
    fn from(user: &UserId) -> Self {
        Self(user.0.clone())
    }
}

/// Private chat or group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Private,
    Group,
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKind::Private => write!(f, "private"),
            ConversationKind::Group => write!(f, "group"),
        }
    }
}

/// The message a reply points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub message_id: String,
    pub sender_name: Option<String>,
    pub text: Option<String>,
}

/// A normalized inbound chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub conversation_id: ConversationId,
    pub kind: ConversationKind,
    pub sender_id: UserId,
    pub sender_name: String,
    pub text: String,
    /// Image URLs, already resolved by the transport
    pub images: Vec<String>,
    pub reply_to: Option<ReplyRef>,
    /// The message mentions or replies to the agent
    pub addressed: bool,
    pub sent_at: DateTime<Utc>,
}

/// What the model sees for one inbound message.
#[derive(Serialize)]
struct ModelInput<'a> {
    from: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a ReplyRef>,
    sent_at: String,
}

impl InboundMessage {
    /// A private text message; private messages always address the agent.
    pub fn private(user: &str, text: &str) -> Self {
        let sender = UserId::from(user);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: ConversationId::from(&sender),
            kind: ConversationKind::Private,
            sender_id: sender,
            sender_name: user.to_string(),
            text: text.to_string(),
            images: Vec::new(),
            reply_to: None,
            addressed: true,
            sent_at: Utc::now(),
        }
    }

    /// A group text message, not addressed to the agent.
    pub fn group(group: &str, user: &str, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: ConversationId::from(group),
            kind: ConversationKind::Group,
            sender_id: UserId::from(user),
            sender_name: user.to_string(),
            text: text.to_string(),
            images: Vec::new(),
            reply_to: None,
            addressed: false,
            sent_at: Utc::now(),
        }
    }

    pub fn addressed(mut self) -> Self {
        self.addressed = true;
        self
    }

    pub fn with_sender_name(mut self, name: &str) -> Self {
        self.sender_name = name.to_string();
        self
    }

    pub fn with_image(mut self, url: &str) -> Self {
        self.images.push(url.to_string());
        self
    }

    pub fn with_reply(mut self, reply: ReplyRef) -> Self {
        self.reply_to = Some(reply);
        self
    }

    pub fn with_sent_at(mut self, at: DateTime<Utc>) -> Self {
        self.sent_at = at;
        self
    }

    /// Whether this message counts as addressing the agent.
    pub fn addresses_agent(&self) -> bool {
        self.kind == ConversationKind::Private || self.addressed
    }

    /// Map into the history/model format: a JSON user message plus images.
    pub fn to_history_message(&self) -> Message {
        let input = ModelInput {
            from: &self.sender_name,
            text: &self.text,
            reply_to: self.reply_to.as_ref(),
            sent_at: self.sent_at.format("%Y-%m-%d %H:%M").to_string(),
        };
        let content = serde_json::to_string(&input).unwrap_or_else(|_| self.text.clone());
        Message::user(&content).with_images(self.images.clone())
    }
}

/// Which outbound side effect a message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundKind {
    Response,
    Refusal,
    Busy,
}

/// A message the engine wants delivered to a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub conversation_id: ConversationId,
    pub kind: OutboundKind,
    /// Text bubbles, sent in order
    pub texts: Vec<String>,
    pub sticker: Option<String>,
}

impl OutboundMessage {
    pub fn new(conversation_id: &ConversationId, kind: OutboundKind, text: &str) -> Self {
        Self {
            conversation_id: conversation_id.clone(),
            kind,
            texts: vec![text.to_string()],
            sticker: None,
        }
    }
}
