//! WebSocket frame types, inbound validation, and sanitization.
//!
//! Every frame on the wire is a JSON text message shaped like
//! `{"type", "user_id"?, "data", "timestamp"}`. Inbound frames are checked
//! against a size cap and a type whitelist, then every string in them
//! (object keys included) is trimmed, HTML-escaped and length-capped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default cap on inbound frame size in bytes.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 10 * 1024;
/// Strings in inbound frames are cut to this many characters.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Frame types a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// Application-level keepalive; answered with `pong`.
    Ping,
    /// Reply to a server ping.
    Pong,
    /// Client-side notification acknowledgement.
    Notification,
    /// Chat message.
    Chat,
    /// Presence/status update.
    Status,
    /// Generic update.
    Update,
}

impl InboundKind {
    /// Looks up a whitelisted frame type.
    #[must_use]
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "ping" => Some(Self::Ping),
            "pong" => Some(Self::Pong),
            "notification" => Some(Self::Notification),
            "chat" => Some(Self::Chat),
            "status" => Some(Self::Status),
            "update" => Some(Self::Update),
            _ => None,
        }
    }

    /// Wire tag for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Notification => "notification",
            Self::Chat => "chat",
            Self::Status => "status",
            Self::Update => "update",
        }
    }
}

/// Why an inbound frame was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Frame exceeds the configured byte cap.
    #[error("message too large: {size} bytes (max {max})")]
    TooLarge {
        /// Received size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Frame is not valid JSON of the expected shape.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// `type` is missing or empty.
    #[error("message type required")]
    MissingType,
    /// `type` is not whitelisted.
    #[error("invalid message type: {0}")]
    UnsupportedType(String),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    frame_type: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// An inbound frame that passed validation, already sanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Whitelisted frame type.
    pub kind: InboundKind,
    /// Sanitized `user_id` field; empty when absent.
    pub user_id: String,
    /// Sanitized payload.
    pub data: serde_json::Value,
}

/// Validates and sanitizes one inbound text frame.
///
/// # Errors
///
/// Returns a [`FrameError`] describing the first check that failed.
pub fn validate_frame(raw: &str, max_bytes: usize) -> Result<InboundFrame, FrameError> {
    if raw.len() > max_bytes {
        return Err(FrameError::TooLarge {
            size: raw.len(),
            max: max_bytes,
        });
    }
    let frame: RawFrame =
        serde_json::from_str(raw).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    if frame.frame_type.is_empty() {
        return Err(FrameError::MissingType);
    }
    let kind = InboundKind::from_wire(&frame.frame_type)
        .ok_or_else(|| FrameError::UnsupportedType(sanitize_string(&frame.frame_type)))?;

    Ok(InboundFrame {
        kind,
        user_id: sanitize_string(&frame.user_id),
        data: sanitize_value(frame.data),
    })
}

/// Trims, HTML-escapes, and caps a string at [`MAX_CONTENT_CHARS`].
#[must_use]
pub fn sanitize_string(s: &str) -> String {
    let escaped = html_escape(s.trim());
    match escaped.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((cut, _)) => escaped.get(..cut).unwrap_or_default().to_string(),
        None => escaped,
    }
}

/// Applies [`sanitize_string`] to every string and key in `value`.
#[must_use]
pub fn sanitize_value(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::String(s) => Value::String(sanitize_string(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (sanitize_string(&k), sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Server-originated control frame.
#[derive(Debug, Clone, Serialize)]
pub struct ControlFrame {
    /// `"pong"` or `"error"`.
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    /// Frame payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Creation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ControlFrame {
    /// `{"type":"pong"}`.
    #[must_use]
    pub const fn pong() -> Self {
        Self {
            frame_type: "pong",
            data: None,
            timestamp: None,
        }
    }

    /// `{"type":"error","data":{"message":..},"timestamp":..}`.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            frame_type: "error",
            data: Some(serde_json::json!({ "message": message.into() })),
            timestamp: Some(Utc::now()),
        }
    }

    /// Serializes the frame.
    #[must_use]
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
