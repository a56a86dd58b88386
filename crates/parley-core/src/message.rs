use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data_uri::DataUri;
use crate::errors::ParleyError;

/// MIME type the recorder produces for voice clips.
pub const AUDIO_CLIP_MIME: &str = "audio/ogg; codecs=opus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Audio,
    Image,
    File,
}

impl MessageKind {
    /// Binary kinds carry a data URI instead of plain text.
    pub fn is_binary(self) -> bool {
        !matches!(self, MessageKind::Text)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Audio => "audio",
            MessageKind::Image => "image",
            MessageKind::File => "file",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-generated message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks shared by outgoing drafts and inbound messages.
fn validate(kind: MessageKind, content: &str, file_name: Option<&str>) -> Result<(), ParleyError> {
    if kind == MessageKind::File && file_name.is_none_or(|n| n.trim().is_empty()) {
        return Err(ParleyError::InvalidMessage(
            "file messages must carry a file name".into(),
        ));
    }
    if kind.is_binary() {
        DataUri::parse(content)?;
    }
    Ok(())
}

/// A message as it travels between clients. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawChatMessage")]
pub struct ChatMessage {
    id: MessageId,
    kind: MessageKind,
    content: String,
    sender: String,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
}

/// Unvalidated wire shape. Older clients name the kind field `type`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChatMessage {
    id: MessageId,
    #[serde(alias = "type")]
    kind: MessageKind,
    content: String,
    sender: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    file_name: Option<String>,
}

impl TryFrom<RawChatMessage> for ChatMessage {
    type Error = ParleyError;

    fn try_from(raw: RawChatMessage) -> Result<Self, Self::Error> {
        validate(raw.kind, &raw.content, raw.file_name.as_deref())?;
        Ok(Self {
            id: raw.id,
            kind: raw.kind,
            content: raw.content,
            sender: raw.sender,
            timestamp: raw.timestamp,
            file_name: raw.file_name,
        })
    }
}

impl ChatMessage {
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Text for `text` messages, a data URI string otherwise.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Decode the binary payload. `None` for text messages.
    pub fn payload(&self) -> Option<DataUri> {
        if !self.kind.is_binary() {
            return None;
        }
        DataUri::parse(&self.content).ok()
    }
}

/// A message built by a local producer, not yet bound to a sender or room.
///
/// The room controller stamps sender and timestamp when it sends the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    id: MessageId,
    kind: MessageKind,
    content: String,
    file_name: Option<String>,
}

impl OutgoingMessage {
    /// Build a draft of any kind, enforcing the payload and file-name rules.
    pub fn new(
        kind: MessageKind,
        content: impl Into<String>,
        file_name: Option<String>,
    ) -> Result<Self, ParleyError> {
        let content = content.into();
        validate(kind, &content, file_name.as_deref())?;
        Ok(Self {
            id: MessageId::generate(),
            kind,
            content,
            file_name,
        })
    }

    /// A text message. Blank input is rejected.
    pub fn text(text: impl Into<String>) -> Result<Self, ParleyError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ParleyError::InvalidMessage("text message is empty".into()));
        }
        Self::new(MessageKind::Text, text, None)
    }

    pub fn audio(payload: &DataUri) -> Self {
        Self::binary(MessageKind::Audio, payload, None)
    }

    /// A recorded voice clip in the recorder's native format.
    pub fn audio_clip(bytes: Vec<u8>) -> Result<Self, ParleyError> {
        Ok(Self::audio(&DataUri::new(AUDIO_CLIP_MIME, bytes)?))
    }

    pub fn image(payload: &DataUri, file_name: Option<String>) -> Self {
        Self::binary(MessageKind::Image, payload, file_name)
    }

    pub fn file(payload: &DataUri, file_name: impl Into<String>) -> Result<Self, ParleyError> {
        let file_name = file_name.into();
        if file_name.trim().is_empty() {
            return Err(ParleyError::InvalidMessage(
                "file messages must carry a file name".into(),
            ));
        }
        Ok(Self::binary(MessageKind::File, payload, Some(file_name)))
    }

    /// An attached file: `image/*` becomes an image message, anything else a
    /// file message. The file name is kept either way.
    pub fn attachment(
        file_name: impl Into<String>,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<Self, ParleyError> {
        let payload = DataUri::new(mime, bytes)?;
        if payload.mime().starts_with("image/") {
            Ok(Self::image(&payload, Some(file_name.into())))
        } else {
            Self::file(&payload, file_name)
        }
    }

    /// Read a file from disk and turn it into an attachment.
    ///
    /// Read failures are returned to the caller as `Attachment` errors; they
    /// never go through the session error channel.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ParleyError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ParleyError::Attachment(format!("no file name in {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ParleyError::Attachment(format!("read {}: {e}", path.display())))?;
        tracing::debug!("attachment {file_name}: {} bytes", bytes.len());
        Self::attachment(file_name, guess_mime(path), bytes)
    }

    fn binary(kind: MessageKind, payload: &DataUri, file_name: Option<String>) -> Self {
        Self {
            id: MessageId::generate(),
            kind,
            content: payload.encode(),
            file_name,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub(crate) fn stamp(self, sender: &str, timestamp: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: self.id,
            kind: self.kind,
            content: self.content,
            sender: sender.to_string(),
            timestamp,
            file_name: self.file_name,
        }
    }
}

/// MIME type for the file types the attachment picker offers.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
