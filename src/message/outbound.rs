//! Outbound send requests and their engine-native commands

use crate::engine::{
    ButtonsCommand, EngineButton, LinkPreview, LinkPreviewMode, ListCommand, MediaCommand,
    SendReceipt, TextCommand,
};
use crate::types::{DeliveryStatus, PresenceType, SentMessage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Plain text message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub to: String,
    pub text: String,
}

impl TextMessage {
    pub fn to_command(&self) -> TextCommand {
        TextCommand {
            text: self.text.clone(),
            link_preview: LinkPreviewMode::Off,
        }
    }

    pub fn content(&self) -> Value {
        json!({ "text": self.text })
    }
}

/// Text message rendered with a link preview
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPreviewMessage {
    pub to: String,
    pub text: String,
    /// Link the engine should preview when no preview is supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_preview: Option<LinkPreview>,
}

impl LinkPreviewMessage {
    pub fn to_command(&self) -> TextCommand {
        let link_preview = match &self.link_preview {
            Some(preview) => LinkPreviewMode::Provided(preview.clone()),
            None => LinkPreviewMode::Generate,
        };
        TextCommand {
            text: self.text.clone(),
            link_preview,
        }
    }

    pub fn content(&self) -> Value {
        json!({ "text": self.text, "url": self.url, "linkPreview": self.link_preview })
    }
}

/// Media fetched from a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessage {
    pub to: String,
    pub url: String,
    /// `image`, `video`, `audio` or `document`
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl MediaMessage {
    pub fn to_command(&self) -> MediaCommand {
        MediaCommand {
            url: self.url.clone(),
            caption: self.caption.clone(),
            mime_type: self.mime_type.clone(),
            media_type: self.media_type.clone(),
            footer: self.footer.clone(),
        }
    }

    pub fn content(&self) -> Value {
        json!({
            "url": self.url,
            "type": self.media_type,
            "mimeType": self.mime_type,
            "caption": self.caption,
        })
    }
}

/// Template button as requested by callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateButton {
    /// `replyButton`, `callButton` or `urlButton`
    #[serde(rename = "type")]
    pub button_type: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Phone number for call buttons, URL for url buttons
    #[serde(default)]
    pub payload: Option<String>,
}

/// Text with template buttons
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonMessage {
    pub to: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub footer_text: Option<String>,
    pub buttons: Vec<TemplateButton>,
}

impl ButtonMessage {
    pub fn to_command(&self) -> ButtonsCommand {
        ButtonsCommand {
            text: self.text.clone().unwrap_or_default(),
            title: self.title.clone().unwrap_or_default(),
            footer: self.footer_text.clone().unwrap_or_default(),
            buttons: build_buttons(&self.buttons),
        }
    }

    pub fn content(&self) -> Value {
        json!({
            "title": self.title,
            "text": self.text,
            "footerText": self.footer_text,
            "buttons": self.buttons,
        })
    }
}

/// Translate caller buttons into engine buttons
///
/// Reply buttons get 1-based positional ids; unknown button types are dropped.
pub fn build_buttons(buttons: &[TemplateButton]) -> Vec<EngineButton> {
    buttons
        .iter()
        .enumerate()
        .filter_map(|(index, button)| {
            let text = button.title.clone().unwrap_or_default();
            let payload = button.payload.clone().unwrap_or_default();
            match button.button_type.as_str() {
                "replyButton" => Some(EngineButton::Reply {
                    text,
                    id: (index + 1).to_string(),
                }),
                "callButton" => Some(EngineButton::Call {
                    text,
                    phone_number: payload,
                }),
                "urlButton" => Some(EngineButton::Url { text, url: payload }),
                other => {
                    tracing::debug!(button_type = other, "Dropping unsupported button type");
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRow {
    pub title: String,
    pub row_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// Selectable list message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessage {
    pub to: String,
    pub title: String,
    pub text: String,
    /// Rendered as the footer
    #[serde(default)]
    pub description: String,
    pub button_text: String,
    pub sections: Vec<ListSection>,
}

impl ListMessage {
    pub fn to_command(&self) -> ListCommand {
        ListCommand {
            title: self.title.clone(),
            description: self.text.clone(),
            button_text: self.button_text.clone(),
            footer: self.description.clone(),
            sections: serde_json::to_value(&self.sections).unwrap_or(Value::Null),
        }
    }

    pub fn content(&self) -> Value {
        json!({
            "title": self.title,
            "text": self.text,
            "description": self.description,
            "buttonText": self.button_text,
            "sections": self.sections,
        })
    }
}

/// Presence announcement towards a target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub to: String,
    #[serde(default)]
    pub presence: PresenceType,
}

/// Build the canonical sent-message envelope for a send result
pub fn sent_message(to: &str, receipt: SendReceipt, content: Value) -> SentMessage {
    let message = if receipt.content.is_null() {
        content
    } else {
        receipt.content
    };

    SentMessage {
        to: to.to_string(),
        message_id: receipt.id,
        status: DeliveryStatus::Pending,
        message,
    }
}
