//! Engine-native send commands
//!
//! Built from typed requests by `message::outbound`; consumed by
//! `EngineHandle` implementations.

use serde::{Deserialize, Serialize};

/// Link preview attached to a text message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPreview {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub canonical_url: String,
    pub matched_text: String,
    #[serde(default = "default_true")]
    pub do_not_play_inline: bool,
}

fn default_true() -> bool {
    true
}

/// How a text message should render links
#[derive(Debug, Clone, PartialEq)]
pub enum LinkPreviewMode {
    /// No preview
    Off,
    /// Let the engine fetch and render the preview itself
    Generate,
    /// Use the supplied preview
    Provided(LinkPreview),
}

/// Plain or link-previewed text
#[derive(Debug, Clone, PartialEq)]
pub struct TextCommand {
    pub text: String,
    pub link_preview: LinkPreviewMode,
}

/// Media fetched by the engine from a URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaCommand {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// `image`, `video`, `audio` or `document`
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

/// A single template button in engine form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineButton {
    Reply {
        text: String,
        id: String,
    },
    Call {
        text: String,
        #[serde(rename = "phoneNumber")]
        phone_number: String,
    },
    Url {
        text: String,
        url: String,
    },
}

/// Text with template buttons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonsCommand {
    pub text: String,
    pub title: String,
    pub footer: String,
    pub buttons: Vec<EngineButton>,
}

/// Selectable list message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCommand {
    pub title: String,
    pub description: String,
    pub button_text: String,
    pub footer: String,
    pub sections: serde_json::Value,
}

/// What the engine reports after a successful send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub id: String,
    /// Engine echo of the sent content, if any
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Registration lookup answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatus {
    pub exists: bool,
    /// Canonical user id (without suffix) as known to the network
    pub canonical_id: String,
}
