//! Wire object shapes used by the RPC facade.
//!
//! The server serializes these as camelCase JSON. Snapshot structs are
//! deliberately tolerant of absent fields (`#[serde(default)]`) so that a
//! newer server adding or retiring fields does not break decoding; only the
//! fields this client consumes are declared.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use chatmail_core::{ChatId, ContactId, MsgId, Timestamp};

/// Payload for `send_msg` and `add_device_message`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewtype: Option<Viewtype>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Latitude/longitude pair for location messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<MsgId>,
}

impl MsgData {
    /// Plain text message payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// Message content type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Viewtype {
    #[default]
    Unknown,
    Text,
    Image,
    Gif,
    Sticker,
    Audio,
    Voice,
    Video,
    File,
    VideochatInvitation,
    Webxdc,
    Vcard,
}

/// Message download state for partially-downloaded mail.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadState {
    #[default]
    Done,
    Available,
    Failure,
    InProgress,
}

/// Chat archive/pin state, as accepted by `set_chat_visibility`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatVisibility {
    Normal,
    Archived,
    Pinned,
}

/// One reaction emoji with its tally.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reaction {
    pub emoji: String,
    pub count: usize,
    pub is_from_self: bool,
}

/// All reactions on a message.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reactions {
    /// Reactions aggregated across contacts, newest first.
    pub reactions: Vec<Reaction>,
    pub reactions_by_contact: HashMap<ContactId, Vec<String>>,
}

/// Full state of a single message as reported by `get_message`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MsgSnapshot {
    pub id: MsgId,
    pub chat_id: ChatId,
    pub from_id: ContactId,
    pub text: String,
    pub timestamp: Timestamp,
    pub sort_timestamp: Timestamp,
    pub state: u32,
    pub error: Option<String>,
    pub is_info: bool,
    pub is_forwarded: bool,
    pub is_bot: bool,
    pub has_html: bool,
    pub has_location: bool,
    pub view_type: Viewtype,
    pub file: Option<String>,
    pub file_name: Option<String>,
    pub file_mime: Option<String>,
    pub file_bytes: u64,
    pub quoted_text: Option<String>,
    pub quoted_message_id: Option<MsgId>,
    pub override_sender_name: Option<String>,
    pub download_state: DownloadState,
    pub reactions: Option<Reactions>,
}

/// Contact details as reported by `get_contact`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactSnapshot {
    pub id: ContactId,
    pub address: String,
    pub name: String,
    pub display_name: String,
    pub auth_name: String,
    pub name_and_addr: String,
    pub color: String,
    pub status: String,
    pub profile_image: Option<String>,
    pub is_blocked: bool,
    pub is_verified: bool,
    pub last_seen: Timestamp,
    pub was_seen_recently: bool,
}

/// Cheap per-chat info as reported by `get_basic_chat_info`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasicChatSnapshot {
    pub id: ChatId,
    pub name: String,
    pub chat_type: u32,
    pub color: String,
    pub profile_image: Option<String>,
    pub archived: bool,
    pub is_protected: bool,
    pub is_unpromoted: bool,
    pub is_self_talk: bool,
    pub is_device_chat: bool,
    pub is_contact_request: bool,
    pub is_muted: bool,
}

/// Everything `get_full_chat_by_id` reports on top of the basic info.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FullChatSnapshot {
    pub id: ChatId,
    pub name: String,
    pub chat_type: u32,
    pub color: String,
    pub profile_image: Option<String>,
    pub archived: bool,
    pub is_protected: bool,
    pub is_unpromoted: bool,
    pub is_self_talk: bool,
    pub is_device_chat: bool,
    pub is_contact_request: bool,
    pub is_muted: bool,
    pub contact_ids: Vec<ContactId>,
    pub fresh_message_counter: usize,
    pub self_in_group: bool,
    pub can_send: bool,
    pub ephemeral_timer: u32,
    pub was_seen_recently: bool,
    pub mailing_list_address: Option<String>,
}

/// One entry of the chat list overview.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatListItem {
    pub id: ChatId,
    pub name: String,
    pub avatar_path: Option<String>,
    pub color: String,
    pub last_updated: Option<Timestamp>,
    pub summary_text1: String,
    pub summary_text2: String,
    pub is_group: bool,
    pub is_protected: bool,
    pub is_self_talk: bool,
    pub is_device_talk: bool,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub is_archived: bool,
    pub is_contact_request: bool,
    pub fresh_message_counter: usize,
    pub last_message_id: Option<MsgId>,
}

/// Summary row for `message_ids_to_search_results`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MsgSearchResult {
    pub id: MsgId,
    pub author_name: String,
    pub author_color: String,
    pub author_profile_image: Option<String>,
    pub chat_name: Option<String>,
    pub chat_profile_image: Option<String>,
    pub message: String,
    pub timestamp: Timestamp,
}

/// Manifest data of a webxdc app message.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebxdcMsgInfo {
    pub name: String,
    pub icon: String,
    pub document: Option<String>,
    pub summary: Option<String>,
    pub source_code_url: Option<String>,
    pub internet_access: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_data_skips_unset_fields() {
        let json = serde_json::to_value(MsgData::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "hi" }));
    }

    #[test]
    fn snapshots_tolerate_sparse_objects() {
        let snapshot: MsgSnapshot = serde_json::from_str(
            r#"{"id":7,"chatId":2,"fromId":10,"text":"hi","viewType":"Text","unknownField":true}"#,
        )
        .unwrap();
        assert_eq!(snapshot.id, MsgId(7));
        assert_eq!(snapshot.chat_id, ChatId(2));
        assert_eq!(snapshot.text, "hi");
        assert_eq!(snapshot.view_type, Viewtype::Text);
        assert!(snapshot.file.is_none());
    }

    #[test]
    fn reactions_decode_by_contact() {
        let reactions: Reactions = serde_json::from_str(
            r#"{"reactions":[{"emoji":":)","count":1,"isFromSelf":true}],"reactionsByContact":{"1":[":)"]}}"#,
        )
        .unwrap();
        assert_eq!(reactions.reactions[0].emoji, ":)");
        assert!(reactions.reactions[0].is_from_self);
        assert_eq!(reactions.reactions_by_contact[&ContactId(1)], vec![":)"]);
    }

    #[test]
    fn chat_visibility_uses_variant_names() {
        assert_eq!(
            serde_json::to_string(&ChatVisibility::Pinned).unwrap(),
            r#""Pinned""#
        );
    }
}
