//! Decoded core-server events.
//!
//! The server delivers one flat record per event: a `kind` tag plus a union
//! of nullable fields. [`RawEvent::into_event`] projects that record into the
//! variant carrying exactly the fields that are meaningful for its kind;
//! everything else on the wire is ignored. Kinds this crate does not know
//! decode to [`Event::Unknown`] so that a newer server never breaks an older
//! client.

use serde::Deserialize;

use crate::ids::{AccountId, ChatId, ContactId, MsgId};

/// Wire record returned by the `get_next_event` call.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Account the event belongs to.
    pub context_id: AccountId,
    pub event: RawEvent,
}

/// Undecoded event payload: the `kind` tag and the union of all fields any
/// kind may carry. Absent and `null` fields are equivalent.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEvent {
    pub kind: String,
    pub msg: Option<String>,
    pub file: Option<String>,
    pub chat_id: Option<ChatId>,
    pub msg_id: Option<MsgId>,
    pub contact_id: Option<ContactId>,
    pub msg_ids: Option<Vec<MsgId>>,
    pub timer: Option<i64>,
    pub progress: Option<u32>,
    pub comment: Option<String>,
    pub path: Option<String>,
    pub status_update_serial: Option<u32>,
    pub key: Option<String>,
}

/// One decoded core-server event.
///
/// Progress values use the server's permille convention: 0 = error,
/// 1–999 = progress, 1000 = done.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Informational log line from the core. Not meant for end users.
    Info { msg: String },
    /// Log warning from the core. Not meant for end users.
    Warning { msg: String },
    /// Error the user should be informed about, unobtrusively.
    Error { msg: String },
    /// An action failed because the account is no longer a group member.
    ErrorSelfNotInGroup { msg: String },
    /// SMTP connection established and login succeeded.
    SmtpConnected { msg: String },
    /// IMAP connection established and login succeeded.
    ImapConnected { msg: String },
    /// A message was handed to the SMTP server.
    SmtpMessageSent { msg: String },
    /// An IMAP message was marked as deleted.
    ImapMessageDeleted { msg: String },
    /// An IMAP message was moved between folders.
    ImapMessageMoved { msg: String },
    /// About to IDLE on the inbox folder.
    ImapInboxIdle,
    /// A file appeared in the account's blob directory.
    NewBlobFile { file: String },
    /// A file was removed from the account's blob directory.
    DeletedBlobFile { file: String },
    /// Messages or chats changed in the database. Ids are zero when more
    /// than one chat/message is affected.
    MsgsChanged { chat_id: ChatId, msg_id: MsgId },
    /// Reactions for a message changed.
    ReactionsChanged {
        chat_id: ChatId,
        msg_id: MsgId,
        contact_id: ContactId,
    },
    /// A fresh incoming message arrived.
    IncomingMsg { chat_id: ChatId, msg_id: MsgId },
    /// A batch of incoming messages finished downloading.
    IncomingMsgBunch,
    /// Messages in a chat were seen or noticed.
    MsgsNoticed { chat_id: ChatId },
    /// An outgoing message reached the server (pending → delivered).
    MsgDelivered { chat_id: ChatId, msg_id: MsgId },
    /// An outgoing message could not be sent.
    MsgFailed { chat_id: ChatId, msg_id: MsgId },
    /// A read receipt arrived for an outgoing message.
    MsgRead { chat_id: ChatId, msg_id: MsgId },
    /// A message was deleted.
    MsgDeleted { chat_id: ChatId, msg_id: MsgId },
    /// Chat name, image, membership or verify state changed.
    ChatModified { chat_id: ChatId },
    /// The chat's ephemeral ("disappearing messages") timer changed.
    ChatEphemeralTimerModified { chat_id: ChatId, timer: i64 },
    /// Contact(s) created, renamed, blocked or deleted. Zero id when several
    /// contacts changed.
    ContactsChanged { contact_id: ContactId },
    /// Location of one or more contacts changed. Zero id when several did.
    LocationChanged { contact_id: ContactId },
    /// Progress of an ongoing account configuration.
    ConfigureProgress { progress: u32, comment: String },
    /// Progress of an ongoing import/export.
    ImexProgress { progress: u32 },
    /// An import/export operation wrote a file.
    ImexFileWritten { path: String },
    /// Secure-join handshake progress, seen from the QR-code presenter.
    SecurejoinInviterProgress { contact_id: ContactId, progress: u32 },
    /// Secure-join handshake progress, seen from the QR-code scanner.
    SecurejoinJoinerProgress { contact_id: ContactId, progress: u32 },
    /// Connectivity to the mail servers changed.
    ConnectivityChanged,
    /// The account's own avatar changed.
    SelfavatarChanged,
    /// A multi-device-synced config value changed. The value itself is not
    /// carried, only the key.
    ConfigSynced { key: String },
    /// A webxdc app received a status update.
    WebxdcStatusUpdate {
        msg_id: MsgId,
        status_update_serial: u32,
    },
    /// A message holding a webxdc instance was deleted.
    WebxdcInstanceDeleted { msg_id: MsgId },
    /// The account manager finished (or timed out) a background fetch.
    AccountsBackgroundFetchDone,
    /// Event kind from a newer, unsupported core server.
    Unknown { kind: String },
}

/// Fieldless discriminant of [`Event`], used as the handler-map key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Info,
    Warning,
    Error,
    ErrorSelfNotInGroup,
    SmtpConnected,
    ImapConnected,
    SmtpMessageSent,
    ImapMessageDeleted,
    ImapMessageMoved,
    ImapInboxIdle,
    NewBlobFile,
    DeletedBlobFile,
    MsgsChanged,
    ReactionsChanged,
    IncomingMsg,
    IncomingMsgBunch,
    MsgsNoticed,
    MsgDelivered,
    MsgFailed,
    MsgRead,
    MsgDeleted,
    ChatModified,
    ChatEphemeralTimerModified,
    ContactsChanged,
    LocationChanged,
    ConfigureProgress,
    ImexProgress,
    ImexFileWritten,
    SecurejoinInviterProgress,
    SecurejoinJoinerProgress,
    ConnectivityChanged,
    SelfavatarChanged,
    ConfigSynced,
    WebxdcStatusUpdate,
    WebxdcInstanceDeleted,
    AccountsBackgroundFetchDone,
    Unknown,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Info { .. } => EventKind::Info,
            Event::Warning { .. } => EventKind::Warning,
            Event::Error { .. } => EventKind::Error,
            Event::ErrorSelfNotInGroup { .. } => EventKind::ErrorSelfNotInGroup,
            Event::SmtpConnected { .. } => EventKind::SmtpConnected,
            Event::ImapConnected { .. } => EventKind::ImapConnected,
            Event::SmtpMessageSent { .. } => EventKind::SmtpMessageSent,
            Event::ImapMessageDeleted { .. } => EventKind::ImapMessageDeleted,
            Event::ImapMessageMoved { .. } => EventKind::ImapMessageMoved,
            Event::ImapInboxIdle => EventKind::ImapInboxIdle,
            Event::NewBlobFile { .. } => EventKind::NewBlobFile,
            Event::DeletedBlobFile { .. } => EventKind::DeletedBlobFile,
            Event::MsgsChanged { .. } => EventKind::MsgsChanged,
            Event::ReactionsChanged { .. } => EventKind::ReactionsChanged,
            Event::IncomingMsg { .. } => EventKind::IncomingMsg,
            Event::IncomingMsgBunch => EventKind::IncomingMsgBunch,
            Event::MsgsNoticed { .. } => EventKind::MsgsNoticed,
            Event::MsgDelivered { .. } => EventKind::MsgDelivered,
            Event::MsgFailed { .. } => EventKind::MsgFailed,
            Event::MsgRead { .. } => EventKind::MsgRead,
            Event::MsgDeleted { .. } => EventKind::MsgDeleted,
            Event::ChatModified { .. } => EventKind::ChatModified,
            Event::ChatEphemeralTimerModified { .. } => EventKind::ChatEphemeralTimerModified,
            Event::ContactsChanged { .. } => EventKind::ContactsChanged,
            Event::LocationChanged { .. } => EventKind::LocationChanged,
            Event::ConfigureProgress { .. } => EventKind::ConfigureProgress,
            Event::ImexProgress { .. } => EventKind::ImexProgress,
            Event::ImexFileWritten { .. } => EventKind::ImexFileWritten,
            Event::SecurejoinInviterProgress { .. } => EventKind::SecurejoinInviterProgress,
            Event::SecurejoinJoinerProgress { .. } => EventKind::SecurejoinJoinerProgress,
            Event::ConnectivityChanged => EventKind::ConnectivityChanged,
            Event::SelfavatarChanged => EventKind::SelfavatarChanged,
            Event::ConfigSynced { .. } => EventKind::ConfigSynced,
            Event::WebxdcStatusUpdate { .. } => EventKind::WebxdcStatusUpdate,
            Event::WebxdcInstanceDeleted { .. } => EventKind::WebxdcInstanceDeleted,
            Event::AccountsBackgroundFetchDone => EventKind::AccountsBackgroundFetchDone,
            Event::Unknown { .. } => EventKind::Unknown,
        }
    }
}

impl RawEvent {
    /// Project the wire record into the typed variant for its kind.
    pub fn into_event(self) -> Event {
        let msg = self.msg.unwrap_or_default();
        let file = self.file.unwrap_or_default();
        let chat_id = self.chat_id.unwrap_or_default();
        let msg_id = self.msg_id.unwrap_or_default();
        let contact_id = self.contact_id.unwrap_or_default();
        let progress = self.progress.unwrap_or_default();

        match self.kind.as_str() {
            "Info" => Event::Info { msg },
            "Warning" => Event::Warning { msg },
            "Error" => Event::Error { msg },
            "ErrorSelfNotInGroup" => Event::ErrorSelfNotInGroup { msg },
            "SmtpConnected" => Event::SmtpConnected { msg },
            "ImapConnected" => Event::ImapConnected { msg },
            "SmtpMessageSent" => Event::SmtpMessageSent { msg },
            "ImapMessageDeleted" => Event::ImapMessageDeleted { msg },
            "ImapMessageMoved" => Event::ImapMessageMoved { msg },
            "ImapInboxIdle" => Event::ImapInboxIdle,
            "NewBlobFile" => Event::NewBlobFile { file },
            "DeletedBlobFile" => Event::DeletedBlobFile { file },
            "MsgsChanged" => Event::MsgsChanged { chat_id, msg_id },
            "ReactionsChanged" => Event::ReactionsChanged {
                chat_id,
                msg_id,
                contact_id,
            },
            "IncomingMsg" => Event::IncomingMsg { chat_id, msg_id },
            "IncomingMsgBunch" => Event::IncomingMsgBunch,
            "MsgsNoticed" => Event::MsgsNoticed { chat_id },
            "MsgDelivered" => Event::MsgDelivered { chat_id, msg_id },
            "MsgFailed" => Event::MsgFailed { chat_id, msg_id },
            "MsgRead" => Event::MsgRead { chat_id, msg_id },
            "MsgDeleted" => Event::MsgDeleted { chat_id, msg_id },
            "ChatModified" => Event::ChatModified { chat_id },
            "ChatEphemeralTimerModified" => Event::ChatEphemeralTimerModified {
                chat_id,
                timer: self.timer.unwrap_or_default(),
            },
            "ContactsChanged" => Event::ContactsChanged { contact_id },
            "LocationChanged" => Event::LocationChanged { contact_id },
            "ConfigureProgress" => Event::ConfigureProgress {
                progress,
                comment: self.comment.unwrap_or_default(),
            },
            "ImexProgress" => Event::ImexProgress { progress },
            "ImexFileWritten" => Event::ImexFileWritten {
                path: self.path.unwrap_or_default(),
            },
            "SecurejoinInviterProgress" => Event::SecurejoinInviterProgress {
                contact_id,
                progress,
            },
            "SecurejoinJoinerProgress" => Event::SecurejoinJoinerProgress {
                contact_id,
                progress,
            },
            "ConnectivityChanged" => Event::ConnectivityChanged,
            "SelfavatarChanged" => Event::SelfavatarChanged,
            "ConfigSynced" => Event::ConfigSynced {
                key: self.key.unwrap_or_default(),
            },
            "WebxdcStatusUpdate" => Event::WebxdcStatusUpdate {
                msg_id,
                status_update_serial: self.status_update_serial.unwrap_or_default(),
            },
            "WebxdcInstanceDeleted" => Event::WebxdcInstanceDeleted { msg_id },
            "AccountsBackgroundFetchDone" => Event::AccountsBackgroundFetchDone,
            _ => Event::Unknown {
                kind: self.kind.clone(),
            },
        }
    }
}
