//! Typed facade over the core server's JSON-RPC surface.
//!
//! One thin async wrapper per remote procedure; parameters are positional and
//! serialized from tuples, results are decoded into the shapes of
//! [`crate::types`]. The heavy lifting all happens server-side.

use std::{collections::HashMap, path::Path, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use chatmail_core::{AccountId, ChatId, ContactId, Event, MsgId, Result};

use crate::transport::RpcTransport;
use crate::types::{
    BasicChatSnapshot, ChatListItem, ChatVisibility, ContactSnapshot, FullChatSnapshot, MsgData,
    MsgSearchResult, MsgSnapshot, Reactions, Viewtype, WebxdcMsgInfo,
};

/// Client for the core server. This is the root of the API.
///
/// Cheap to clone; clones share the underlying transport.
#[derive(Clone)]
pub struct Rpc {
    transport: Arc<dyn RpcTransport>,
}

impl Rpc {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    /// Fire-and-await call expecting no result.
    pub async fn call(&self, method: &str, params: impl Serialize) -> Result<()> {
        self.transport
            .request(method, positional(params)?)
            .await?;
        Ok(())
    }

    /// Call decoding the response into the method's declared result shape.
    pub async fn call_result<T: DeserializeOwned>(
        &self,
        method: &str,
        params: impl Serialize,
    ) -> Result<T> {
        let value = self.transport.request(method, positional(params)?).await?;
        Ok(serde_json::from_value(value)?)
    }

    // ---------------------------------------------
    //  Misc top level functions
    // ---------------------------------------------

    /// Check if an email address is valid.
    pub async fn check_email_validity(&self, email: &str) -> Result<bool> {
        self.call_result("check_email_validity", (email,)).await
    }

    /// Get general system info.
    pub async fn get_system_info(&self) -> Result<HashMap<String, String>> {
        self.call_result("get_system_info", ()).await
    }

    /// Get the next event. Blocks in the server until one is available.
    pub async fn get_next_event(&self) -> Result<(AccountId, Event)> {
        let envelope: chatmail_core::event::EventEnvelope =
            self.call_result("get_next_event", ()).await?;
        Ok((envelope.context_id, envelope.event.into_event()))
    }

    // ---------------------------------------------
    //  Account management
    // ---------------------------------------------

    /// Create a new account.
    pub async fn add_account(&self) -> Result<AccountId> {
        self.call_result("add_account", ()).await
    }

    /// Remove an account.
    pub async fn remove_account(&self, account_id: AccountId) -> Result<()> {
        self.call("remove_account", (account_id,)).await
    }

    /// Return all available accounts.
    pub async fn get_all_account_ids(&self) -> Result<Vec<AccountId>> {
        self.call_result("get_all_account_ids", ()).await
    }

    /// Select account id for the server's internally selected state.
    pub async fn select_account(&self, account_id: AccountId) -> Result<()> {
        self.call("select_account", (account_id,)).await
    }

    /// Get the selected account id of the internal state, if any.
    pub async fn get_selected_account_id(&self) -> Result<Option<AccountId>> {
        self.call_result("get_selected_account_id", ()).await
    }

    /// Start the I/O of all accounts.
    pub async fn start_io_for_all_accounts(&self) -> Result<()> {
        self.call("start_io_for_all_accounts", ()).await
    }

    /// Stop the I/O of all accounts.
    pub async fn stop_io_for_all_accounts(&self) -> Result<()> {
        self.call("stop_io_for_all_accounts", ()).await
    }

    // ---------------------------------------------
    //  Methods that work on individual accounts
    // ---------------------------------------------

    /// Start the account I/O.
    pub async fn start_io(&self, account_id: AccountId) -> Result<()> {
        self.call("start_io", (account_id,)).await
    }

    /// Stop the account I/O.
    pub async fn stop_io(&self, account_id: AccountId) -> Result<()> {
        self.call("stop_io", (account_id,)).await
    }

    /// Get the combined filesize of an account in bytes.
    pub async fn get_account_file_size(&self, account_id: AccountId) -> Result<u64> {
        self.call_result("get_account_file_size", (account_id,)).await
    }

    /// Check if the account is already configured.
    pub async fn is_configured(&self, account_id: AccountId) -> Result<bool> {
        self.call_result("is_configured", (account_id,)).await
    }

    /// Get system info for an account.
    pub async fn get_info(&self, account_id: AccountId) -> Result<HashMap<String, String>> {
        self.call_result("get_info", (account_id,)).await
    }

    /// Set an account configuration value. `None` clears the key.
    pub async fn set_config(
        &self,
        account_id: AccountId,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        self.call("set_config", (account_id, key, value)).await
    }

    /// Tweak several account configuration values in a batch.
    pub async fn batch_set_config(
        &self,
        account_id: AccountId,
        config: &HashMap<String, Option<String>>,
    ) -> Result<()> {
        self.call("batch_set_config", (account_id, config)).await
    }

    /// Get an account configuration value.
    pub async fn get_config(&self, account_id: AccountId, key: &str) -> Result<Option<String>> {
        self.call_result("get_config", (account_id, key)).await
    }

    /// Get a batch of account configuration values.
    pub async fn batch_get_config(
        &self,
        account_id: AccountId,
        keys: &[&str],
    ) -> Result<HashMap<String, Option<String>>> {
        self.call_result("batch_get_config", (account_id, keys)).await
    }

    /// Set stock translation strings.
    pub async fn set_stock_strings(&self, translations: &HashMap<u32, String>) -> Result<()> {
        self.call("set_stock_strings", (translations,)).await
    }

    /// Configure an account with the currently set parameters.
    /// Set up the credential config before calling this.
    pub async fn configure(&self, account_id: AccountId) -> Result<()> {
        self.call("configure", (account_id,)).await
    }

    /// Set config values from a QR code payload, e.g. a `dclogin:` or
    /// `dcaccount:` invite.
    pub async fn set_config_from_qr(&self, account_id: AccountId, qr_content: &str) -> Result<()> {
        self.call("set_config_from_qr", (account_id, qr_content)).await
    }

    /// Signal an ongoing process (configuration, import/export) to stop.
    pub async fn stop_ongoing_process(&self, account_id: AccountId) -> Result<()> {
        self.call("stop_ongoing_process", (account_id,)).await
    }

    /// Return the message IDs of all fresh messages of any chat, newest
    /// first. Messages of muted chats and contact requests are not included.
    pub async fn get_fresh_msgs(&self, account_id: AccountId) -> Result<Vec<MsgId>> {
        self.call_result("get_fresh_msgs", (account_id,)).await
    }

    /// Get the number of fresh messages in a chat, muted or not.
    pub async fn get_fresh_msg_cnt(&self, account_id: AccountId, chat_id: ChatId) -> Result<usize> {
        self.call_result("get_fresh_msg_cnt", (account_id, chat_id)).await
    }

    /// Get messages to be processed by a bot: ids above the `last_msg_id`
    /// config value. Advance the cursor (directly or via
    /// [`markseen_msgs`](Self::markseen_msgs)) after processing.
    pub async fn get_next_msgs(&self, account_id: AccountId) -> Result<Vec<MsgId>> {
        self.call_result("get_next_msgs", (account_id,)).await
    }

    /// Like [`get_next_msgs`](Self::get_next_msgs) but waits in the server
    /// for the next new-message notification before returning. Stopping I/O
    /// interrupts a pending call, which allows orderly bot shutdown.
    pub async fn wait_next_msgs(&self, account_id: AccountId) -> Result<Vec<MsgId>> {
        self.call_result("wait_next_msgs", (account_id,)).await
    }

    /// Estimate the number of messages the `delete_device_after` /
    /// `delete_server_after` settings would delete.
    pub async fn estimate_auto_deletion_count(
        &self,
        account_id: AccountId,
        from_server: bool,
        seconds: i64,
    ) -> Result<usize> {
        self.call_result(
            "estimate_auto_deletion_count",
            (account_id, from_server, seconds),
        )
        .await
    }

    // ---------------------------------------------
    //  autocrypt
    // ---------------------------------------------

    /// Start the Autocrypt key transfer; returns the setup code.
    pub async fn initiate_autocrypt_key_transfer(&self, account_id: AccountId) -> Result<String> {
        self.call_result("initiate_autocrypt_key_transfer", (account_id,)).await
    }

    /// Continue an Autocrypt key transfer started on another device.
    pub async fn continue_autocrypt_key_transfer(
        &self,
        account_id: AccountId,
        msg_id: MsgId,
        setup_code: &str,
    ) -> Result<()> {
        self.call(
            "continue_autocrypt_key_transfer",
            (account_id, msg_id, setup_code),
        )
        .await
    }

    /// Export the account's self keys into a directory.
    pub async fn export_self_keys(&self, account_id: AccountId, path: &Path) -> Result<()> {
        self.call("export_self_keys", (account_id, path)).await
    }

    /// Import self keys from a directory.
    pub async fn import_self_keys(&self, account_id: AccountId, path: &Path) -> Result<()> {
        self.call("import_self_keys", (account_id, path)).await
    }

    // ---------------------------------------------
    //  chat list
    // ---------------------------------------------

    pub async fn get_chatlist_entries(
        &self,
        account_id: AccountId,
        list_flags: Option<u32>,
        query: Option<&str>,
        contact_id: Option<ContactId>,
    ) -> Result<Vec<ChatId>> {
        self.call_result(
            "get_chatlist_entries",
            (account_id, list_flags, query, contact_id),
        )
        .await
    }

    pub async fn get_chatlist_items_by_entries(
        &self,
        account_id: AccountId,
        entries: &[ChatId],
    ) -> Result<HashMap<ChatId, ChatListItem>> {
        self.call_result("get_chatlist_items_by_entries", (account_id, entries)).await
    }

    // ---------------------------------------------
    //  chat
    // ---------------------------------------------

    pub async fn get_full_chat_by_id(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
    ) -> Result<FullChatSnapshot> {
        self.call_result("get_full_chat_by_id", (account_id, chat_id)).await
    }

    /// Get basic info about a chat; use
    /// [`get_full_chat_by_id`](Self::get_full_chat_by_id) for more.
    pub async fn get_basic_chat_info(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
    ) -> Result<BasicChatSnapshot> {
        self.call_result("get_basic_chat_info", (account_id, chat_id)).await
    }

    pub async fn accept_chat(&self, account_id: AccountId, chat_id: ChatId) -> Result<()> {
        self.call("accept_chat", (account_id, chat_id)).await
    }

    pub async fn block_chat(&self, account_id: AccountId, chat_id: ChatId) -> Result<()> {
        self.call("block_chat", (account_id, chat_id)).await
    }

    /// Delete a chat on this device. Messages stay on the server, the
    /// contact is not blocked and groups are not left.
    pub async fn delete_chat(&self, account_id: AccountId, chat_id: ChatId) -> Result<()> {
        self.call("delete_chat", (account_id, chat_id)).await
    }

    /// Multi-line encryption info for all chat members, e.g. to find out why
    /// messages to a group are sent unencrypted.
    pub async fn get_chat_encryption_info(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
    ) -> Result<String> {
        self.call_result("get_chat_encryption_info", (account_id, chat_id)).await
    }

    /// QR code text offering a secure-join invitation: for the group when
    /// `chat_id` is set, otherwise a setup-contact invitation.
    pub async fn get_chat_securejoin_qr_code(
        &self,
        account_id: AccountId,
        chat_id: Option<ChatId>,
    ) -> Result<String> {
        self.call_result("get_chat_securejoin_qr_code", (account_id, chat_id)).await
    }

    /// Secure-join QR code as `(text, svg)`.
    pub async fn get_chat_securejoin_qr_code_svg(
        &self,
        account_id: AccountId,
        chat_id: Option<ChatId>,
    ) -> Result<(String, String)> {
        self.call_result("get_chat_securejoin_qr_code_svg", (account_id, chat_id)).await
    }

    /// Continue a setup-contact or group-invite protocol started on another
    /// device; returns the chat of the protocol partner.
    pub async fn secure_join(&self, account_id: AccountId, qrdata: &str) -> Result<ChatId> {
        self.call_result("secure_join", (account_id, qrdata)).await
    }

    pub async fn leave_group(&self, account_id: AccountId, chat_id: ChatId) -> Result<()> {
        self.call("leave_group", (account_id, chat_id)).await
    }

    /// Remove a member from a group.
    pub async fn remove_contact_from_chat(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        contact_id: ContactId,
    ) -> Result<()> {
        self.call("remove_contact_from_chat", (account_id, chat_id, contact_id)).await
    }

    /// Add a member to a group.
    pub async fn add_contact_to_chat(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        contact_id: ContactId,
    ) -> Result<()> {
        self.call("add_contact_to_chat", (account_id, chat_id, contact_id)).await
    }

    /// Contact ids belonging to a chat: the single peer for 1:1 chats, all
    /// members (including self) for groups, all recipients for broadcasts.
    pub async fn get_chat_contacts(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
    ) -> Result<Vec<ContactId>> {
        self.call_result("get_chat_contacts", (account_id, chat_id)).await
    }

    /// Create a new group chat with only the self-contact as member.
    pub async fn create_group_chat(
        &self,
        account_id: AccountId,
        name: &str,
        protected: bool,
    ) -> Result<ChatId> {
        self.call_result("create_group_chat", (account_id, name, protected)).await
    }

    /// Create a new broadcast list.
    pub async fn create_broadcast_list(&self, account_id: AccountId) -> Result<ChatId> {
        self.call_result("create_broadcast_list", (account_id,)).await
    }

    /// Set group name.
    pub async fn set_chat_name(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        name: &str,
    ) -> Result<()> {
        self.call("set_chat_name", (account_id, chat_id, name)).await
    }

    /// Set or (with `None`) delete the group profile image. Promoted groups
    /// are informed by an automatic status message.
    pub async fn set_chat_profile_image(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        path: Option<&Path>,
    ) -> Result<()> {
        self.call("set_chat_profile_image", (account_id, chat_id, path)).await
    }

    pub async fn set_chat_visibility(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        visibility: ChatVisibility,
    ) -> Result<()> {
        self.call("set_chat_visibility", (account_id, chat_id, visibility)).await
    }

    pub async fn set_chat_ephemeral_timer(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        timer: u32,
    ) -> Result<()> {
        self.call("set_chat_ephemeral_timer", (account_id, chat_id, timer)).await
    }

    pub async fn get_chat_ephemeral_timer(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
    ) -> Result<u32> {
        self.call_result("get_chat_ephemeral_timer", (account_id, chat_id)).await
    }

    /// Add a message to the device-chat, deduplicated by `label`. `None`
    /// suppresses the labelled message for good.
    pub async fn add_device_message(
        &self,
        account_id: AccountId,
        label: &str,
        msg: Option<&MsgData>,
    ) -> Result<MsgId> {
        self.call_result("add_device_message", (account_id, label, msg)).await
    }

    /// Mark all messages in a chat as noticed: no longer fresh, but still
    /// waiting for [`markseen_msgs`](Self::markseen_msgs).
    pub async fn marknoticed_chat(&self, account_id: AccountId, chat_id: ChatId) -> Result<()> {
        self.call("marknoticed_chat", (account_id, chat_id)).await
    }

    pub async fn get_first_unread_message_of_chat(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
    ) -> Result<Option<MsgId>> {
        self.call_result("get_first_unread_message_of_chat", (account_id, chat_id)).await
    }

    // ---------------------------------------------
    //  message list
    // ---------------------------------------------

    /// Mark messages as presented to the user: updates IMAP state, sends
    /// MDNs when enabled, and raises `last_msg_id` to the maximum of the
    /// passed ids, so bots marking messages seen need not track the cursor
    /// themselves.
    pub async fn markseen_msgs(&self, account_id: AccountId, msg_ids: &[MsgId]) -> Result<()> {
        self.call("markseen_msgs", (account_id, msg_ids)).await
    }

    pub async fn get_message_ids(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        info_only: bool,
        add_daymarker: bool,
    ) -> Result<Vec<MsgId>> {
        self.call_result(
            "get_message_ids",
            (account_id, chat_id, info_only, add_daymarker),
        )
        .await
    }

    pub async fn get_message(&self, account_id: AccountId, msg_id: MsgId) -> Result<MsgSnapshot> {
        self.call_result("get_message", (account_id, msg_id)).await
    }

    pub async fn get_messages(
        &self,
        account_id: AccountId,
        msg_ids: &[MsgId],
    ) -> Result<HashMap<MsgId, MsgSnapshot>> {
        self.call_result("get_messages", (account_id, msg_ids)).await
    }

    /// Get the HTML part of a message, if any.
    pub async fn get_message_html(
        &self,
        account_id: AccountId,
        msg_id: MsgId,
    ) -> Result<Option<String>> {
        self.call_result("get_message_html", (account_id, msg_id)).await
    }

    /// Delete messages on this device and on the IMAP server.
    pub async fn delete_messages(&self, account_id: AccountId, msg_ids: &[MsgId]) -> Result<()> {
        self.call("delete_messages", (account_id, msg_ids)).await
    }

    /// Multi-line informational text for a message, e.g. its raw source.
    pub async fn get_message_info(&self, account_id: AccountId, msg_id: MsgId) -> Result<String> {
        self.call_result("get_message_info", (account_id, msg_id)).await
    }

    /// Ask the core to fully download a partially-downloaded message.
    pub async fn download_full_message(
        &self,
        account_id: AccountId,
        msg_id: MsgId,
    ) -> Result<()> {
        self.call("download_full_message", (account_id, msg_id)).await
    }

    /// Search messages globally (`chat_id` unset, capped at 1000 results) or
    /// within one chat (uncapped).
    pub async fn search_messages(
        &self,
        account_id: AccountId,
        query: &str,
        chat_id: Option<ChatId>,
    ) -> Result<Vec<MsgId>> {
        self.call_result("search_messages", (account_id, query, chat_id)).await
    }

    pub async fn message_ids_to_search_results(
        &self,
        account_id: AccountId,
        msg_ids: &[MsgId],
    ) -> Result<HashMap<MsgId, MsgSearchResult>> {
        self.call_result("message_ids_to_search_results", (account_id, msg_ids)).await
    }

    // ---------------------------------------------
    //  contact
    // ---------------------------------------------

    /// Get the properties of a single contact by ID.
    pub async fn get_contact(
        &self,
        account_id: AccountId,
        contact_id: ContactId,
    ) -> Result<ContactSnapshot> {
        self.call_result("get_contact", (account_id, contact_id)).await
    }

    /// Add a single contact; returns the id of the created or existing
    /// contact.
    pub async fn create_contact(
        &self,
        account_id: AccountId,
        email: &str,
        name: &str,
    ) -> Result<ContactId> {
        self.call_result("create_contact", (account_id, email, name)).await
    }

    /// Import contacts from a vCard; returns the created or modified ids in
    /// vCard order.
    pub async fn import_vcard_contents(
        &self,
        account_id: AccountId,
        vcard: &str,
    ) -> Result<Vec<ContactId>> {
        self.call_result("import_vcard_contents", (account_id, vcard)).await
    }

    /// Return a vCard containing the given contacts.
    pub async fn make_vcard(
        &self,
        account_id: AccountId,
        contacts: &[ContactId],
    ) -> Result<String> {
        self.call_result("make_vcard", (account_id, contacts)).await
    }

    /// Returns the id of the created or existing 1:1 chat with a contact.
    pub async fn create_chat_by_contact_id(
        &self,
        account_id: AccountId,
        contact_id: ContactId,
    ) -> Result<ChatId> {
        self.call_result("create_chat_by_contact_id", (account_id, contact_id)).await
    }

    pub async fn block_contact(
        &self,
        account_id: AccountId,
        contact_id: ContactId,
    ) -> Result<()> {
        self.call("block_contact", (account_id, contact_id)).await
    }

    pub async fn unblock_contact(
        &self,
        account_id: AccountId,
        contact_id: ContactId,
    ) -> Result<()> {
        self.call("unblock_contact", (account_id, contact_id)).await
    }

    pub async fn get_blocked_contacts(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<ContactSnapshot>> {
        self.call_result("get_blocked_contacts", (account_id,)).await
    }

    pub async fn get_contact_ids(
        &self,
        account_id: AccountId,
        list_flags: u32,
        query: Option<&str>,
    ) -> Result<Vec<ContactId>> {
        self.call_result("get_contact_ids", (account_id, list_flags, query)).await
    }

    pub async fn delete_contact(
        &self,
        account_id: AccountId,
        contact_id: ContactId,
    ) -> Result<()> {
        self.call("delete_contact", (account_id, contact_id)).await
    }

    pub async fn change_contact_name(
        &self,
        account_id: AccountId,
        contact_id: ContactId,
        name: &str,
    ) -> Result<()> {
        self.call("change_contact_name", (account_id, contact_id, name)).await
    }

    /// Multi-line encryption info for a contact, e.g. for out-of-band
    /// fingerprint comparison.
    pub async fn get_contact_encryption_info(
        &self,
        account_id: AccountId,
        contact_id: ContactId,
    ) -> Result<String> {
        self.call_result("get_contact_encryption_info", (account_id, contact_id)).await
    }

    /// Id of the known, unblocked contact with the given address, if any.
    pub async fn lookup_contact_id_by_addr(
        &self,
        account_id: AccountId,
        addr: &str,
    ) -> Result<Option<ContactId>> {
        self.call_result("lookup_contact_id_by_addr", (account_id, addr)).await
    }

    /// The 1:1 chat with a contact if it exists, zero otherwise.
    pub async fn get_chat_id_by_contact_id(
        &self,
        account_id: AccountId,
        contact_id: ContactId,
    ) -> Result<ChatId> {
        self.call_result("get_chat_id_by_contact_id", (account_id, contact_id)).await
    }

    /// All message ids of the given media types in a chat, oldest first.
    pub async fn get_chat_media(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        message_type: Viewtype,
        or_message_type2: Option<Viewtype>,
        or_message_type3: Option<Viewtype>,
    ) -> Result<Vec<MsgId>> {
        self.call_result(
            "get_chat_media",
            (
                account_id,
                chat_id,
                message_type,
                or_message_type2,
                or_message_type3,
            ),
        )
        .await
    }

    // ---------------------------------------------
    //  backup
    // ---------------------------------------------

    /// Export an account backup into a directory.
    pub async fn export_backup(
        &self,
        account_id: AccountId,
        destination: &Path,
        passphrase: Option<&str>,
    ) -> Result<()> {
        self.call("export_backup", (account_id, destination, passphrase)).await
    }

    /// Import an account backup file.
    pub async fn import_backup(
        &self,
        account_id: AccountId,
        path: &Path,
        passphrase: Option<&str>,
    ) -> Result<()> {
        self.call("import_backup", (account_id, path, passphrase)).await
    }

    /// Offer a backup to other devices over the network. Stops I/O while
    /// running; returns once retrieved or cancelled. Track progress via the
    /// `ImexProgress` event.
    pub async fn provide_backup(&self, account_id: AccountId) -> Result<()> {
        self.call("provide_backup", (account_id,)).await
    }

    /// QR code text for a running [`provide_backup`](Self::provide_backup);
    /// fails without one, may block until the code is ready.
    pub async fn get_backup_qr(&self, account_id: AccountId) -> Result<String> {
        self.call_result("get_backup_qr", (account_id,)).await
    }

    /// Same as [`get_backup_qr`](Self::get_backup_qr), rendered as SVG.
    pub async fn get_backup_qr_svg(&self, account_id: AccountId) -> Result<String> {
        self.call_result("get_backup_qr_svg", (account_id,)).await
    }

    /// Retrieve a backup offered by a remote device and import it.
    pub async fn get_backup(&self, account_id: AccountId, qr_text: &str) -> Result<()> {
        self.call("get_backup", (account_id, qr_text)).await
    }

    // ---------------------------------------------
    //  connectivity
    // ---------------------------------------------

    /// Hint that the network likely came back or conditions changed.
    pub async fn maybe_network(&self) -> Result<()> {
        self.call("maybe_network", ()).await
    }

    /// Rough connectivity indicator: 1000–1999 not connected, 2000–2999
    /// connecting, 3000–3999 working, >= 4000 connected.
    pub async fn get_connectivity(&self, account_id: AccountId) -> Result<u32> {
        self.call_result("get_connectivity", (account_id,)).await
    }

    /// Connectivity overview as HTML, for a detail view.
    pub async fn get_connectivity_html(&self, account_id: AccountId) -> Result<String> {
        self.call_result("get_connectivity_html", (account_id,)).await
    }

    // ---------------------------------------------
    //  webxdc
    // ---------------------------------------------

    pub async fn send_webxdc_status_update(
        &self,
        account_id: AccountId,
        msg_id: MsgId,
        update: &str,
        description: &str,
    ) -> Result<()> {
        self.call(
            "send_webxdc_status_update",
            (account_id, msg_id, update, description),
        )
        .await
    }

    pub async fn get_webxdc_status_updates(
        &self,
        account_id: AccountId,
        msg_id: MsgId,
        last_known_serial: u32,
    ) -> Result<String> {
        self.call_result(
            "get_webxdc_status_updates",
            (account_id, msg_id, last_known_serial),
        )
        .await
    }

    /// Get info about a webxdc app message.
    pub async fn get_webxdc_info(
        &self,
        account_id: AccountId,
        msg_id: MsgId,
    ) -> Result<WebxdcMsgInfo> {
        self.call_result("get_webxdc_info", (account_id, msg_id)).await
    }

    /// Get a file from a webxdc archive, base64 encoded.
    pub async fn get_webxdc_blob(
        &self,
        account_id: AccountId,
        msg_id: MsgId,
        path: &str,
    ) -> Result<String> {
        self.call_result("get_webxdc_blob", (account_id, msg_id, path)).await
    }

    // ---------------------------------------------
    //  sending and drafts
    // ---------------------------------------------

    /// Forward messages to another chat; the copies are flagged as
    /// forwarded. Original sender, info-state and webxdc updates are not
    /// carried over.
    pub async fn forward_messages(
        &self,
        account_id: AccountId,
        msg_ids: &[MsgId],
        chat_id: ChatId,
    ) -> Result<()> {
        self.call("forward_messages", (account_id, msg_ids, chat_id)).await
    }

    /// Resend sent messages, e.g. for newly added group members. All ids
    /// must belong to the same chat.
    pub async fn resend_messages(&self, account_id: AccountId, msg_ids: &[MsgId]) -> Result<()> {
        self.call("resend_messages", (account_id, msg_ids)).await
    }

    pub async fn send_sticker(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        path: &Path,
    ) -> Result<MsgId> {
        self.call_result("send_sticker", (account_id, chat_id, path)).await
    }

    /// Send a reaction: emojis separated by spaces. The last reaction per
    /// sender wins; an empty string removes all of them.
    pub async fn send_reaction(
        &self,
        account_id: AccountId,
        msg_id: MsgId,
        reaction: &[&str],
    ) -> Result<MsgId> {
        self.call_result("send_reaction", (account_id, msg_id, reaction)).await
    }

    /// Reactions to a message, if there are any.
    pub async fn get_message_reactions(
        &self,
        account_id: AccountId,
        msg_id: MsgId,
    ) -> Result<Option<Reactions>> {
        self.call_result("get_message_reactions", (account_id, msg_id)).await
    }

    /// Send a message; returns the id of the sent message.
    pub async fn send_msg(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        data: &MsgData,
    ) -> Result<MsgId> {
        self.call_result("send_msg", (account_id, chat_id, data)).await
    }

    /// Check whether messages can be sent to a chat.
    pub async fn can_send(&self, account_id: AccountId, chat_id: ChatId) -> Result<bool> {
        self.call_result("can_send", (account_id, chat_id)).await
    }

    pub async fn remove_draft(&self, account_id: AccountId, chat_id: ChatId) -> Result<()> {
        self.call("remove_draft", (account_id, chat_id)).await
    }

    /// Get the draft for a chat, if any.
    pub async fn get_draft(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
    ) -> Result<Option<MsgSnapshot>> {
        self.call_result("get_draft", (account_id, chat_id)).await
    }

    /// Send a plain text message; returns the id of the sent message.
    pub async fn misc_send_text_message(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        text: &str,
    ) -> Result<MsgId> {
        self.call_result("misc_send_text_message", (account_id, chat_id, text)).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn misc_set_draft(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
        text: Option<&str>,
        file: Option<&Path>,
        filename: Option<&str>,
        quoted_message_id: Option<MsgId>,
        view_type: Option<Viewtype>,
    ) -> Result<()> {
        self.call(
            "misc_set_draft",
            (
                account_id,
                chat_id,
                text,
                file,
                filename,
                quoted_message_id,
                view_type,
            ),
        )
        .await
    }

    /// Send the chat's currently set draft.
    pub async fn misc_send_draft(&self, account_id: AccountId, chat_id: ChatId) -> Result<MsgId> {
        self.call_result("misc_send_draft", (account_id, chat_id)).await
    }
}

/// Serialize params, normalizing "no parameters" to an empty positional array.
fn positional(params: impl Serialize) -> Result<serde_json::Value> {
    let value = serde_json::to_value(params)?;
    Ok(if value.is_null() { json!([]) } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_params_become_empty_array() {
        assert_eq!(positional(()).unwrap(), json!([]));
    }

    #[test]
    fn tuples_become_positional_arrays() {
        assert_eq!(
            positional((AccountId(1), "displayname", Some("bob"))).unwrap(),
            json!([1, "displayname", "bob"])
        );
        assert_eq!(
            positional((AccountId(1), None::<ChatId>)).unwrap(),
            json!([1, null])
        );
    }

    #[test]
    fn single_params_stay_wrapped() {
        assert_eq!(positional((AccountId(3),)).unwrap(), json!([3]));
    }
}
