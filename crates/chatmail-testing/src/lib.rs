//! Test fixtures for clients and bots.
//!
//! [`AcFactory`] provisions throwaway accounts against a test mail server
//! (for example <https://github.com/deltachat/mail-server-tester>) and offers
//! scoped acquisition of transports, accounts and bots plus event-waiting
//! helpers. Helpers panic on failure so a broken fixture fails the test
//! loudly instead of cascading.
//!
//! Typical usage:
//!
//! ```ignore
//! let factory = AcFactory::tear_up();
//! factory
//!     .with_online_account(|rpc, acc_id| async move {
//!         // drive the test through `rpc`
//!     })
//!     .await;
//! factory.tear_down();
//! ```

use std::{
    collections::HashMap,
    future::Future,
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tempfile::TempDir;

use chatmail_bot::Bot;
use chatmail_core::{AccountId, ChatId, Event, EventKind, CONTACT_SELF};
use chatmail_rpc::{
    transport::DEFAULT_SERVER_BIN, types::MsgSnapshot, IoTransport, Rpc, ServerConfig, StderrMode,
};

/// Factory for disposable test accounts, bots and transports.
pub struct AcFactory {
    default_cfg: Mutex<HashMap<String, Option<String>>>,
    debug: bool,
    temp_dir: TempDir,
    serial: Mutex<u64>,
    start_time: u64,
}

impl AcFactory {
    /// Prepare the factory: a root scratch directory plus the default config
    /// for the standard test mail server setup. Override entries with
    /// [`set_default_cfg_entry`](Self::set_default_cfg_entry) before creating
    /// the first account if your server differs.
    pub fn tear_up() -> Self {
        let default_cfg = HashMap::from([
            ("mail_server".to_string(), Some("localhost".to_string())),
            ("send_server".to_string(), Some("localhost".to_string())),
            ("mail_port".to_string(), Some("3143".to_string())),
            ("send_port".to_string(), Some("3025".to_string())),
            ("mail_security".to_string(), Some("3".to_string())),
            ("send_security".to_string(), Some("3".to_string())),
            ("mvbox_move".to_string(), Some("0".to_string())),
        ]);
        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before the Unix epoch")
            .as_secs();

        Self {
            default_cfg: Mutex::new(default_cfg),
            debug: false,
            temp_dir: tempfile::tempdir().expect("failed to create factory temp dir"),
            serial: Mutex::new(0),
            start_time,
        }
    }

    /// Keep the core server's stderr visible and log awaited events.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Override one entry of the default account configuration.
    pub fn set_default_cfg_entry(&self, key: impl Into<String>, value: impl Into<String>) {
        self.default_cfg
            .lock()
            .unwrap()
            .insert(key.into(), Some(value.into()));
    }

    /// Remove everything the factory and its accounts wrote to disk.
    pub fn tear_down(self) {
        self.temp_dir
            .close()
            .expect("failed to remove factory temp dir");
    }

    /// Create a fresh directory under the factory root; removed on
    /// [`tear_down`](Self::tear_down).
    pub fn mkdir_temp(&self) -> PathBuf {
        tempfile::tempdir_in(self.temp_dir.path())
            .expect("failed to create temp dir")
            .keep()
    }

    /// Run `callback` with a client backed by its own core-server process;
    /// the transport is closed when the callback returns.
    pub async fn with_rpc<F, Fut, T>(&self, callback: F) -> T
    where
        F: FnOnce(Rpc) -> Fut,
        Fut: Future<Output = T>,
    {
        let transport = Arc::new(IoTransport::new(ServerConfig {
            cmd: PathBuf::from(DEFAULT_SERVER_BIN),
            accounts_dir: Some(self.mkdir_temp().join("accounts")),
            stderr: if self.debug {
                StderrMode::Inherit
            } else {
                StderrMode::Null
            },
        }));
        transport.open().expect("failed to start the core server");
        let rpc = Rpc::new(transport.clone());

        let out = callback(rpc).await;

        transport.close().await;
        out
    }

    /// Run `callback` with an account that is not yet configured but ready to
    /// be: test-server config and unique credentials are already set.
    pub async fn with_unconfigured_account<F, Fut, T>(&self, callback: F) -> T
    where
        F: FnOnce(Rpc, AccountId) -> Fut,
        Fut: Future<Output = T>,
    {
        self.with_rpc(move |rpc| async move {
            let acc_id = rpc.add_account().await.expect("add_account failed");
            let serial = {
                let mut serial = self.serial.lock().unwrap();
                *serial += 1;
                *serial
            };

            let mut config = self.default_cfg.lock().unwrap().clone();
            config.insert(
                "addr".to_string(),
                Some(format!("acc{serial}.{}@localhost", self.start_time)),
            );
            config.insert("mail_pw".to_string(), Some(format!("password{serial}")));
            rpc.batch_set_config(acc_id, &config)
                .await
                .expect("batch_set_config failed");

            callback(rpc, acc_id).await
        })
        .await
    }

    /// Run `callback` with a configured account whose I/O is started.
    pub async fn with_online_account<F, Fut, T>(&self, callback: F) -> T
    where
        F: FnOnce(Rpc, AccountId) -> Fut,
        Fut: Future<Output = T>,
    {
        self.with_unconfigured_account(move |rpc, acc_id| async move {
            rpc.configure(acc_id).await.expect("configure failed");
            callback(rpc, acc_id).await
        })
        .await
    }

    /// Run `callback` with a bot whose account is ready to be configured.
    pub async fn with_unconfigured_bot<F, Fut, T>(&self, callback: F) -> T
    where
        F: FnOnce(Bot, AccountId) -> Fut,
        Fut: Future<Output = T>,
    {
        self.with_unconfigured_account(move |rpc, acc_id| async move {
            callback(Bot::new(rpc), acc_id).await
        })
        .await
    }

    /// Run `callback` with a configured bot whose account I/O is started.
    /// The bot's event loop is not running yet.
    pub async fn with_online_bot<F, Fut, T>(&self, callback: F) -> T
    where
        F: FnOnce(Bot, AccountId) -> Fut,
        Fut: Future<Output = T>,
    {
        self.with_unconfigured_account(move |rpc, acc_id| async move {
            let addr = rpc
                .get_config(acc_id, "addr")
                .await
                .expect("get_config failed")
                .expect("addr is not set");
            let password = rpc
                .get_config(acc_id, "mail_pw")
                .await
                .expect("get_config failed")
                .expect("mail_pw is not set");

            let bot = Bot::new(rpc);
            bot.configure(acc_id, &addr, &password)
                .await
                .expect("bot configuration failed");

            callback(bot, acc_id).await
        })
        .await
    }

    /// Run `callback` with a bot that is already processing events; the
    /// event loop is stopped again when the callback returns.
    pub async fn with_running_bot<F, Fut, T>(&self, callback: F) -> T
    where
        F: FnOnce(Bot, AccountId) -> Fut,
        Fut: Future<Output = T>,
    {
        self.with_online_bot(move |bot, acc_id| async move {
            let runner = {
                let bot = bot.clone();
                tokio::spawn(async move { bot.run().await })
            };
            while !bot.is_running() {
                assert!(!runner.is_finished(), "bot stopped before it started");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let out = callback(bot.clone(), acc_id).await;

            bot.stop();
            let _ = runner.await;
            out
        })
        .await
    }

    /// Wait for the next incoming message in the given account and fetch it.
    pub async fn next_msg(&self, rpc: &Rpc, acc_id: AccountId) -> MsgSnapshot {
        let event = self.wait_for_event(rpc, acc_id, EventKind::IncomingMsg).await;
        let Event::IncomingMsg { msg_id, .. } = event else {
            unreachable!("wait_for_event returned a foreign kind");
        };
        rpc.get_message(acc_id, msg_id)
            .await
            .expect("get_message failed")
    }

    /// Wait for the next event of the wanted kind in the given account.
    /// Events for other accounts are discarded with a warning.
    pub async fn wait_for_event(&self, rpc: &Rpc, acc_id: AccountId, kind: EventKind) -> Event {
        loop {
            let (event_acc_id, event) = rpc.get_next_event().await.expect("get_next_event failed");
            if event_acc_id != acc_id {
                tracing::warn!(
                    "waiting for event in account {acc_id}, discarding {:?} for account {event_acc_id}",
                    event.kind()
                );
                continue;
            }
            if event.kind() == kind {
                if self.debug {
                    tracing::info!("got awaited event {kind:?}");
                }
                return event;
            }
            if self.debug {
                tracing::info!("waiting for event {kind:?}, got {:?}", event.kind());
            }
        }
    }

    /// Like [`wait_for_event`](Self::wait_for_event), additionally requiring
    /// the event to belong to the given chat.
    pub async fn wait_for_event_in_chat(
        &self,
        rpc: &Rpc,
        acc_id: AccountId,
        chat_id: ChatId,
        kind: EventKind,
    ) -> Event {
        loop {
            let event = self.wait_for_event(rpc, acc_id, kind).await;
            if event_chat_id(&event) == Some(chat_id) {
                return event;
            }
        }
    }

    /// Introduce two accounts to each other through the secure-join
    /// handshake, waiting until both sides report completion.
    pub async fn introduce_each_other(
        &self,
        rpc1: &Rpc,
        acc_id1: AccountId,
        rpc2: &Rpc,
        acc_id2: AccountId,
    ) {
        let qrdata = rpc1
            .get_chat_securejoin_qr_code(acc_id1, None)
            .await
            .expect("get_chat_securejoin_qr_code failed");
        rpc2.secure_join(acc_id2, &qrdata)
            .await
            .expect("secure_join failed");

        loop {
            let event = self
                .wait_for_event(rpc1, acc_id1, EventKind::SecurejoinInviterProgress)
                .await;
            if let Event::SecurejoinInviterProgress { progress: 1000, .. } = event {
                break;
            }
        }
        loop {
            let event = self
                .wait_for_event(rpc2, acc_id2, EventKind::SecurejoinJoinerProgress)
                .await;
            if let Event::SecurejoinJoinerProgress { progress: 1000, .. } = event {
                break;
            }
        }
    }

    /// Create a 1:1 chat with `acc_id2` in the chat list of `acc_id1`,
    /// importing the peer's contact data from a vCard.
    pub async fn create_chat(
        &self,
        rpc1: &Rpc,
        acc_id1: AccountId,
        rpc2: &Rpc,
        acc_id2: AccountId,
    ) -> ChatId {
        let vcard = rpc2
            .make_vcard(acc_id2, &[CONTACT_SELF])
            .await
            .expect("make_vcard failed");
        let contact_ids = rpc1
            .import_vcard_contents(acc_id1, &vcard)
            .await
            .expect("import_vcard_contents failed");
        rpc1.create_chat_by_contact_id(acc_id1, contact_ids[0])
            .await
            .expect("create_chat_by_contact_id failed")
    }

    /// Path to an image file usable in tests: the avatar of a throwaway
    /// account's self-chat.
    pub async fn test_image(&self) -> String {
        self.with_online_account(|rpc, acc_id| async move {
            let chat_id = rpc
                .create_chat_by_contact_id(acc_id, CONTACT_SELF)
                .await
                .expect("create_chat_by_contact_id failed");
            let chat = rpc
                .get_basic_chat_info(acc_id, chat_id)
                .await
                .expect("get_basic_chat_info failed");
            chat.profile_image.expect("self chat has no profile image")
        })
        .await
    }

    /// Path to a minimal webxdc app archive usable in tests.
    pub fn test_webxdc(&self) -> PathBuf {
        let path = self.mkdir_temp().join("test.xdc");
        let file = std::fs::File::create(&path).expect("failed to create webxdc file");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();

        writer
            .start_file("index.html", options)
            .expect("failed to add index.html");
        writer
            .write_all(
                br#"<html><head><script src="webxdc.js"></script></head><body>test</body></html>"#,
            )
            .expect("failed to write index.html");
        writer
            .start_file("manifest.toml", options)
            .expect("failed to add manifest.toml");
        writer
            .write_all(br#"name = "TestApp""#)
            .expect("failed to write manifest.toml");
        writer.finish().expect("failed to finish webxdc archive");

        path
    }
}

fn event_chat_id(event: &Event) -> Option<ChatId> {
    match event {
        Event::MsgsChanged { chat_id, .. }
        | Event::ReactionsChanged { chat_id, .. }
        | Event::IncomingMsg { chat_id, .. }
        | Event::MsgsNoticed { chat_id }
        | Event::MsgDelivered { chat_id, .. }
        | Event::MsgFailed { chat_id, .. }
        | Event::MsgRead { chat_id, .. }
        | Event::MsgDeleted { chat_id, .. }
        | Event::ChatModified { chat_id }
        | Event::ChatEphemeralTimerModified { chat_id, .. } => Some(*chat_id),
        _ => None,
    }
}
