//! Event-dispatch bot on top of the RPC client.
//!
//! A [`Bot`] pulls events off the server's `get_next_event` long poll and
//! fans them out to registered handlers, one at a time. Incoming messages are
//! additionally processed through a catch-up pass over `get_next_msgs`, with
//! the server-side `last_msg_id` config value as the persistent cursor, so
//! messages that arrived while the bot was offline are handled exactly once
//! per processed id.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, RwLock},
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chatmail_core::{AccountId, Error, Event, EventKind, MsgId, Result};
use chatmail_rpc::Rpc;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type EventHandlerFn = Arc<dyn Fn(Bot, AccountId, Event) -> BoxFuture<()> + Send + Sync>;
type NewMsgHandlerFn = Arc<dyn Fn(Bot, AccountId, MsgId) -> BoxFuture<()> + Send + Sync>;

/// Chat bot processing events for all accounts known to the core server.
///
/// Cheap to clone; clones share handlers and run state, so a handler may
/// clone its `Bot` into spawned work or call [`Bot::stop`] on it.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

struct BotInner {
    rpc: Rpc,
    handlers: RwLock<HashMap<EventKind, EventHandlerFn>>,
    unhandled: RwLock<Option<EventHandlerFn>>,
    new_msg: RwLock<Option<NewMsgHandlerFn>>,
    /// Cancellation scope of the current `run`, if one was started.
    run: Mutex<Option<CancellationToken>>,
}

impl Bot {
    pub fn new(rpc: Rpc) -> Self {
        Self {
            inner: Arc::new(BotInner {
                rpc,
                handlers: RwLock::new(HashMap::new()),
                unhandled: RwLock::new(None),
                new_msg: RwLock::new(None),
                run: Mutex::new(None),
            }),
        }
    }

    pub fn rpc(&self) -> &Rpc {
        &self.inner.rpc
    }

    /// Set the handler for an event kind, replacing any previous one.
    ///
    /// Registration may happen while the bot runs; the handler map is
    /// snapshotted per event, so a change takes effect from the next event.
    pub fn on<F, Fut>(&self, kind: EventKind, handler: F)
    where
        F: Fn(Bot, AccountId, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandlerFn = Arc::new(move |bot, acc_id, event| {
            let fut: BoxFuture<()> = Box::pin(handler(bot, acc_id, event));
            fut
        });
        self.inner.handlers.write().unwrap().insert(kind, handler);
    }

    /// Remove the handler for an event kind.
    pub fn remove_handler(&self, kind: EventKind) {
        self.inner.handlers.write().unwrap().remove(&kind);
    }

    /// Set the handler receiving events no [`on`](Self::on) handler matches.
    pub fn on_unhandled_event<F, Fut>(&self, handler: F)
    where
        F: Fn(Bot, AccountId, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandlerFn = Arc::new(move |bot, acc_id, event| {
            let fut: BoxFuture<()> = Box::pin(handler(bot, acc_id, event));
            fut
        });
        *self.inner.unhandled.write().unwrap() = Some(handler);
    }

    pub fn remove_unhandled_event_handler(&self) {
        *self.inner.unhandled.write().unwrap() = None;
    }

    /// Set the handler invoked once per new message found by catch-up.
    pub fn on_new_msg<F, Fut>(&self, handler: F)
    where
        F: Fn(Bot, AccountId, MsgId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: NewMsgHandlerFn = Arc::new(move |bot, acc_id, msg_id| {
            let fut: BoxFuture<()> = Box::pin(handler(bot, acc_id, msg_id));
            fut
        });
        *self.inner.new_msg.write().unwrap() = Some(handler);
    }

    pub fn remove_new_msg_handler(&self) {
        *self.inner.new_msg.write().unwrap() = None;
    }

    /// Configure one of the bot's accounts: marks it as a bot account and
    /// runs the server-side configuration with the given credentials.
    pub async fn configure(&self, acc_id: AccountId, addr: &str, password: &str) -> Result<()> {
        let config = HashMap::from([
            ("bot".to_string(), Some("1".to_string())),
            ("addr".to_string(), Some(addr.to_string())),
            ("mail_pw".to_string(), Some(password.to_string())),
        ]);
        self.rpc().batch_set_config(acc_id, &config).await?;
        self.rpc().configure(acc_id).await
    }

    /// Set a UI-scoped configuration value (`ui.<key>`), useful for custom
    /// third-party settings of bot programs.
    pub async fn set_ui_config(
        &self,
        acc_id: AccountId,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        self.rpc()
            .set_config(acc_id, &format!("ui.{key}"), value)
            .await
    }

    /// Get a UI-scoped configuration value set with
    /// [`set_ui_config`](Self::set_ui_config).
    pub async fn get_ui_config(&self, acc_id: AccountId, key: &str) -> Result<Option<String>> {
        self.rpc().get_config(acc_id, &format!("ui.{key}")).await
    }

    /// Whether a `run` is currently in flight.
    pub fn is_running(&self) -> bool {
        self.inner
            .run
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Stop processing events. The running `run` call returns after draining
    /// the events already queued.
    pub fn stop(&self) {
        if let Some(token) = self.inner.run.lock().unwrap().as_ref() {
            token.cancel();
        }
    }

    /// Process events until [`stop`](Self::stop) is called or the transport
    /// fails. Fails with [`Error::AlreadyRunning`] if a run is in flight.
    ///
    /// On start the bot best-effort starts I/O for all accounts and performs
    /// one catch-up pass per configured account, so messages received while
    /// the bot was offline reach the new-message handler in id order.
    pub async fn run(&self) -> Result<()> {
        let token = {
            let mut run = self.inner.run.lock().unwrap();
            if let Some(token) = run.as_ref() {
                if !token.is_cancelled() {
                    return Err(Error::AlreadyRunning);
                }
            }
            let token = CancellationToken::new();
            *run = Some(token.clone());
            token
        };

        // Best-effort: the server knows which accounts are usable.
        let _ = self.rpc().start_io_for_all_accounts().await;
        if let Ok(acc_ids) = self.rpc().get_all_account_ids().await {
            for acc_id in acc_ids {
                if self.rpc().is_configured(acc_id).await.unwrap_or(false) {
                    self.process_messages(acc_id).await;
                }
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let producer = {
            let rpc = self.inner.rpc.clone();
            let token = token.clone();
            tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = token.cancelled() => break,
                        next = rpc.get_next_event() => next,
                    };
                    match next {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::error!("event stream ended: {err}");
                            break;
                        }
                    }
                }
            })
        };

        while let Some((acc_id, event)) = rx.recv().await {
            let kind = event.kind();
            self.dispatch(acc_id, event).await;
            if kind == EventKind::IncomingMsg {
                self.process_messages(acc_id).await;
            }
        }

        self.stop();
        let _ = producer.await;
        Ok(())
    }

    async fn dispatch(&self, acc_id: AccountId, event: Event) {
        let handler = {
            let handlers = self.inner.handlers.read().unwrap();
            handlers.get(&event.kind()).cloned()
        };
        if let Some(handler) = handler {
            handler(self.clone(), acc_id, event).await;
            return;
        }

        let fallback = self.inner.unhandled.read().unwrap().clone();
        if let Some(handler) = fallback {
            handler(self.clone(), acc_id, event).await;
        }
    }

    /// One catch-up pass: hand out every message past the `last_msg_id`
    /// cursor, advancing the cursor before each handler call. Errors are
    /// ignored so a flaky call never kills the event loop.
    async fn process_messages(&self, acc_id: AccountId) {
        let msg_ids = match self.rpc().get_next_msgs(acc_id).await {
            Ok(ids) => ids,
            Err(_) => return,
        };
        let handler = self.inner.new_msg.read().unwrap().clone();
        for msg_id in msg_ids {
            let cursor = msg_id.to_string();
            let _ = self
                .rpc()
                .set_config(acc_id, "last_msg_id", Some(&cursor))
                .await;
            if let Some(handler) = &handler {
                handler(self.clone(), acc_id, msg_id).await;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use chatmail_core::ChatId;
    use chatmail_rpc::{IoTransport, ServerConfig, StderrMode};

    use super::*;

    fn script_transport(dir: &tempfile::TempDir, script: &str) -> Arc<IoTransport> {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-server.sh");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        Arc::new(IoTransport::new(ServerConfig {
            cmd: path,
            accounts_dir: None,
            stderr: StderrMode::Null,
        }))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// No accounts, no events: `get_next_event` never answers, everything
    /// else gets an empty/ok response.
    const IDLE_SERVER: &str = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"get_all_account_ids"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":[]}\n' "$id" ;;
    *'"method":"get_next_event"'*)
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":null}\n' "$id" ;;
  esac
done
"#;

    /// One configured account with two unprocessed messages, then one
    /// unknown event and one incoming-message event.
    const BUSY_SERVER: &str = r#"#!/bin/sh
dir=$(dirname "$0")
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"get_all_account_ids"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":[1]}\n' "$id" ;;
    *'"method":"is_configured"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":true}\n' "$id" ;;
    *'"method":"get_next_msgs"'*)
      if [ ! -f "$dir/drained" ]; then
        : > "$dir/drained"
        printf '{"jsonrpc":"2.0","id":%s,"result":[10,11]}\n' "$id"
      else
        printf '{"jsonrpc":"2.0","id":%s,"result":[]}\n' "$id"
      fi ;;
    *'"method":"set_config"'*)
      printf '%s\n' "$line" >> "$dir/set_config.log"
      printf '{"jsonrpc":"2.0","id":%s,"result":null}\n' "$id" ;;
    *'"method":"get_next_event"'*)
      if [ ! -f "$dir/event1" ]; then
        : > "$dir/event1"
        printf '{"jsonrpc":"2.0","id":%s,"result":{"contextId":1,"event":{"kind":"NewlyInventedEvent","msg":"x"}}}\n' "$id"
      elif [ ! -f "$dir/event2" ]; then
        : > "$dir/event2"
        printf '{"jsonrpc":"2.0","id":%s,"result":{"contextId":1,"event":{"kind":"IncomingMsg","chatId":5,"msgId":12}}}\n' "$id"
      fi ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":null}\n' "$id" ;;
  esac
done
"#;

    /// Answers the startup calls, then drops the connection on the first
    /// `get_next_event`.
    const DYING_SERVER: &str = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"get_all_account_ids"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":[]}\n' "$id" ;;
    *'"method":"get_next_event"'*)
      exit 0 ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":null}\n' "$id" ;;
  esac
done
"#;

    #[tokio::test]
    async fn rerun_while_running_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transport = script_transport(&dir, IDLE_SERVER);
        transport.open().unwrap();
        let bot = Bot::new(Rpc::new(transport.clone()));

        let runner = {
            let bot = bot.clone();
            tokio::spawn(async move { bot.run().await })
        };
        wait_until(|| bot.is_running(), "bot to start").await;

        assert!(matches!(bot.run().await, Err(Error::AlreadyRunning)));

        bot.stop();
        runner.await.unwrap().unwrap();
        assert!(!bot.is_running());

        // A stopped bot can be started again.
        let runner = {
            let bot = bot.clone();
            tokio::spawn(async move { bot.run().await })
        };
        wait_until(|| bot.is_running(), "bot to restart").await;
        bot.stop();
        runner.await.unwrap().unwrap();

        transport.close().await;
    }

    #[tokio::test]
    async fn catches_up_and_dispatches_events() {
        let dir = tempfile::tempdir().unwrap();
        let transport = script_transport(&dir, BUSY_SERVER);
        transport.open().unwrap();
        let bot = Bot::new(Rpc::new(transport.clone()));

        let seen_msgs = Arc::new(Mutex::new(Vec::new()));
        let unhandled = Arc::new(Mutex::new(Vec::new()));
        let incoming = Arc::new(Mutex::new(Vec::new()));

        {
            let seen_msgs = seen_msgs.clone();
            bot.on_new_msg(move |_bot, _acc_id, msg_id| {
                let seen_msgs = seen_msgs.clone();
                async move {
                    seen_msgs.lock().unwrap().push(msg_id);
                }
            });
        }
        {
            let unhandled = unhandled.clone();
            bot.on_unhandled_event(move |_bot, _acc_id, event| {
                let unhandled = unhandled.clone();
                async move {
                    unhandled.lock().unwrap().push(event);
                }
            });
        }
        {
            let incoming = incoming.clone();
            bot.on(EventKind::IncomingMsg, move |_bot, _acc_id, event| {
                let incoming = incoming.clone();
                async move {
                    incoming.lock().unwrap().push(event);
                }
            });
        }

        let runner = {
            let bot = bot.clone();
            tokio::spawn(async move { bot.run().await })
        };
        wait_until(
            || {
                seen_msgs.lock().unwrap().len() >= 2
                    && unhandled.lock().unwrap().len() >= 1
                    && incoming.lock().unwrap().len() >= 1
            },
            "catch-up and events",
        )
        .await;
        bot.stop();
        runner.await.unwrap().unwrap();

        // Catch-up delivered both backlog messages in id order.
        assert_eq!(*seen_msgs.lock().unwrap(), vec![MsgId(10), MsgId(11)]);

        // The unknown kind went to the fallback handler, raw string intact.
        assert_eq!(
            unhandled.lock().unwrap()[0],
            Event::Unknown {
                kind: "NewlyInventedEvent".into()
            }
        );

        // The known kind went to its registered handler.
        assert_eq!(
            incoming.lock().unwrap()[0],
            Event::IncomingMsg {
                chat_id: ChatId(5),
                msg_id: MsgId(12)
            }
        );

        // The cursor was advanced once per message, in ascending order.
        let log = std::fs::read_to_string(dir.path().join("set_config.log")).unwrap();
        let first = log.find(r#""last_msg_id","10""#).unwrap();
        let second = log.find(r#""last_msg_id","11""#).unwrap();
        assert!(first < second);

        transport.close().await;
    }

    #[tokio::test]
    async fn transport_failure_ends_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let transport = script_transport(&dir, DYING_SERVER);
        transport.open().unwrap();
        let bot = Bot::new(Rpc::new(transport.clone()));

        // The producer's first long poll kills the fake server; run must
        // drain and return cleanly rather than error out.
        bot.run().await.unwrap();
        assert!(!bot.is_running());

        transport.close().await;
    }

    #[tokio::test]
    async fn handler_slots_are_removable() {
        let transport = Arc::new(IoTransport::new(ServerConfig {
            cmd: PathBuf::from("unused"),
            accounts_dir: None,
            stderr: StderrMode::Null,
        }));
        let bot = Bot::new(Rpc::new(transport));

        bot.on(EventKind::Info, |_bot, _acc_id, _event| async {});
        bot.on_unhandled_event(|_bot, _acc_id, _event| async {});
        bot.on_new_msg(|_bot, _acc_id, _msg_id| async {});

        bot.remove_handler(EventKind::Info);
        bot.remove_unhandled_event_handler();
        bot.remove_new_msg_handler();

        assert!(bot.inner.handlers.read().unwrap().is_empty());
        assert!(bot.inner.unhandled.read().unwrap().is_none());
        assert!(bot.inner.new_msg.read().unwrap().is_none());
    }
}
