//! Minimal echo bot: answers every incoming text message with its own text.
//!
//! On first start pass an invite code (`dclogin:`/`dcaccount:` QR payload)
//! as the only argument to configure the account.

use std::sync::Arc;

use chatmail_bot::Bot;
use chatmail_core::{AccountId, Event, EventKind, CONTACT_LAST_SPECIAL};
use chatmail_rpc::{IoTransport, Rpc, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatmail_core::logging::init("echobot");

    let transport = Arc::new(IoTransport::new(ServerConfig::default()));
    transport.open()?;
    let rpc = Rpc::new(transport.clone());

    let result = run_echo_bot(&rpc).await;

    transport.close().await;
    result
}

async fn run_echo_bot(rpc: &Rpc) -> anyhow::Result<()> {
    let sysinfo = rpc.get_system_info().await?;
    tracing::info!(
        "running deltachat core {}",
        sysinfo
            .get("deltachat_core_version")
            .map(String::as_str)
            .unwrap_or("unknown")
    );

    let acc_id = get_or_add_account(rpc).await?;
    let bot = Bot::new(rpc.clone());

    bot.on(EventKind::Info, log_event);
    bot.on(EventKind::Warning, log_event);
    bot.on(EventKind::Error, log_event);
    bot.on_new_msg(|bot, acc_id, msg_id| async move {
        let Ok(msg) = bot.rpc().get_message(acc_id, msg_id).await else {
            return;
        };
        if msg.from_id > CONTACT_LAST_SPECIAL {
            if let Err(err) = bot
                .rpc()
                .misc_send_text_message(acc_id, msg.chat_id, &msg.text)
                .await
            {
                tracing::error!("failed to echo message {msg_id}: {err}");
            }
        }
    });

    if !rpc.is_configured(acc_id).await? {
        tracing::info!("bot not configured, configuring...");
        let invite = std::env::args()
            .nth(1)
            .ok_or_else(|| anyhow::anyhow!("account is unconfigured, pass an invite code"))?;
        rpc.set_config_from_qr(acc_id, &invite).await?;
        rpc.configure(acc_id).await?;
    }

    let invite_link = rpc.get_chat_securejoin_qr_code(acc_id, None).await?;
    tracing::info!("listening at: {invite_link}");

    bot.run().await?;
    Ok(())
}

/// Reuse the first existing account or create one.
async fn get_or_add_account(rpc: &Rpc) -> anyhow::Result<AccountId> {
    if let Some(acc_id) = rpc.get_all_account_ids().await?.into_iter().next() {
        return Ok(acc_id);
    }
    Ok(rpc.add_account().await?)
}

async fn log_event(_bot: Bot, acc_id: AccountId, event: Event) {
    match event {
        Event::Info { msg } => tracing::info!("[acc {acc_id}] {msg}"),
        Event::Warning { msg } => tracing::warn!("[acc {acc_id}] {msg}"),
        Event::Error { msg } => tracing::error!("[acc {acc_id}] {msg}"),
        _ => {}
    }
}
