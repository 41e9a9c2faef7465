//! End-to-end scenarios against a real `deltachat-rpc-server` and a test
//! mail server (IMAP on 3143, SMTP on 3025, e.g. mail-server-tester).
//!
//! Run with `cargo test -p chatmail-testing -- --ignored`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chatmail_core::{Event, EventKind, MsgId, CONTACT_LAST_SPECIAL};
use chatmail_rpc::types::MsgData;
use chatmail_testing::AcFactory;

#[tokio::test]
#[ignore = "needs deltachat-rpc-server and a test mail server"]
async fn config_round_trip() {
    let factory = AcFactory::tear_up();
    factory
        .with_unconfigured_account(|rpc, acc_id| async move {
            rpc.set_config(acc_id, "displayname", Some("test name"))
                .await
                .unwrap();
            let name = rpc.get_config(acc_id, "displayname").await.unwrap();
            assert_eq!(name.as_deref(), Some("test name"));

            let batch = HashMap::from([
                ("displayname".to_string(), Some("new name".to_string())),
                ("selfstatus".to_string(), Some("test status".to_string())),
            ]);
            rpc.batch_set_config(acc_id, &batch).await.unwrap();
            let name = rpc.get_config(acc_id, "displayname").await.unwrap();
            assert_eq!(name.as_deref(), Some("new name"));

            let values = rpc
                .batch_get_config(acc_id, &["displayname", "selfstatus"])
                .await
                .unwrap();
            assert_eq!(
                values["selfstatus"].as_deref(),
                Some("test status")
            );
        })
        .await;
    factory.tear_down();
}

#[tokio::test]
#[ignore = "needs deltachat-rpc-server and a test mail server"]
async fn echo_through_two_accounts() {
    let factory = AcFactory::tear_up();
    factory
        .with_online_account(|rpc1, acc_id1| {
            let factory = &factory;
            async move {
                factory
                    .with_online_account(|rpc2, acc_id2| async move {
                        let chat_id2 = factory.create_chat(&rpc2, acc_id2, &rpc1, acc_id1).await;
                        rpc2.misc_send_text_message(acc_id2, chat_id2, "hi")
                            .await
                            .unwrap();

                        let msg = factory.next_msg(&rpc1, acc_id1).await;
                        assert_eq!(msg.text, "hi");

                        let fresh = rpc1.get_fresh_msgs(acc_id1).await.unwrap();
                        assert!(!fresh.is_empty());

                        rpc1.markseen_msgs(acc_id1, &fresh).await.unwrap();
                        let fresh = rpc1.get_fresh_msgs(acc_id1).await.unwrap();
                        assert!(fresh.is_empty());
                    })
                    .await;
            }
        })
        .await;
    factory.tear_down();
}

#[tokio::test]
#[ignore = "needs deltachat-rpc-server and a test mail server"]
async fn secure_join_completes_on_both_sides() {
    let factory = AcFactory::tear_up();
    factory
        .with_online_account(|rpc1, acc_id1| {
            let factory = &factory;
            async move {
                factory
                    .with_online_account(|rpc2, acc_id2| async move {
                        let qrdata = rpc1
                            .get_chat_securejoin_qr_code(acc_id1, None)
                            .await
                            .unwrap();
                        assert!(!qrdata.is_empty());

                        rpc2.secure_join(acc_id2, &qrdata).await.unwrap();

                        loop {
                            let event = factory
                                .wait_for_event(
                                    &rpc1,
                                    acc_id1,
                                    EventKind::SecurejoinInviterProgress,
                                )
                                .await;
                            if let Event::SecurejoinInviterProgress { progress: 1000, .. } = event {
                                break;
                            }
                        }
                        loop {
                            let event = factory
                                .wait_for_event(
                                    &rpc2,
                                    acc_id2,
                                    EventKind::SecurejoinJoinerProgress,
                                )
                                .await;
                            if let Event::SecurejoinJoinerProgress { progress: 1000, .. } = event {
                                break;
                            }
                        }
                    })
                    .await;
            }
        })
        .await;
    factory.tear_down();
}

#[tokio::test]
#[ignore = "needs deltachat-rpc-server and a test mail server"]
async fn backup_round_trip() {
    let factory = AcFactory::tear_up();

    let backup_dir = factory.mkdir_temp();
    factory
        .with_online_account(|rpc, acc_id| {
            let backup_dir = backup_dir.clone();
            async move {
                rpc.export_backup(acc_id, &backup_dir, Some("test-phrase"))
                    .await
                    .unwrap();
            }
        })
        .await;

    let mut files: Vec<_> = std::fs::read_dir(&backup_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let backup = files.pop().unwrap();

    factory
        .with_rpc(|rpc| async move {
            let acc_id = rpc.add_account().await.unwrap();
            rpc.import_backup(acc_id, &backup, Some("test-phrase"))
                .await
                .unwrap();
            assert!(rpc.is_configured(acc_id).await.unwrap());
        })
        .await;

    factory.tear_down();
}

#[tokio::test]
#[ignore = "needs deltachat-rpc-server and a test mail server"]
async fn bot_catches_up_on_seeded_messages() {
    let factory = AcFactory::tear_up();
    factory
        .with_online_bot(|bot, acc_id| async move {
            let mut seeded = Vec::new();
            for n in 0..3 {
                let msg_id = bot
                    .rpc()
                    .add_device_message(
                        acc_id,
                        &format!("seed-{n}"),
                        Some(&MsgData::text(format!("backlog {n}"))),
                    )
                    .await
                    .unwrap();
                seeded.push(msg_id);
            }

            let seen: Arc<Mutex<Vec<MsgId>>> = Arc::new(Mutex::new(Vec::new()));
            {
                let seen = seen.clone();
                bot.on_new_msg(move |_bot, _acc_id, msg_id| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(msg_id);
                    }
                });
            }

            let runner = {
                let bot = bot.clone();
                tokio::spawn(async move { bot.run().await })
            };
            let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
            while seen.lock().unwrap().len() < seeded.len() {
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "catch-up did not deliver all seeded messages"
                );
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            bot.stop();
            runner.await.unwrap().unwrap();

            let seen = seen.lock().unwrap().clone();
            assert_eq!(&seen[..seeded.len()], &seeded[..]);

            let remaining = bot.rpc().get_next_msgs(acc_id).await.unwrap();
            assert!(remaining.is_empty());
        })
        .await;
    factory.tear_down();
}

#[tokio::test]
#[ignore = "needs deltachat-rpc-server and a test mail server"]
async fn reactions_round_trip() {
    let factory = AcFactory::tear_up();
    factory
        .with_online_account(|rpc, acc_id| async move {
            let chat_id = rpc
                .create_group_chat(acc_id, "test group", false)
                .await
                .unwrap();
            let msg_id = rpc
                .send_msg(acc_id, chat_id, &MsgData::text("test message"))
                .await
                .unwrap();

            rpc.send_reaction(acc_id, msg_id, &[":)"]).await.unwrap();

            let reactions = rpc
                .get_message_reactions(acc_id, msg_id)
                .await
                .unwrap()
                .expect("reactions missing");
            assert_eq!(reactions.reactions.len(), 1);
            assert_eq!(reactions.reactions[0].emoji, ":)");
        })
        .await;
    factory.tear_down();
}

#[tokio::test]
#[ignore = "needs deltachat-rpc-server and a test mail server"]
async fn echo_bot_answers_incoming_text() {
    let factory = AcFactory::tear_up();
    factory
        .with_running_bot(|bot, bot_acc_id| {
            let factory = &factory;
            async move {
                bot.on_new_msg(move |bot, acc_id, msg_id| async move {
                    let msg = bot.rpc().get_message(acc_id, msg_id).await.unwrap();
                    if msg.from_id > CONTACT_LAST_SPECIAL {
                        bot.rpc()
                            .misc_send_text_message(acc_id, msg.chat_id, &msg.text)
                            .await
                            .unwrap();
                    }
                });

                // Bot accounts accept contact requests on their own, so the
                // fresh account can message the bot right away.
                factory
                    .with_online_account(|rpc, acc_id| async move {
                        let chat_id = factory
                            .create_chat(&rpc, acc_id, bot.rpc(), bot_acc_id)
                            .await;
                        rpc.misc_send_text_message(acc_id, chat_id, "ping")
                            .await
                            .unwrap();

                        let reply = factory.next_msg(&rpc, acc_id).await;
                        assert_eq!(reply.text, "ping");
                    })
                    .await;
            }
        })
        .await;
    factory.tear_down();
}
