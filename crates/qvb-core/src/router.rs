use std::sync::Arc;

use tracing::{error, warn};

use crate::{
    archive::ChatArchiver,
    commands::CommandDispatcher,
    domain::{GroupId, UserId},
    errors::Error,
    message::{IncomingMessage, MessageKind},
    ports::MessageTransport,
    verify::VerificationProcessor,
};

/// Entry point for every inbound message.
///
/// Group messages for the configured group are archived; private messages
/// are tried as admin commands first, then as verification codes. Whatever
/// happens, at most one reply goes out per inbound message, and no failure
/// escapes this boundary.
pub struct MessageRouter {
    group_id: Option<GroupId>,
    transport: Arc<dyn MessageTransport>,
    dispatcher: CommandDispatcher,
    verifier: VerificationProcessor,
    archiver: ChatArchiver,
}

impl MessageRouter {
    pub fn new(
        group_id: Option<GroupId>,
        transport: Arc<dyn MessageTransport>,
        dispatcher: CommandDispatcher,
        verifier: VerificationProcessor,
        archiver: ChatArchiver,
    ) -> Self {
        Self {
            group_id,
            transport,
            dispatcher,
            verifier,
            archiver,
        }
    }

    pub async fn handle(&self, msg: IncomingMessage) {
        match msg.kind {
            MessageKind::Group(group) => {
                if Some(group) != self.group_id {
                    return;
                }
                match self.archiver.record(&msg).await {
                    Ok(()) => {}
                    Err(e @ Error::StorageUnavailable { .. }) => {
                        warn!("chat archive disabled: {e}");
                    }
                    Err(e) => error!("chat archive failed: {e}"),
                }
            }
            MessageKind::Private => self.handle_private(&msg).await,
        }
    }

    async fn handle_private(&self, msg: &IncomingMessage) {
        // Commands first; a command reply means verification never runs.
        match self.dispatcher.dispatch(msg).await {
            Ok(Some(reply)) => {
                self.send(msg.sender, &reply).await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                error!("command dispatch failed for {}: {e}", msg.sender);
                return;
            }
        }

        match self.verifier.process(msg).await {
            Ok(verdict) => {
                if let Some(reply) = verdict.reply_text(self.verifier.code_length()) {
                    self.send(msg.sender, &reply).await;
                }
            }
            Err(e @ Error::StorageUnavailable { .. }) => {
                warn!("verification disabled: {e}");
            }
            Err(e) => error!("verification failed for {}: {e}", msg.sender),
        }
    }

    async fn send(&self, user: UserId, text: &str) {
        if let Err(e) = self.transport.send_private(user, text).await {
            error!("reply to {user} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::{
        archive::ChatHistory,
        commands::{CommandContext, CommandRegistry},
        domain::Role,
        message::{private_text, Segment},
        records::{BindingRecords, PendingRecords, PendingVerification, WhitelistRecords},
        store::RecordStore,
        testutil::{temp_store, FixedOracle, RecordingTransport},
        verify::VerifySettings,
    };

    const GROUP: GroupId = GroupId(777);
    const PLAYER: UserId = UserId(10001);
    const ADMIN: UserId = UserId(20001);

    struct Fixture {
        router: MessageRouter,
        transport: Arc<RecordingTransport>,
        pending: Arc<RecordStore<PendingRecords>>,
        archive_store_path: std::path::PathBuf,
    }

    fn fixture(oracle: FixedOracle) -> Fixture {
        let transport = Arc::new(RecordingTransport::default());
        let oracle: Arc<FixedOracle> = Arc::new(oracle);

        let pending = Arc::new(temp_store::<PendingRecords>("qvb-router-pending"));
        pending
            .save(&PendingRecords {
                records: vec![PendingVerification {
                    code: "1234".to_string(),
                    uuid: "u1".to_string(),
                    name: "Alice".to_string(),
                }],
            })
            .unwrap();
        let bindings = Arc::new(temp_store::<BindingRecords>("qvb-router-bindings"));
        let whitelist = Arc::new(temp_store::<WhitelistRecords>("qvb-router-whitelist"));

        let dispatcher = CommandDispatcher::new(
            CommandRegistry::builtin(),
            CommandContext {
                pending: pending.clone(),
                whitelist,
                bindings: bindings.clone(),
            },
            oracle.clone(),
            Some(GROUP),
            None,
        );
        let verifier = VerificationProcessor::new(
            VerifySettings {
                code_length: 4,
                group_id: Some(GROUP),
                rate_limit_window: Duration::ZERO,
            },
            pending.clone(),
            bindings,
            oracle,
        );

        // The archiver owns its store, so keep the path for inspection.
        let archive_store_path = std::path::PathBuf::from(format!(
            "/tmp/qvb-router-archive-{}-{}.json",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        let archive_store =
            RecordStore::<ChatHistory>::new("archive", Some(archive_store_path.clone()));
        archive_store.save(&ChatHistory::default()).unwrap();
        let archiver = ChatArchiver::new(archive_store, 10);

        let router = MessageRouter::new(
            Some(GROUP),
            transport.clone(),
            dispatcher,
            verifier,
            archiver,
        );
        Fixture {
            router,
            transport,
            pending,
            archive_store_path,
        }
    }

    fn group_msg(group: GroupId, text: &str) -> IncomingMessage {
        IncomingMessage {
            kind: MessageKind::Group(group),
            sender: PLAYER,
            segments: vec![Segment::Text(text.to_string())],
        }
    }

    fn read_archive(path: &std::path::Path) -> ChatHistory {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn group_messages_for_the_target_group_are_archived() {
        let f = fixture(FixedOracle::with_members(&[PLAYER]));

        f.router.handle(group_msg(GROUP, "hello group")).await;
        f.router.handle(group_msg(GroupId(999), "other group")).await;

        let history = read_archive(&f.archive_store_path);
        assert_eq!(history.records.len(), 1);
        assert_eq!(history.records[0].text, "hello group");
        assert!(f.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn private_code_produces_exactly_one_reply() {
        let f = fixture(FixedOracle::with_members(&[PLAYER]));

        f.router.handle(private_text(PLAYER, "1234")).await;

        let replies = f.transport.replies_to(PLAYER);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("验证成功"));
    }

    #[tokio::test]
    async fn smalltalk_gets_no_reply() {
        let f = fixture(FixedOracle::with_members(&[PLAYER]));
        f.router.handle(private_text(PLAYER, "在吗？")).await;
        assert!(f.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn command_reply_preempts_verification() {
        let mut oracle = FixedOracle::with_members(&[ADMIN]);
        oracle.roles.insert(ADMIN, Role::Admin);
        let f = fixture(oracle);

        // "1234" is a redeemable code, but the marker routes the message to
        // the command path and the pending record must survive.
        f.router.handle(private_text(ADMIN, "/QQ查信息 1234")).await;

        let replies = f.transport.replies_to(ADMIN);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("未查询到该QQ的绑定信息"));
        assert_eq!(f.pending.load().unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn denied_command_is_the_only_reply() {
        let mut oracle = FixedOracle::with_members(&[PLAYER]);
        oracle.roles.insert(PLAYER, Role::Member);
        let f = fixture(oracle);

        f.router.handle(private_text(PLAYER, "/查看白名单")).await;

        let replies = f.transport.replies_to(PLAYER);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("权限不足"));
    }

    #[tokio::test]
    async fn unconfigured_pending_store_stays_silent() {
        let transport = Arc::new(RecordingTransport::default());
        let oracle: Arc<FixedOracle> = Arc::new(FixedOracle::with_members(&[PLAYER]));
        let pending: Arc<RecordStore<PendingRecords>> = Arc::new(RecordStore::new("pending", None));
        let bindings = Arc::new(temp_store::<BindingRecords>("qvb-router-ns-b"));

        let dispatcher = CommandDispatcher::new(
            CommandRegistry::builtin(),
            CommandContext {
                pending: pending.clone(),
                whitelist: Arc::new(RecordStore::new("whitelist", None)),
                bindings: bindings.clone(),
            },
            oracle.clone(),
            Some(GROUP),
            None,
        );
        let verifier = VerificationProcessor::new(
            VerifySettings {
                code_length: 4,
                group_id: Some(GROUP),
                rate_limit_window: Duration::ZERO,
            },
            pending,
            bindings,
            oracle,
        );
        let archiver = ChatArchiver::new(RecordStore::new("archive", None), 10);
        let router = MessageRouter::new(
            Some(GROUP),
            transport.clone(),
            dispatcher,
            verifier,
            archiver,
        );

        router.handle(private_text(PLAYER, "1234")).await;
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
