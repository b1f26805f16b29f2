use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use qvb_core::{
    archive::ChatArchiver,
    commands::{CommandContext, CommandDispatcher, CommandRegistry},
    config::Config,
    records::{BindingRecords, PendingRecords, WhitelistRecords},
    router::MessageRouter,
    store::RecordStore,
    verify::{VerificationProcessor, VerifySettings},
};
use qvb_onebot::OneBotClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    qvb_core::logging::init("qvb")?;

    let cfg = Arc::new(Config::load().context("loading configuration")?);
    info!(
        "starting; group: {}, code length: {}",
        cfg.group_id.map_or("unset".to_string(), |g| g.to_string()),
        cfg.code_length
    );

    let shutdown = CancellationToken::new();
    let mut client = OneBotClient::spawn(&cfg.host, cfg.port, &cfg.access_token, shutdown.clone());
    let api = Arc::new(client.api());

    let pending = Arc::new(RecordStore::<PendingRecords>::new(
        "pending-verifications",
        cfg.pending_path.clone(),
    ));
    let whitelist = Arc::new(RecordStore::<WhitelistRecords>::new(
        "whitelist",
        cfg.whitelist_path.clone(),
    ));
    let bindings = Arc::new(RecordStore::<BindingRecords>::new(
        "bindings",
        cfg.bindings_path.clone(),
    ));

    let dispatcher = CommandDispatcher::new(
        CommandRegistry::builtin(),
        CommandContext {
            pending: pending.clone(),
            whitelist,
            bindings: bindings.clone(),
        },
        api.clone(),
        cfg.group_id,
        cfg.admin_qq,
    );
    let verifier = VerificationProcessor::new(
        VerifySettings::from_config(&cfg),
        pending,
        bindings,
        api.clone(),
    );
    let archiver = ChatArchiver::new(
        RecordStore::new("chat-history", cfg.chat_history_path.clone()),
        cfg.max_chat_history,
    );

    let router = Arc::new(MessageRouter::new(
        cfg.group_id,
        api,
        dispatcher,
        verifier,
        archiver,
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                shutdown.cancel();
                break;
            }
            msg = client.next_message() => {
                let Some(msg) = msg else { break };
                let router = router.clone();
                tokio::spawn(async move { router.handle(msg).await });
            }
        }
    }

    Ok(())
}
