use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::{
    domain::{GroupId, Role, UserId},
    message::IncomingMessage,
    ports::GroupMembershipOracle,
    records::{BindingRecords, PendingRecords, WhitelistRecords},
    store::RecordStore,
    Error, Result,
};

/// Marker prefixing admin commands in private chat.
pub const COMMAND_MARKER: char = '/';

const PERMISSION_DENIED: &str = "权限不足！机器人命令仅限群管理员使用";
const GROUP_NOT_CONFIGURED: &str = "群数据错误！请联系管理员";

/// Store handles shared by command handlers.
pub struct CommandContext {
    pub pending: Arc<RecordStore<PendingRecords>>,
    pub whitelist: Arc<RecordStore<WhitelistRecords>>,
    pub bindings: Arc<RecordStore<BindingRecords>>,
}

/// Handler outcome. `Invalid` carries user-facing rejection text; `Internal`
/// wraps an unexpected fault and is reported generically after logging.
#[derive(Debug, thiserror::Error)]
pub enum CommandFailure {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Internal(#[from] Error),
}

pub type CommandResult = std::result::Result<String, CommandFailure>;

#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    /// Argument placeholder(s) for the usage listing; empty if none.
    fn args(&self) -> &'static str;
    fn description(&self) -> &'static str;

    async fn run(&self, ctx: &CommandContext, args: &[&str]) -> CommandResult;
}

/// The set of admin commands, built once at startup and read-only after.
pub struct CommandRegistry {
    commands: Vec<Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new(commands: Vec<Box<dyn CommandHandler>>) -> Self {
        Self { commands }
    }

    /// The five baseline commands.
    pub fn builtin() -> Self {
        Self::new(crate::admin::builtin_commands())
    }

    pub fn find(&self, name: &str) -> Option<&dyn CommandHandler> {
        self.commands
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// Full usage listing, sent when the command name does not match.
    pub fn usage(&self) -> String {
        let mut lines = vec!["支持的命令：".to_string()];
        for c in &self.commands {
            let args = c.args();
            if args.is_empty() {
                lines.push(format!("{COMMAND_MARKER}{} —— {}", c.name(), c.description()));
            } else {
                lines.push(format!(
                    "{COMMAND_MARKER}{} {args} —— {}",
                    c.name(),
                    c.description()
                ));
            }
        }
        lines.join("\n")
    }
}

/// Parses and runs admin commands from private messages.
pub struct CommandDispatcher {
    registry: CommandRegistry,
    ctx: CommandContext,
    oracle: Arc<dyn GroupMembershipOracle>,
    group_id: Option<GroupId>,
    admin_qq: Option<UserId>,
}

enum Gate {
    Allowed,
    Denied(&'static str),
}

impl CommandDispatcher {
    pub fn new(
        registry: CommandRegistry,
        ctx: CommandContext,
        oracle: Arc<dyn GroupMembershipOracle>,
        group_id: Option<GroupId>,
        admin_qq: Option<UserId>,
    ) -> Self {
        Self {
            registry,
            ctx,
            oracle,
            group_id,
            admin_qq,
        }
    }

    async fn gate(&self, sender: UserId) -> Result<Gate> {
        if self.admin_qq == Some(sender) {
            return Ok(Gate::Allowed);
        }

        let Some(group) = self.group_id else {
            return Ok(Gate::Denied(GROUP_NOT_CONFIGURED));
        };
        let role = self.oracle.member_role(group, sender).await?;
        if role.is_some_and(Role::is_elevated) {
            Ok(Gate::Allowed)
        } else {
            Ok(Gate::Denied(PERMISSION_DENIED))
        }
    }

    /// Try to handle `msg` as a command.
    ///
    /// `Ok(None)` means the message is not a command at all and should fall
    /// through to verification. Handler faults never escape: they are logged
    /// here and turned into a generic execution-error reply.
    pub async fn dispatch(&self, msg: &IncomingMessage) -> Result<Option<String>> {
        let Some(first) = msg.first_text() else {
            return Ok(None);
        };
        let Some(body) = first.strip_prefix(COMMAND_MARKER) else {
            return Ok(None);
        };

        // Permission is checked before the command name is even looked at.
        if let Gate::Denied(reply) = self.gate(msg.sender).await? {
            return Ok(Some(reply.to_string()));
        }

        let mut tokens = body.split_whitespace();
        let Some(name) = tokens.next() else {
            return Ok(Some(self.registry.usage()));
        };
        let args: Vec<&str> = tokens.collect();

        let Some(handler) = self.registry.find(name) else {
            return Ok(Some(self.registry.usage()));
        };

        match handler.run(&self.ctx, &args).await {
            Ok(reply) => Ok(Some(reply)),
            Err(CommandFailure::Invalid(reply)) => Ok(Some(reply)),
            Err(CommandFailure::Internal(e)) => {
                error!("command {} failed: {e}", handler.name());
                Ok(Some(format!("命令执行出错：{e}")))
            }
        }
    }
}
