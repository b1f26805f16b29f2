use std::{sync::Arc, time::Duration};

use regex::Regex;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    config::Config,
    domain::GroupId,
    limiter::RateLimiter,
    message::IncomingMessage,
    ports::GroupMembershipOracle,
    records::{Binding, BindingRecords, PendingRecords},
    store::RecordStore,
    Result,
};

/// Outcome of running a private message through verification.
///
/// Every branch of the ladder gets its own variant so replies stay specific
/// and tests can assert on behavior instead of on strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// No digit run anywhere: not a verification message, stay silent.
    NotVerification,
    /// Digit runs present, but none of the configured length.
    UnsupportedFormat,
    ConfigMissing,
    RateLimited,
    CodeNotFound,
    NotInGroup(GroupId),
    AlreadyBound,
    Verified { name: String },
}

impl Verdict {
    pub fn reply_text(&self, code_length: usize) -> Option<String> {
        match self {
            Verdict::NotVerification => None,
            Verdict::UnsupportedFormat => Some(format!(
                "机器人只支持服务器进服验证消息，格式为{code_length}位数字，其他问题请联系群腐竹哦~"
            )),
            Verdict::ConfigMissing => Some("群数据错误！请联系管理员".to_string()),
            Verdict::RateLimited => Some("查询太频繁了，请稍后再试！".to_string()),
            Verdict::CodeNotFound => Some(
                "未查询到验证数据！请检查验证码是否正确，或者联系管理员处理。".to_string(),
            ),
            Verdict::NotInGroup(group) => Some(format!("检测到您尚未加群！{group}")),
            Verdict::AlreadyBound => Some("当前QQ号已经存在绑定！请联系管理员处理".to_string()),
            Verdict::Verified { .. } => {
                Some("验证成功！欢迎加入服务器，重新进服即可。".to_string())
            }
        }
    }
}

/// The subset of [`Config`] the processor needs.
#[derive(Clone, Copy, Debug)]
pub struct VerifySettings {
    pub code_length: usize,
    pub group_id: Option<GroupId>,
    pub rate_limit_window: Duration,
}

impl VerifySettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            code_length: cfg.code_length,
            group_id: cfg.group_id,
            rate_limit_window: cfg.rate_limit_window,
        }
    }
}

enum CodeScan {
    Found(String),
    WrongLength,
    NoDigits,
}

/// Consumes private messages carrying a verification code and turns them
/// into bindings.
pub struct VerificationProcessor {
    settings: VerifySettings,
    digit_run: Regex,
    limiter: Mutex<RateLimiter>,
    pending: Arc<RecordStore<PendingRecords>>,
    bindings: Arc<RecordStore<BindingRecords>>,
    oracle: Arc<dyn GroupMembershipOracle>,
}

impl VerificationProcessor {
    pub fn new(
        settings: VerifySettings,
        pending: Arc<RecordStore<PendingRecords>>,
        bindings: Arc<RecordStore<BindingRecords>>,
        oracle: Arc<dyn GroupMembershipOracle>,
    ) -> Self {
        Self {
            digit_run: Regex::new(r"\d+").expect("digit-run pattern"),
            limiter: Mutex::new(RateLimiter::new(settings.rate_limit_window)),
            settings,
            pending,
            bindings,
            oracle,
        }
    }

    pub fn code_length(&self) -> usize {
        self.settings.code_length
    }

    /// First digit run of each text segment, in segment order; the first run
    /// with exactly the configured length is the code. A segment whose first
    /// run has the wrong length is skipped, not re-scanned.
    fn scan_code(&self, msg: &IncomingMessage) -> CodeScan {
        let mut saw_digits = false;
        for text in msg.text_segments() {
            let Some(run) = self.digit_run.find(text) else {
                continue;
            };
            saw_digits = true;
            if run.as_str().len() == self.settings.code_length {
                return CodeScan::Found(run.as_str().to_string());
            }
        }

        if saw_digits {
            CodeScan::WrongLength
        } else {
            CodeScan::NoDigits
        }
    }

    /// Run the verification ladder. First matching condition wins.
    ///
    /// Storage failures propagate so the router can degrade the feature;
    /// every other branch becomes a [`Verdict`].
    pub async fn process(&self, msg: &IncomingMessage) -> Result<Verdict> {
        let code = match self.scan_code(msg) {
            CodeScan::NoDigits => return Ok(Verdict::NotVerification),
            CodeScan::WrongLength => return Ok(Verdict::UnsupportedFormat),
            CodeScan::Found(code) => code,
        };

        let Some(group) = self.settings.group_id else {
            return Ok(Verdict::ConfigMissing);
        };

        if !self.limiter.lock().await.check_and_record(msg.sender) {
            return Ok(Verdict::RateLimited);
        }

        // Guard held from the pending read through both saves; the membership
        // query suspends in between. Acquisition order is pending first,
        // bindings second, everywhere.
        let _pending_guard = self.pending.guard().await;
        let mut pending = self.pending.load()?;
        let Some(idx) = pending.position_by_code(&code) else {
            return Ok(Verdict::CodeNotFound);
        };

        // Always a live query; a user who just joined must pass immediately.
        let members = self.oracle.group_members(group).await?;
        if !members.iter().any(|m| m.user_id == msg.sender) {
            return Ok(Verdict::NotInGroup(group));
        }

        let _bindings_guard = self.bindings.guard().await;
        let mut bindings = self.bindings.load_or_default()?;
        if bindings.has_qq(msg.sender) {
            return Ok(Verdict::AlreadyBound);
        }

        let record = pending.records.remove(idx);
        bindings
            .records
            .push(Binding::new(msg.sender, record.uuid.clone(), record.name.clone()));
        self.pending.save(&pending)?;
        self.bindings.save(&bindings)?;

        info!(
            "verified qq {} as {} (uuid {})",
            msg.sender, record.name, record.uuid
        );
        Ok(Verdict::Verified { name: record.name })
    }
}
