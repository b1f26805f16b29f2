//! The five baseline admin commands.

use async_trait::async_trait;

use crate::{
    commands::{CommandContext, CommandFailure, CommandHandler, CommandResult, COMMAND_MARKER},
    domain::UserId,
    records::{Binding, WhitelistEntry},
};

/// Minimum characters for the substring search.
const SEARCH_MIN_CHARS: usize = 3;

pub(crate) fn builtin_commands() -> Vec<Box<dyn CommandHandler>> {
    vec![
        Box::new(QueryByQq),
        Box::new(QueryByName),
        Box::new(SearchByName),
        Box::new(WhitelistAdd),
        Box::new(WhitelistShow),
    ]
}

fn join_names(names: &[String]) -> String {
    if names.is_empty() {
        "（无记录）".to_string()
    } else {
        names.join("、")
    }
}

fn format_binding(b: &Binding) -> String {
    format!(
        "QQ：{}\nUUID：{}\n绑定时间：{}\n游戏名：{}",
        b.qq,
        b.uuid,
        b.time,
        join_names(&b.names)
    )
}

fn format_whitelist_entry(e: &WhitelistEntry) -> String {
    format!(
        "UUID：{}\n游戏名：{}\n原因：{}",
        e.uuid,
        join_names(&e.names),
        e.reason
    )
}

struct QueryByQq;

#[async_trait]
impl CommandHandler for QueryByQq {
    fn name(&self) -> &'static str {
        "QQ查信息"
    }
    fn args(&self) -> &'static str {
        "<QQ号>"
    }
    fn description(&self) -> &'static str {
        "查询某个QQ号的绑定信息"
    }

    async fn run(&self, ctx: &CommandContext, args: &[&str]) -> CommandResult {
        let &[raw] = args else {
            return Err(CommandFailure::Invalid(format!(
                "用法：{COMMAND_MARKER}QQ查信息 <QQ号>"
            )));
        };
        let qq: i64 = raw
            .parse()
            .map_err(|_| CommandFailure::Invalid("QQ号格式不正确".to_string()))?;

        let _guard = ctx.bindings.guard().await;
        let book = ctx.bindings.load_or_default()?;
        Ok(match book.find_by_qq(UserId(qq)) {
            Some(binding) => format_binding(binding),
            None => "未查询到该QQ的绑定信息".to_string(),
        })
    }
}

struct QueryByName;

#[async_trait]
impl CommandHandler for QueryByName {
    fn name(&self) -> &'static str {
        "游戏名查信息"
    }
    fn args(&self) -> &'static str {
        "<游戏名>"
    }
    fn description(&self) -> &'static str {
        "按游戏名精确查询绑定或白名单信息"
    }

    async fn run(&self, ctx: &CommandContext, args: &[&str]) -> CommandResult {
        let &[name] = args else {
            return Err(CommandFailure::Invalid(format!(
                "用法：{COMMAND_MARKER}游戏名查信息 <游戏名>"
            )));
        };

        let mut sections = Vec::new();
        {
            let _guard = ctx.bindings.guard().await;
            let book = ctx.bindings.load_or_default()?;
            if let Some(binding) = book.find_by_name(name) {
                sections.push(format!("绑定记录：\n{}", format_binding(binding)));
            }
        }
        {
            let _guard = ctx.whitelist.guard().await;
            let book = ctx.whitelist.load_or_default()?;
            if let Some(entry) = book.find_by_name(name) {
                sections.push(format!("白名单记录：\n{}", format_whitelist_entry(entry)));
            }
        }

        Ok(if sections.is_empty() {
            "未查询到该游戏名的信息".to_string()
        } else {
            sections.join("\n\n")
        })
    }
}

struct SearchByName;

#[async_trait]
impl CommandHandler for SearchByName {
    fn name(&self) -> &'static str {
        "游戏名搜索信息"
    }
    fn args(&self) -> &'static str {
        "<游戏名片段>"
    }
    fn description(&self) -> &'static str {
        "按游戏名模糊搜索，至少3个字符"
    }

    async fn run(&self, ctx: &CommandContext, args: &[&str]) -> CommandResult {
        let &[fragment] = args else {
            return Err(CommandFailure::Invalid(format!(
                "用法：{COMMAND_MARKER}游戏名搜索信息 <游戏名片段>"
            )));
        };
        if fragment.chars().count() < SEARCH_MIN_CHARS {
            return Err(CommandFailure::Invalid(format!(
                "搜索内容至少需要{SEARCH_MIN_CHARS}个字符"
            )));
        }

        let mut lines = Vec::new();
        {
            let _guard = ctx.bindings.guard().await;
            let book = ctx.bindings.load_or_default()?;
            for binding in book.search_name(fragment) {
                lines.push(format!("{}（QQ：{}）", join_names(&binding.names), binding.qq));
            }
        }
        {
            let _guard = ctx.whitelist.guard().await;
            let book = ctx.whitelist.load_or_default()?;
            for entry in book.search_name(fragment) {
                lines.push(format!("{}（白名单：{}）", join_names(&entry.names), entry.reason));
            }
        }

        Ok(if lines.is_empty() {
            "未搜索到匹配的游戏名".to_string()
        } else {
            format!("搜索结果（共{}条）：\n{}", lines.len(), lines.join("\n"))
        })
    }
}

struct WhitelistAdd;

#[async_trait]
impl CommandHandler for WhitelistAdd {
    fn name(&self) -> &'static str {
        "添加白名单"
    }
    fn args(&self) -> &'static str {
        "<游戏名> <原因>"
    }
    fn description(&self) -> &'static str {
        "为无法完成验证的玩家补录白名单"
    }

    async fn run(&self, ctx: &CommandContext, args: &[&str]) -> CommandResult {
        let Some((&name, reason_parts)) = args.split_first() else {
            return Err(CommandFailure::Invalid(format!(
                "用法：{COMMAND_MARKER}添加白名单 <游戏名> <原因>"
            )));
        };
        if reason_parts.is_empty() {
            return Err(CommandFailure::Invalid(format!(
                "用法：{COMMAND_MARKER}添加白名单 <游戏名> <原因>"
            )));
        }
        let reason = reason_parts.join(" ");

        // Guards for the whole read-modify-write pair; pending before
        // whitelist to match the global acquisition order.
        let _pending_guard = ctx.pending.guard().await;
        let _whitelist_guard = ctx.whitelist.guard().await;

        let mut whitelist = ctx.whitelist.load_or_default()?;
        if whitelist.has_name(name) {
            return Err(CommandFailure::Invalid(format!("游戏名 {name} 已在白名单中")));
        }

        let mut pending = ctx.pending.load()?;
        let Some(record) = pending.take_by_name(name) else {
            return Err(CommandFailure::Invalid(format!(
                "未找到游戏名 {name} 的验证记录，请确认玩家已在服务器发起注册"
            )));
        };

        whitelist.whitelist.push(WhitelistEntry {
            uuid: record.uuid,
            names: vec![record.name],
            reason: reason.clone(),
        });
        ctx.pending.save(&pending)?;
        ctx.whitelist.save(&whitelist)?;

        Ok(format!("已添加白名单：{name}（{reason}）"))
    }
}

struct WhitelistShow;

#[async_trait]
impl CommandHandler for WhitelistShow {
    fn name(&self) -> &'static str {
        "查看白名单"
    }
    fn args(&self) -> &'static str {
        ""
    }
    fn description(&self) -> &'static str {
        "列出当前全部白名单"
    }

    async fn run(&self, ctx: &CommandContext, _args: &[&str]) -> CommandResult {
        let _guard = ctx.whitelist.guard().await;
        let book = ctx.whitelist.load_or_default()?;

        if book.whitelist.is_empty() {
            return Ok("白名单为空".to_string());
        }

        let lines: Vec<String> = book
            .whitelist
            .iter()
            .map(|e| {
                format!(
                    "{} —— {}（UUID：{}）",
                    join_names(&e.names),
                    e.reason,
                    e.uuid
                )
            })
            .collect();
        Ok(format!(
            "当前白名单（共{}条）：\n{}",
            lines.len(),
            lines.join("\n")
        ))
    }
}
