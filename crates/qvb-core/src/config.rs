use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    domain::{GroupId, UserId},
    errors::Error,
    Result,
};

/// Typed configuration for the bot, loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // OneBot endpoint
    pub host: String,
    pub port: u16,
    pub access_token: String,

    // Group / admin
    pub group_id: Option<GroupId>,
    pub admin_qq: Option<UserId>,

    // Store paths; an unset path disables the feature backed by it
    pub chat_history_path: Option<PathBuf>,
    pub pending_path: Option<PathBuf>,
    pub whitelist_path: Option<PathBuf>,
    pub bindings_path: Option<PathBuf>,

    // Tunables
    pub max_chat_history: usize,
    pub rate_limit_window: Duration,
    pub code_length: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let host = env_str("HOST").and_then(non_empty).ok_or_else(|| {
            Error::Config("HOST environment variable is required".to_string())
        })?;
        let port = env_str("PORT")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .ok_or_else(|| Error::Config("PORT environment variable is required".to_string()))?;
        let access_token = env_str("TOKEN").and_then(non_empty).ok_or_else(|| {
            Error::Config("TOKEN environment variable is required".to_string())
        })?;

        let group_id = env_i64("GROUP_ID").map(GroupId);
        let admin_qq = env_i64("ADMIN_QQ").map(UserId);

        let chat_history_path = env_path("CHAT_HISTORY_SAVE_PATH");
        let pending_path = env_path("VERIFY_RECORDS_FILE");
        let whitelist_path = env_path("WHITELIST_FILE");
        let bindings_path = env_path("VERIFY_SUCCESS_FILE");

        let max_chat_history = env_usize("MAX_CHAT_HISTORY").unwrap_or(100);
        let rate_limit_window = Duration::from_secs(env_u64("QUERY_LIMIT_SECONDS").unwrap_or(3));
        let code_length = env_usize("CODE_LENGTH").unwrap_or(4);

        Ok(Self {
            host,
            port,
            access_token,
            group_id,
            admin_qq,
            chat_history_path,
            pending_path,
            whitelist_path,
            bindings_path,
            max_chat_history,
            rate_limit_window,
            code_length,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_does_not_override_existing_env() {
        let pid = std::process::id();
        let key = format!("QVB_TEST_DOTENV_{pid}");
        let path = PathBuf::from(format!("/tmp/qvb-dotenv-{pid}.env"));

        env::set_var(&key, "from-env");
        fs::write(&path, format!("{key}=from-file\n")).unwrap();

        load_dotenv_if_present(&path);
        assert_eq!(env::var(&key).unwrap(), "from-env");

        env::remove_var(&key);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn dotenv_strips_quotes_and_skips_comments() {
        let pid = std::process::id();
        let key = format!("QVB_TEST_QUOTED_{pid}");
        let path = PathBuf::from(format!("/tmp/qvb-dotenv-q-{pid}.env"));

        fs::write(&path, format!("# comment\n{key}=\"secret value\"\n")).unwrap();
        load_dotenv_if_present(&path);
        assert_eq!(env::var(&key).unwrap(), "secret value");

        env::remove_var(&key);
        let _ = fs::remove_file(&path);
    }
}
