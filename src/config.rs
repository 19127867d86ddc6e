use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::str::FromStr;

use anyhow::Result;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::{info, warn};

/// Startup configuration failure. Anything here is fatal: the bot refuses
/// to start rather than limp along with a half-understood environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DISCORD_BOT_TOKEN is not set in the environment")]
    MissingToken,
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime settings, resolved once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// Literal system prompt text. May start life as a URL in the
    /// environment; `load()` replaces it with the fetched body.
    pub system_prompt: String,
    /// Trigger prompt appended as the final user turn of every request.
    pub msg_prompt: String,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    /// Soft per-message size used by the splitter.
    pub max_response_chars: usize,
    pub allow_bots: bool,
    /// Author-name filter, anchored at the start of the name.
    pub name_pattern: Regex,
    /// Empty set means every channel is allowed.
    pub allowed_channels: HashSet<u64>,
    /// Empty set means every user is allowed.
    pub allowed_users: HashSet<u64>,
    pub history_limit: u8,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    /// Case-insensitive patterns that activate the bot on a match.
    pub trigger_words: Vec<Regex>,
    /// Create a thread per triggering message instead of replying inline.
    pub auto_thread: bool,
}

impl Config {
    /// Resolve the full configuration: parse the environment, then fetch the
    /// system prompt if it is a URL. A failed fetch degrades to an empty
    /// prompt; the bot still starts.
    pub async fn load() -> Result<Config> {
        let mut config = Self::from_env()?;

        if config.system_prompt.starts_with("http://")
            || config.system_prompt.starts_with("https://")
        {
            config.system_prompt = match fetch_system_prompt(&config.system_prompt).await {
                Ok(text) => {
                    info!("System prompt fetched from URL");
                    text
                }
                Err(e) => {
                    warn!("Failed to fetch system prompt from URL: {:#}", e);
                    String::new()
                }
            };
        }

        Ok(config)
    }

    pub fn from_env() -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    pub(crate) fn from_map(vars: &HashMap<String, String>) -> Result<Config, ConfigError> {
        let get = |key: &str| vars.get(key).map(String::as_str).unwrap_or("");

        let bot_token = get("DISCORD_BOT_TOKEN").to_string();
        if bot_token.is_empty() {
            return Err(ConfigError::MissingToken);
        }

        let name_pattern = {
            let raw = or_default(get("NAME_PATTERN"), ".*");
            // Anchor at the start: the filter matches a prefix of the name,
            // not an occurrence anywhere in it.
            Regex::new(&format!(r"\A(?:{raw})")).map_err(|e| ConfigError::Invalid {
                key: "NAME_PATTERN",
                reason: e.to_string(),
            })?
        };

        let trigger_words = split_list(get("TRIGGER_WORDS"))
            .into_iter()
            .map(|word| {
                RegexBuilder::new(&word)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::Invalid {
                        key: "TRIGGER_WORDS",
                        reason: format!("pattern '{word}': {e}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            bot_token,
            system_prompt: get("SYSTEM_PROMPT").trim().to_string(),
            msg_prompt: get("MSG_PROMPT").trim().to_string(),
            model: or_default(get("OPENAI_MODEL"), "gpt-4o-mini").to_string(),
            api_key: get("OPENAI_API_KEY").to_string(),
            base_url: or_default(get("OPENAI_BASE_URL"), "https://api.openai.com/v1").to_string(),
            max_response_chars: parse_value(vars, "MAX_RESPONSE_CHARS", 2000)?,
            allow_bots: parse_bool(vars, "ALLOW_BOTS", false)?,
            name_pattern,
            allowed_channels: parse_id_set(vars, "ALLOWED_CHANNELS")?,
            allowed_users: parse_id_set(vars, "ALLOWED_USERS")?,
            history_limit: parse_value(vars, "HISTORY_LIMIT", 5)?,
            temperature: parse_value(vars, "TEMPERATURE", 1.0)?,
            max_tokens: parse_value(vars, "MAX_TOKENS", 2048)?,
            top_p: parse_value(vars, "TOP_P", 1.0)?,
            frequency_penalty: parse_value(vars, "FREQUENCY_PENALTY", 0.0)?,
            presence_penalty: parse_value(vars, "PRESENCE_PENALTY", 0.0)?,
            trigger_words,
            auto_thread: parse_bool(vars, "AUTO_THREAD", false)?,
        })
    }
}

async fn fetch_system_prompt(url: &str) -> Result<String> {
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(response.text().await?.trim().to_string())
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

/// Split a comma-separated list, trimming whitespace and dropping empties.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T>(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::Invalid {
                key,
                reason: format!("expected a boolean, got '{other}'"),
            }),
        },
        None => Ok(default),
    }
}

fn parse_id_set(
    vars: &HashMap<String, String>,
    key: &'static str,
) -> Result<HashSet<u64>, ConfigError> {
    split_list(vars.get(key).map(String::as_str).unwrap_or(""))
        .into_iter()
        .map(|entry| {
            entry.parse().map_err(|_| ConfigError::Invalid {
                key,
                reason: format!("'{entry}' is not a numeric ID"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DISCORD_BOT_TOKEN".to_string(), "token".to_string());
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    #[test]
    fn missing_token_is_fatal() {
        let empty = HashMap::new();
        assert!(matches!(
            Config::from_map(&empty),
            Err(ConfigError::MissingToken)
        ));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_map(&vars(&[])).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_response_chars, 2000);
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.temperature, 1.0);
        assert!(!config.allow_bots);
        assert!(!config.auto_thread);
        assert!(config.allowed_channels.is_empty());
        assert!(config.allowed_users.is_empty());
        assert!(config.trigger_words.is_empty());
    }

    #[test]
    fn comma_lists_are_trimmed_and_empties_dropped() {
        let config = Config::from_map(&vars(&[("ALLOWED_CHANNELS", " 1, 2 ,, 3 ,")])).unwrap();
        assert_eq!(config.allowed_channels, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn non_numeric_id_fails_with_field_name() {
        let err = Config::from_map(&vars(&[("ALLOWED_USERS", "1,abc")])).unwrap_err();
        match err {
            ConfigError::Invalid { key, .. } => assert_eq!(key, "ALLOWED_USERS"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_trigger_pattern_is_a_startup_error() {
        let err = Config::from_map(&vars(&[("TRIGGER_WORDS", "ok,([")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "TRIGGER_WORDS",
                ..
            }
        ));
    }

    #[test]
    fn trigger_patterns_match_case_insensitively() {
        let config = Config::from_map(&vars(&[("TRIGGER_WORDS", "HeLLo")])).unwrap();
        assert!(config.trigger_words[0].is_match("well hello there"));
    }

    #[test]
    fn name_pattern_is_anchored_at_the_start() {
        let config = Config::from_map(&vars(&[("NAME_PATTERN", "bob")])).unwrap();
        assert!(config.name_pattern.is_match("bob"));
        assert!(config.name_pattern.is_match("bobby"));
        assert!(!config.name_pattern.is_match("sir bob"));
    }

    #[test]
    fn invalid_number_fails_with_field_name() {
        let err = Config::from_map(&vars(&[("HISTORY_LIMIT", "many")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "HISTORY_LIMIT",
                ..
            }
        ));
    }
}
