//! Scheduler configuration.
//!
//! Policies are code, so only the plain settings live in the config file:
//! answer timeout, default ordering strategy, and the add-conflict policy.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::answer::AnswerPolicy;
use crate::machine::SchedulerOptions;
use crate::queue::{DueDateOrder, ReviewOrder, Shuffle};
use crate::store::AddConflict;

/// Built-in ordering strategies selectable from config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    #[default]
    Shuffle,
    DueDate,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Shuffle => write!(f, "shuffle"),
            OrderKind::DueDate => write!(f, "due-date"),
        }
    }
}

impl FromStr for OrderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shuffle" | "random" => Ok(OrderKind::Shuffle),
            "due-date" | "due_date" | "date" => Ok(OrderKind::DueDate),
            other => Err(format!("unknown review order: {other}")),
        }
    }
}

/// Top-level cuecard configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Answer timeout in milliseconds. Unset means no timeout.
    #[serde(default)]
    pub time_to_answer_ms: Option<u64>,
    /// Review order strategy.
    #[serde(default)]
    pub order: OrderKind,
    /// Seed for the shuffle strategy; unset uses the thread RNG.
    #[serde(default)]
    pub seed: Option<u64>,
    /// What adding an already stored id does.
    #[serde(default)]
    pub on_duplicate: AddConflict,
}

impl SchedulerConfig {
    pub fn time_to_answer(&self) -> Option<Duration> {
        self.time_to_answer_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn review_order<D: 'static>(&self) -> Box<dyn ReviewOrder<D>> {
        match (self.order, self.seed) {
            (OrderKind::Shuffle, Some(seed)) => Box::new(Shuffle::seeded(seed)),
            (OrderKind::Shuffle, None) => Box::new(Shuffle::new()),
            (OrderKind::DueDate, _) => Box::new(DueDateOrder),
        }
    }

    /// Scheduler options using `policy` and these settings.
    pub fn options<D: 'static, A: 'static>(
        &self,
        policy: impl AnswerPolicy<D, A> + 'static,
    ) -> SchedulerOptions<D, A> {
        SchedulerOptions::new(policy)
            .with_boxed_order(self.review_order())
            .with_time_to_answer(self.time_to_answer())
            .with_add_conflict(self.on_duplicate)
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `cuecard.toml` in the current directory
/// 2. `~/.config/cuecard/config.toml`
///
/// Environment variable overrides: `CUECARD_TIME_TO_ANSWER_MS`, `CUECARD_ORDER`.
pub fn load_config() -> Result<SchedulerConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<SchedulerConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("cuecard.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => parse_config_file(&path)?,
        None => SchedulerConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

/// Apply `CUECARD_*` overrides, reading variables through `lookup`.
fn apply_env_overrides(
    config: &mut SchedulerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(ms) = lookup("CUECARD_TIME_TO_ANSWER_MS") {
        let ms = ms
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid CUECARD_TIME_TO_ANSWER_MS: {ms}"))?;
        config.time_to_answer_ms = Some(ms);
    }

    if let Some(order) = lookup("CUECARD_ORDER") {
        config.order = order
            .parse()
            .map_err(|e: String| anyhow::anyhow!("invalid CUECARD_ORDER: {e}"))?;
    }

    Ok(())
}

/// Parse a single config file.
pub fn parse_config_file(path: &Path) -> Result<SchedulerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("cuecard"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.order, OrderKind::Shuffle);
        assert_eq!(config.on_duplicate, AddConflict::Reject);
        assert!(config.time_to_answer().is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
time_to_answer_ms = 8000
order = "due-date"
seed = 42
on_duplicate = "keep-existing"
"#;
        let config: SchedulerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.time_to_answer(), Some(Duration::from_secs(8)));
        assert_eq!(config.order, OrderKind::DueDate);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.on_duplicate, AddConflict::KeepExisting);
    }

    #[test]
    fn zero_timeout_means_none() {
        let config = SchedulerConfig {
            time_to_answer_ms: Some(0),
            ..Default::default()
        };
        assert!(config.time_to_answer().is_none());
    }

    #[test]
    fn unknown_order_is_rejected() {
        assert!(toml::from_str::<SchedulerConfig>(r#"order = "alphabetical""#).is_err());
        assert!("alphabetical".parse::<OrderKind>().is_err());
        assert_eq!("date".parse::<OrderKind>().unwrap(), OrderKind::DueDate);
    }

    #[test]
    fn explicit_missing_file_fails() {
        let err = load_config_from(Some(Path::new("/nonexistent/cuecard.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = SchedulerConfig {
            time_to_answer_ms: Some(8000),
            order: OrderKind::Shuffle,
            ..Default::default()
        };
        apply_env_overrides(
            &mut config,
            env(&[
                ("CUECARD_TIME_TO_ANSWER_MS", " 2500 "),
                ("CUECARD_ORDER", "due-date"),
            ]),
        )
        .unwrap();

        assert_eq!(config.time_to_answer(), Some(Duration::from_millis(2500)));
        assert_eq!(config.order, OrderKind::DueDate);
    }

    #[test]
    fn unset_env_leaves_config_alone() {
        let mut config = SchedulerConfig {
            time_to_answer_ms: Some(8000),
            seed: Some(1),
            ..Default::default()
        };
        let before = config.clone();
        apply_env_overrides(&mut config, env(&[])).unwrap();
        assert_eq!(config, before);
    }

    #[test]
    fn invalid_timeout_env_is_rejected() {
        let mut config = SchedulerConfig::default();
        let err = apply_env_overrides(
            &mut config,
            env(&[("CUECARD_TIME_TO_ANSWER_MS", "ten seconds")]),
        )
        .unwrap_err();

        assert!(err.to_string().contains("invalid CUECARD_TIME_TO_ANSWER_MS: ten seconds"));
        assert!(config.time_to_answer().is_none());
    }

    #[test]
    fn invalid_order_env_is_rejected() {
        let mut config = SchedulerConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("CUECARD_ORDER", "alphabetical")]))
            .unwrap_err();

        assert!(err.to_string().contains("invalid CUECARD_ORDER"));
        assert_eq!(config.order, OrderKind::Shuffle);
    }

    #[test]
    fn parse_config_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cuecard.toml");
        std::fs::write(&path, "order = \"shuffle\"\nseed = 3\n").unwrap();
        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.seed, Some(3));
    }
}
