//! Deployment settings.
//!
//! All configuration comes from environment variables. The process
//! environment is snapshotted once into [`Settings`] and that snapshot is
//! handed to both the preflight validator and the provisioner.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{IacError, IacResult};

/// Account the stack is deployed to. Read but never validated.
pub const ACCOUNT_VAR: &str = "CDK_DEFAULT_ACCOUNT";

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// A setting the application cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredSetting {
    pub name: &'static str,
    pub description: &'static str,
}

/// Settings checked by the preflight validator, in report order.
pub const REQUIRED_SETTINGS: &[RequiredSetting] = &[
    RequiredSetting {
        name: "DATABASE_URL",
        description: "Postgres connection string used by the app",
    },
    RequiredSetting {
        name: "STRIPE_API_KEY",
        description: "Stripe secret API key for subscriptions",
    },
    RequiredSetting {
        name: "STRIPE_WEBHOOK_SECRET",
        description: "Signing secret for Stripe webhook events",
    },
    RequiredSetting {
        name: "CLOUDINARY_API_KEY",
        description: "Cloudinary API key for media uploads",
    },
    RequiredSetting {
        name: "CLOUDINARY_API_SECRET",
        description: "Cloudinary API secret",
    },
    RequiredSetting {
        name: "CLOUDINARY_CLOUD_NAME",
        description: "Cloudinary cloud name",
    },
    RequiredSetting {
        name: "CLERK_SECRET_KEY",
        description: "Clerk backend secret key",
    },
    RequiredSetting {
        name: "NEXT_PUBLIC_CLERK_PUBLISHABLE_KEY",
        description: "Clerk publishable key exposed to the browser",
    },
];

/// Immutable snapshot of deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
    account: Option<String>,
    region: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            account: None,
            region: DEFAULT_REGION.to_string(),
        }
    }
}

impl Settings {
    /// Snapshot the required settings and the account from the process environment.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        for setting in REQUIRED_SETTINGS {
            if let Ok(value) = std::env::var(setting.name) {
                settings.set(setting.name, value);
            }
        }
        if let Ok(account) = std::env::var(ACCOUNT_VAR) {
            settings.set(ACCOUNT_VAR, account);
        }

        debug!("Captured {} settings from the environment", settings.values.len());
        settings
    }

    /// Build settings from explicit name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut settings = Self::default();
        for (name, value) in pairs {
            settings.set(name, value);
        }
        settings
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Record a value. The account variable is stored separately.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if name == ACCOUNT_VAR {
            self.account = Some(value).filter(|v| !v.is_empty());
        } else {
            self.values.insert(name, value);
        }
    }

    /// Whether a value was recorded at all, even an empty one.
    pub fn contains(&self, name: &str) -> bool {
        if name == ACCOUNT_VAR {
            return self.account.is_some();
        }
        self.values.contains_key(name)
    }

    /// Non-empty value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Value for `name`, or an empty string when absent.
    pub fn get_or_default(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }

    /// Required settings with no usable value, in table order.
    pub fn missing(&self) -> Vec<&'static RequiredSetting> {
        REQUIRED_SETTINGS
            .iter()
            .filter(|s| self.get(s.name).is_none())
            .collect()
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

/// Accepted variable names.
const KEY_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_.]*$";

/// A parsed `.env` file.
///
/// Parsing is lenient: malformed lines are skipped with a warning so a bad
/// line never hides the preflight diagnostics.
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    pub path: PathBuf,
    pub entries: Vec<(String, String)>,
    /// Line numbers (1-based) that were ignored.
    pub skipped: Vec<usize>,
}

impl EnvFile {
    /// Load an env file. Returns `Ok(None)` if the file does not exist.
    pub fn load(path: &Path) -> IacResult<Option<Self>> {
        if !path.exists() {
            debug!("No env file at {:?}", path);
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        let env_file = Self::parse(path, &content)?;
        info!("Loaded {} entries from {:?}", env_file.entries.len(), path);
        Ok(Some(env_file))
    }

    /// Parse `KEY=VALUE` lines.
    pub fn parse(path: &Path, content: &str) -> IacResult<Self> {
        let key_pattern = Regex::new(KEY_PATTERN).map_err(|e| IacError::EnvFile {
            path: path.to_path_buf(),
            line: 0,
            message: format!("Invalid key pattern: {}", e),
        })?;
        let mut env_file = Self {
            path: path.to_path_buf(),
            ..Self::default()
        };

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
            let parsed = match line.split_once('=') {
                Some((key, _)) if !key_pattern.is_match(key.trim()) => {
                    Err(format!("invalid key '{}'", key.trim()))
                }
                Some((key, value)) => parse_value(value.trim())
                    .map(|value| (key.trim().to_string(), value))
                    .map_err(str::to_string),
                None => Err("expected KEY=VALUE".to_string()),
            };

            match parsed {
                Ok(entry) => env_file.entries.push(entry),
                Err(message) => {
                    warn!("Skipping {:?} line {}: {}", path, index + 1, message);
                    env_file.skipped.push(index + 1);
                }
            }
        }

        Ok(env_file)
    }

    /// Fill settings that are not already present. The process environment wins.
    pub fn apply_to(&self, settings: &mut Settings) -> usize {
        let mut applied = 0;
        for (key, value) in &self.entries {
            if !settings.contains(key) {
                settings.set(key.clone(), value.clone());
                applied += 1;
            }
        }
        applied
    }
}

fn parse_value(value: &str) -> Result<String, &'static str> {
    if let Some(rest) = value.strip_prefix('"') {
        let (inner, tail) = split_quoted(rest, '"').ok_or("unterminated double quote")?;
        check_tail(tail)?;
        return Ok(inner.replace("\\n", "\n").replace("\\\"", "\""));
    }
    if let Some(rest) = value.strip_prefix('\'') {
        let (inner, tail) = split_quoted(rest, '\'').ok_or("unterminated single quote")?;
        check_tail(tail)?;
        return Ok(inner.to_string());
    }

    // Unquoted values may carry a trailing comment.
    let value = match value.find(" #") {
        Some(idx) => &value[..idx],
        None => value,
    };
    Ok(value.trim_end().to_string())
}

/// Split at the closing quote, skipping backslash-escaped quotes.
fn split_quoted(rest: &str, quote: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (idx, c) in rest.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            c if c == quote && !escaped => return Some((&rest[..idx], &rest[idx + 1..])),
            _ => escaped = false,
        }
    }
    None
}

/// Only whitespace or a comment may follow a closing quote.
fn check_tail(tail: &str) -> Result<(), &'static str> {
    let tail = tail.trim_start();
    if tail.is_empty() || tail.starts_with('#') {
        Ok(())
    } else {
        Err("unexpected text after closing quote")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_required_table_order() {
        let names: Vec<_> = REQUIRED_SETTINGS.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), 8);
        assert_eq!(names[0], "DATABASE_URL");
        assert_eq!(names[7], "NEXT_PUBLIC_CLERK_PUBLISHABLE_KEY");
        assert!(REQUIRED_SETTINGS.iter().all(|s| !s.description.is_empty()));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let settings = Settings::from_pairs([("DATABASE_URL", ""), ("STRIPE_API_KEY", "sk_test")]);

        assert!(settings.contains("DATABASE_URL"));
        assert_eq!(settings.get("DATABASE_URL"), None);
        assert_eq!(settings.get_or_default("DATABASE_URL"), "");
        assert_eq!(settings.get("STRIPE_API_KEY"), Some("sk_test"));

        let missing: Vec<_> = settings.missing().iter().map(|s| s.name).collect();
        assert!(missing.contains(&"DATABASE_URL"));
        assert!(!missing.contains(&"STRIPE_API_KEY"));
        assert_eq!(missing.len(), 7);
    }

    #[test]
    fn test_account_is_kept_apart() {
        let settings = Settings::from_pairs([(ACCOUNT_VAR, "123456789012")]).with_region("us-east-1");

        assert_eq!(settings.account(), Some("123456789012"));
        assert_eq!(settings.region(), "us-east-1");
        assert_eq!(settings.missing().len(), REQUIRED_SETTINGS.len());
    }

    #[test]
    fn test_parse_env_file() {
        let content = r#"
# database
DATABASE_URL=postgres://localhost/duo
export STRIPE_API_KEY="sk_test_123"
CLERK_SECRET_KEY='sk_clerk'
CLOUDINARY_CLOUD_NAME=duo # trailing comment
MULTILINE="a\nb"
EMPTY=
"#;
        let env = EnvFile::parse(Path::new(".env"), content).unwrap();
        let map: BTreeMap<_, _> = env.entries.into_iter().collect();

        assert_eq!(map["DATABASE_URL"], "postgres://localhost/duo");
        assert_eq!(map["STRIPE_API_KEY"], "sk_test_123");
        assert_eq!(map["CLERK_SECRET_KEY"], "sk_clerk");
        assert_eq!(map["CLOUDINARY_CLOUD_NAME"], "duo");
        assert_eq!(map["MULTILINE"], "a\nb");
        assert_eq!(map["EMPTY"], "");
    }

    #[test]
    fn test_parse_env_file_skips_bad_lines() {
        let content = "DATABASE_URL=pg\nnot-a-pair\n1BAD=x\nKEY=\"open\nSTRIPE_API_KEY=sk\n";
        let env = EnvFile::parse(Path::new(".env"), content).unwrap();

        let keys: Vec<_> = env.entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["DATABASE_URL", "STRIPE_API_KEY"]);
        assert_eq!(env.skipped, vec![2, 3, 4]);
    }

    #[test]
    fn test_parse_quoted_value_with_comment() {
        let content = "STRIPE_API_KEY=\"sk_live\" # prod key\nCLERK_SECRET_KEY='sk_clerk'  # clerk\nESCAPED=\"say \\\"hi\\\"\"\nJUNK=\"v\" trailing\n";
        let env = EnvFile::parse(Path::new(".env"), content).unwrap();
        let map: BTreeMap<_, _> = env.entries.into_iter().collect();

        assert_eq!(map["STRIPE_API_KEY"], "sk_live");
        assert_eq!(map["CLERK_SECRET_KEY"], "sk_clerk");
        assert_eq!(map["ESCAPED"], "say \"hi\"");
        assert!(!map.contains_key("JUNK"));
        assert_eq!(env.skipped, vec![4]);
    }

    #[test]
    fn test_env_file_does_not_override() {
        let mut settings = Settings::from_pairs([("DATABASE_URL", "from-process"), ("STRIPE_API_KEY", "")]);
        let env = EnvFile::parse(
            Path::new(".env"),
            "DATABASE_URL=from-file\nSTRIPE_API_KEY=from-file\nCLERK_SECRET_KEY=from-file\n",
        )
        .unwrap();

        let applied = env.apply_to(&mut settings);

        assert_eq!(applied, 1);
        assert_eq!(settings.get("DATABASE_URL"), Some("from-process"));
        assert_eq!(settings.get("STRIPE_API_KEY"), None);
        assert_eq!(settings.get("CLERK_SECRET_KEY"), Some("from-file"));
    }

    #[test]
    fn test_load_missing_env_file() {
        let dir = tempdir().unwrap();
        assert!(EnvFile::load(&dir.path().join(".env")).unwrap().is_none());

        std::fs::write(dir.path().join(".env"), "CDK_DEFAULT_ACCOUNT=42\n").unwrap();
        let env = EnvFile::load(&dir.path().join(".env")).unwrap().unwrap();
        let mut settings = Settings::default();
        env.apply_to(&mut settings);
        assert_eq!(settings.account(), Some("42"));
    }
}
