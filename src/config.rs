use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const SETTINGS_PATH_VAR: &str = "NOTION_POST_X_CONFIG";

const NOTION_TOKEN: &str = "NOTION_TOKEN";
const NOTION_DATABASE_ID: &str = "NOTION_DATABASE_ID";
const TWITTER_CONSUMER_KEY: &str = "TWITTER_CONSUMER_KEY";
const TWITTER_CONSUMER_SECRET: &str = "TWITTER_CONSUMER_SECRET";
const TWITTER_ACCESS_TOKEN: &str = "TWITTER_ACCESS_TOKEN";
const TWITTER_ACCESS_TOKEN_SECRET: &str = "TWITTER_ACCESS_TOKEN_SECRET";

/// OAuth 1.0a user-context credentials for the X API.
#[derive(Clone)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &"***REDACTED***")
            .field("consumer_secret", &"***REDACTED***")
            .field("access_token", &"***REDACTED***")
            .field("access_token_secret", &"***REDACTED***")
            .finish()
    }
}

#[derive(Clone)]
pub struct NotionAuth {
    pub token: String,
    pub database_id: String,
}

impl fmt::Debug for NotionAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionAuth")
            .field("token", &"***REDACTED***")
            .field("database_id", &self.database_id)
            .finish()
    }
}

/// Names of the database properties the extractor reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub title: String,
    pub body: String,
    pub image: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            title: "タイトル".into(),
            body: "テキスト".into(),
            image: "画像".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub notion_api: String,
    pub notion_version: String,
    pub media_upload: String,
    pub tweets: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            notion_api: "https://api.notion.com/v1".into(),
            notion_version: "2022-06-28".into(),
            media_upload: "https://upload.twitter.com/1.1/media/upload.json".into(),
            tweets: "https://api.twitter.com/2/tweets".into(),
        }
    }
}

/// Optional, non-secret settings read from the TOML settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fields: FieldNames,
    pub endpoints: Endpoints,
    pub download_dir: Option<PathBuf>,
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| Error::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&content).map_err(|source| Error::SettingsParse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Settings loaded from {}", path.display());
        Ok(settings)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub notion: NotionAuth,
    pub credentials: Credentials,
    pub settings: Settings,
}

impl Config {
    /// Build the run configuration from `.env`, the process environment and the
    /// settings file.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let lookup = |name: &str| std::env::var(name).ok();
        let settings = match settings_path(lookup) {
            Some(path) => Settings::load_from_path(&path)?,
            None => Settings::default(),
        };
        Self::from_lookup(lookup, settings)
    }

    /// Build the configuration from an arbitrary variable lookup. Every missing
    /// variable is reported, not just the first.
    pub fn from_lookup<F>(lookup: F, settings: Settings) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut require = |name: &'static str| match lookup(name) {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                missing.push(name);
                String::new()
            }
        };

        let notion = NotionAuth {
            token: require(NOTION_TOKEN),
            database_id: require(NOTION_DATABASE_ID),
        };
        let credentials = Credentials {
            consumer_key: require(TWITTER_CONSUMER_KEY),
            consumer_secret: require(TWITTER_CONSUMER_SECRET),
            access_token: require(TWITTER_ACCESS_TOKEN),
            access_token_secret: require(TWITTER_ACCESS_TOKEN_SECRET),
        };

        if !missing.is_empty() {
            return Err(Error::MissingEnv(missing));
        }

        Ok(Self {
            notion,
            credentials,
            settings,
        })
    }

    pub fn download_dir(&self) -> PathBuf {
        self.settings
            .download_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn settings_path<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(SETTINGS_PATH_VAR) {
        return Some(PathBuf::from(path));
    }
    let home = lookup("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("notion-post-x")
            .join("config.toml"),
    )
}
