//! Error types for a posting run

use std::fmt;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The three requests of a media upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Init,
    Append,
    Finalize,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadPhase::Init => "INIT",
            UploadPhase::Append => "APPEND",
            UploadPhase::Finalize => "FINALIZE",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<&'static str>),

    #[error("failed to read settings file {}: {source}", .path.display())]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {}: {source}", .path.display())]
    SettingsParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notion API error ({status}): {body}")]
    Notion { status: StatusCode, body: String },

    #[error("no records found in the database")]
    NoRecords,

    #[error("nothing to post: record has neither title nor text")]
    EmptyPost,

    #[error("image too large: {size} bytes (max {max} bytes)")]
    MediaTooLarge { size: u64, max: u64 },

    #[error("media {phase} failed ({status}): {body}")]
    Upload {
        phase: UploadPhase,
        status: StatusCode,
        body: String,
    },

    #[error("post rejected ({status}): {body}")]
    Publish { status: StatusCode, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::MissingEnv(_) | Error::SettingsRead { .. } | Error::SettingsParse { .. } => 2,
            _ => 1,
        }
    }
}
