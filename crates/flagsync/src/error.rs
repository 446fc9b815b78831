use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SourceError;

#[derive(Error, Debug)]
pub enum FlagSyncError {
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Options error: {0}")]
    Options(#[from] OptionsError),

    #[error("Static config error: {0}")]
    Load(#[from] LoadError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Failures visible to callers of the client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Couldn't initialize in {timeout_secs} second timeout. Trying to fetch key `{key}`.")]
    InitializationTimeout { timeout_secs: u64, key: String },

    #[error(
        "No value found for key '{key}' and no default was provided. \
         Set `on_no_default` to RETURN_NONE to get nothing back instead."
    )]
    MissingDefault { key: String },

    #[error("Value for key '{key}' is {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid options: {0}")]
    Options(#[from] OptionsError),

    #[error("Failed to load static config: {0}")]
    Load(#[from] LoadError),

    #[error("Failed to build source: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to start background sync: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OptionsError {
    #[error("No API key found")]
    MissingApiKey,

    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),

    #[error("No API URL found")]
    MissingApiUrl,

    #[error("Invalid API URL found: {0}")]
    InvalidApiUrl(String),

    #[error("Invalid CDN URL found: {0}")]
    InvalidCdnUrl(String),

    #[error("Checkpoint interval must be greater than zero")]
    InvalidCheckpointInterval,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unsupported value for key '{key}' in '{path}': {reason}")]
    UnsupportedValue {
        path: PathBuf,
        key: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, FlagSyncError>;
