use async_trait::async_trait;
use dotenvy::dotenv;
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::LazyLock;
use std::{env, fs};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid config value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// A config type that lives under one table of a TOML file
#[async_trait]
pub trait SectionLoader: Sized {
    async fn load_section_from_file(file_name: &Path) -> Result<Self, LoadConfigError>;
}

pub trait SectionLoaderSync: Sized {
    fn load_section_from_file_sync(file_name: &Path) -> Result<Self, LoadConfigError>;
}

pub async fn load_from_file<T: DeserializeOwned>(file_name: &Path) -> Result<T, LoadConfigError> {
    dotenv().ok();
    let contents = tokio::fs::read_to_string(file_name).await?;
    parse_with_env(&contents)
}

pub fn load_from_file_sync<T: DeserializeOwned>(file_name: &Path) -> Result<T, LoadConfigError> {
    dotenv().ok();
    let contents = fs::read_to_string(file_name)?;
    parse_with_env(&contents)
}

/// Parse TOML after substituting `${VAR}` references from the environment
pub fn parse_with_env<T: DeserializeOwned>(contents: &str) -> Result<T, LoadConfigError> {
    let contents = expand_vars(contents);
    Ok(toml::from_str(&contents)?)
}

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([a-zA-Z_][0-9a-zA-Z_]*)\}").expect("valid env var pattern"));

/// Unset variables are left as written
fn expand_vars(raw_config: &str) -> String {
    ENV_VAR
        .replace_all(raw_config, |caps: &Captures| match env::var(&caps[1]) {
            Ok(val) => val,
            Err(_) => caps[0].to_string(),
        })
        .to_string()
}
