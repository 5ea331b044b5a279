use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build::CsvOptions;
use crate::storage::{BuildOptions, CodecKind};

/// Defaults read from the CLI config file; command-line flags win over them.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    /// Loads `explicit`, or the default config file if it exists.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    /// Parses a config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let data = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Ok(Self { path: None, data })
    }

    /// File the config was looked up at.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Build options with the configured overrides applied.
    pub fn build_options(&self) -> BuildOptions {
        let raw = &self.data.build;
        let mut opts = BuildOptions::default();
        if let Some(inline) = raw.inline_numbers {
            opts = opts.inline_numbers(inline);
        }
        if let Some(codec) = raw.codec {
            opts = opts.codec(codec);
        }
        if let Some(min_len) = raw.compress_min_len {
            opts = opts.compress_min_len(min_len);
        }
        if let Some(max_buffer) = raw.max_buffer {
            opts = opts.max_buffer(max_buffer);
        }
        if let Some(headroom) = raw.memory_headroom {
            opts = opts.memory_headroom(headroom);
        }
        if let Some(chop) = raw.chop {
            opts = opts.chop(chop);
        }
        opts
    }

    /// CSV options with the configured overrides applied.
    pub fn csv_options(&self) -> Result<CsvOptions, ConfigError> {
        let raw = &self.data.csv;
        let mut opts = CsvOptions::default();
        if let Some(delimiter) = raw.delimiter {
            opts.delimiter = delimiter_byte(delimiter)?;
        }
        opts.header = raw.header.unwrap_or(opts.header);
        opts.attributes = raw.attributes.unwrap_or(opts.attributes);
        opts.lax = raw.lax.unwrap_or(opts.lax);
        Ok(opts)
    }
}

/// Converts a delimiter character to the single byte the CSV reader expects.
pub fn delimiter_byte(delimiter: char) -> Result<u8, ConfigError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(ConfigError::InvalidDelimiter { value: delimiter })
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    build: BuildSection,
    #[serde(default)]
    csv: CsvSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct BuildSection {
    inline_numbers: Option<bool>,
    codec: Option<CodecKind>,
    compress_min_len: Option<usize>,
    max_buffer: Option<usize>,
    memory_headroom: Option<u64>,
    chop: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct CsvSection {
    delimiter: Option<char>,
    header: Option<bool>,
    attributes: Option<bool>,
    lax: Option<bool>,
}

/// Errors raised while loading the CLI config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but cannot be read.
    #[error("failed to read CLI config {}: {source}", .path.display())]
    Read {
        /// Config file.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse CLI config {}: {source}", .path.display())]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Underlying failure.
        source: toml::de::Error,
    },
    /// The delimiter is not a single ASCII character.
    #[error("delimiter '{value}' is not a single ASCII character")]
    InvalidDelimiter {
        /// Rejected delimiter.
        value: char,
    },
}

/// Default location of the CLI config file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("arbor").join("config.toml"))
}
