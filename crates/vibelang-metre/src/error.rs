//! Error types for vibelang-metre

use crate::rational::RationalDuration;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for metre and bar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the metre engine, the scheduling façade and the CLI host
#[derive(Debug, Error)]
pub enum Error {
    /// The metre specification is not a valid rational partition
    #[error("Malformed metre: {0}")]
    MalformedMetre(String),

    /// No micro-timing style is registered under this name
    #[error("Unknown style: {0}")]
    UnknownStyle(String),

    /// The style cannot be applied to the shape of this metre
    #[error("Style {style} is not compatible with metre {metre}: {reason}")]
    IncompatibleStyle {
        style: String,
        metre: String,
        reason: String,
    },

    /// The level does not address a tier of the subdivision tree
    #[error("Invalid level {level}: this metre supports levels {min} to {max}")]
    InvalidLevel { level: i64, min: i64, max: i64 },

    /// Durations are counted in whole notes of a level and cannot be negative
    #[error("Invalid duration {0}: must not be negative")]
    InvalidDuration(i64),

    /// The placement does not fit into the space left in the bar
    #[error("Bar overflow: note needs {required} quarter lengths but only {remaining} remain")]
    BarOverflow {
        required: RationalDuration,
        remaining: RationalDuration,
    },

    /// A bar was opened on a thread that has no metre
    #[error("Bar requires a metre to be defined")]
    NoMetreDefined,

    /// A placement was issued outside of a bar
    #[error("{0} must be called inside a bar")]
    NotInBar(&'static str),

    /// A bar was opened inside another bar
    #[error("Bars cannot be nested")]
    NestedBar,

    /// A scoped function was called without a block, or the other way round
    #[error("{0}")]
    BlockMisuse(String),

    /// The performer failed to play or sleep
    #[error("Performer error: {0}")]
    Performer(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No configuration file at this path
    #[error("Config file not found at {0:?}")]
    ConfigNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
