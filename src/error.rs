//! Error types.
//!
//! Each pipeline component has its own error enum so callers (and tests) can
//! match on what went wrong. At the binary boundary everything collapses into
//! [`AppError`], which carries the process exit code.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_BUILD: u8 = 3;
pub const EXIT_FETCH: u8 = 4;
pub const EXIT_IO: u8 = 5;
/// `EX_TEMPFAIL`: the run failed, but trying again later may succeed.
pub const EXIT_TEMPFAIL: u8 = 75;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Bad weights, unsafe paths, missing credential. Always fatal, raised before
/// anything is written.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing {var} in environment (.env).")]
    MissingCredential { var: &'static str },

    #[error("Rejected config path '{name}': {reason}.")]
    UnsafePath { name: String, reason: String },

    #[error("Config directory '{}' is not accessible: {source}", .path.display())]
    ConfigDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read weights file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse weights file '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Weights file '{}' is missing required column `{column}`.", .path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Weights file '{}' line {line}: {message}", .path.display())]
    InvalidEntry {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(
        "Weights file '{}': series {series_id} is listed with conflicting weights {first} and {second}.",
        .path.display()
    )]
    ConflictingWeights {
        path: PathBuf,
        series_id: String,
        first: f64,
        second: f64,
    },

    #[error("Weights in '{}' sum to {sum:.4}; expected 1.0 ± {tolerance}.", .path.display())]
    WeightSum { path: PathBuf, sum: f64, tolerance: f64 },

    #[error("Weights file '{}' has no entries.", .path.display())]
    EmptyWeights { path: PathBuf },

    #[error("Invalid series id '{0}': expected letters, digits, '_' or '-'.")]
    InvalidSeriesId(String),

    #[error("Invalid year range {start}..={end}.")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("Invalid weight tolerance {0}: must be finite and >= 0.")]
    InvalidTolerance(f64),

    #[error("Failed to initialize HTTP client: {0}")]
    HttpClient(String),
}

/// Broad classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Credential rejected.
    Auth,
    /// Request quota or throttling hit.
    RateLimited,
    /// Connection, timeout, or server-side failure.
    Transport,
    /// Response body did not have the expected shape.
    Malformed,
    /// The API refused the request for another reason.
    Api,
}

impl FetchErrorKind {
    /// Whether the same request might succeed later without any change.
    pub fn is_transient(self) -> bool {
        matches!(self, FetchErrorKind::RateLimited | FetchErrorKind::Transport)
    }

    pub fn label(self) -> &'static str {
        match self {
            FetchErrorKind::Auth => "auth",
            FetchErrorKind::RateLimited => "rate-limited",
            FetchErrorKind::Transport => "transport",
            FetchErrorKind::Malformed => "malformed",
            FetchErrorKind::Api => "api",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Fetch failed for series {series_id} ({kind}): {message}")]
pub struct FetchError {
    pub series_id: String,
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(series_id: impl Into<String>, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            series_id: series_id.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Raised by the index build; nothing is written when one occurs.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Missing raw series {series_id} for category '{category}'{}.", fmt_opt_path(.path))]
    MissingSeries {
        category: String,
        series_id: String,
        path: Option<PathBuf>,
    },

    #[error("Failed to read raw series '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse raw series '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Raw series '{}' line {line}: {message}", .path.display())]
    MalformedSeries {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Series {series_id} has duplicate observations for {date}.")]
    DuplicateDate { series_id: String, date: NaiveDate },

    #[error("Series {series_id} is not in ascending date order ({date} follows {previous}).")]
    UnorderedDates {
        series_id: String,
        previous: NaiveDate,
        date: NaiveDate,
    },

    #[error("Series {series_id} has no observation at base date {base_date}.")]
    MissingBaseDate { series_id: String, base_date: NaiveDate },

    #[error("Series {series_id} has non-positive value {value} at base date {base_date}.")]
    InvalidBaseValue {
        series_id: String,
        base_date: NaiveDate,
        value: f64,
    },

    #[error("No dates are shared by all input series ({}).", .series.join(", "))]
    EmptyIntersection { series: Vec<String> },

    #[error("Composite value is not finite on {date}.")]
    NonFinite { date: NaiveDate },

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Raised while reading the result table or producing report artifacts.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to read result table '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse result table '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Result table '{}' line {line}: {message}", .path.display())]
    MalformedTable {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Result table '{}' has no rows.", .path.display())]
    EmptyTable { path: PathBuf },

    #[error("Failed to render chart '{}': {message}", .path.display())]
    Chart { path: PathBuf, message: String },

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// A whole-file write that could not be completed. The destination keeps its
/// previous contents.
#[derive(Debug, Error)]
#[error("Failed to write '{}': {source}", .path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Any failure of a pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config(_) => EXIT_CONFIG,
            PipelineError::Fetch(e) if e.kind.is_transient() => EXIT_TEMPFAIL,
            PipelineError::Fetch(_) => EXIT_FETCH,
            PipelineError::Build(_) => EXIT_BUILD,
            PipelineError::Report(_) | PipelineError::Write(_) => EXIT_IO,
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        PipelineError::from(err).into()
    }
}

fn fmt_opt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" (expected at '{}')", p.display()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_fetch_errors_map_to_tempfail() {
        let err = PipelineError::from(FetchError::new("X", FetchErrorKind::RateLimited, "quota"));
        assert_eq!(err.exit_code(), EXIT_TEMPFAIL);

        let err = PipelineError::from(FetchError::new("X", FetchErrorKind::Auth, "bad key"));
        assert_eq!(err.exit_code(), EXIT_FETCH);
    }

    #[test]
    fn missing_series_message_names_category_and_path() {
        let err = BuildError::MissingSeries {
            category: "Shelter".to_string(),
            series_id: "CUUR0000SAH1".to_string(),
            path: Some(PathBuf::from("data/raw/CUUR0000SAH1.csv")),
        };
        let msg = err.to_string();
        assert!(msg.contains("Shelter"));
        assert!(msg.contains("CUUR0000SAH1"));
        assert!(msg.contains("data/raw/CUUR0000SAH1.csv"));
    }
}
