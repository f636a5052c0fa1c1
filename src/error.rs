//! Error type shared by record sources, the bucketer and the aggregator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FitError>;

#[derive(Debug, Error)]
pub enum FitError {
    /// Archive missing or corrupt, or remote endpoint unreachable/unauthorized.
    #[error("source unavailable: {source_name}: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// Every record read from the source failed to parse.
    #[error("all {skipped} records from {source_name} are malformed")]
    MalformedRecord { source_name: String, skipped: usize },

    #[error("unsupported time unit '{0}' (expected one of Weekday, Hour, Asis, Day, Week, Month, Year)")]
    UnsupportedUnit(String),

    #[error("unsupported reduction '{0}' (expected one of count, mean, sum, median, min, max, std, first)")]
    UnsupportedReduction(String),

    #[error("no such variable name: {field} (known: {known})")]
    UnknownField { field: String, known: String },

    #[error("unknown activity '{0}'")]
    UnknownActivity(String),

    #[error("date is in incorrect format: {0}. Please use YYYY-MM-DD or DD-MM-YYYY")]
    InvalidDate(String),

    #[error("wrong label '{0}', has to be one of Left, Right, Center")]
    InvalidLabel(String),

    #[error("unknown weather provider '{0}'")]
    UnknownService(String),

    #[error("missing credentials: environment variable {0} is not set")]
    MissingCredentials(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FitError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        FitError::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_unit_names_the_unit() {
        let err = FitError::UnsupportedUnit("Fortnight".to_string());
        assert!(err.to_string().contains("Fortnight"));
    }

    #[test]
    fn test_unavailable_helper() {
        let err = FitError::unavailable("takeout.zip", "No such file");
        match err {
            FitError::SourceUnavailable { source_name, reason } => {
                assert_eq!(source_name, "takeout.zip");
                assert_eq!(reason, "No such file");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
