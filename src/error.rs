use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the incident table or serving a dashboard request.
///
/// Load-time variants are fatal at start-up. `InvalidRange`, `InvalidRequest`
/// and `Division` are local to one request and never touch the record store.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("cannot read incident table '{path}': {reason}")]
    DataLoad { path: PathBuf, reason: String },
    #[error("incident table is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },
    #[error("incident table has no rows")]
    EmptyDataset,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("invalid {field} range: min {min} > max {max}")]
    InvalidRange {
        field: &'static str,
        min: String,
        max: String,
    },
    #[error("cannot compute percentage of an empty total")]
    Division,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DashboardError {
    /// True for errors that mean the table could not be loaded at all.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::DataLoad { .. }
                | Self::MissingColumns(_)
                | Self::MalformedRow { .. }
                | Self::EmptyDataset
                | Self::Io(_)
                | Self::Csv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_errors_are_classified() {
        assert!(DashboardError::EmptyDataset.is_load_error());
        assert!(DashboardError::MissingColumns(vec!["State".into()]).is_load_error());
        assert!(!DashboardError::Division.is_load_error());
        let err = DashboardError::InvalidRange {
            field: "year",
            min: "2000".into(),
            max: "1990".into(),
        };
        assert!(!err.is_load_error());
    }

    #[test]
    fn test_missing_columns_message_lists_names() {
        let err = DashboardError::MissingColumns(vec!["State".into(), "Latitude".into()]);
        assert_eq!(
            err.to_string(),
            "incident table is missing required columns: State, Latitude"
        );
    }
}
