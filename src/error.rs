//! Error taxonomy for the ETL pipeline.
//!
//! Library modules return [`EtlError`]. Only [`EtlError::Configuration`]
//! stops a run; every other variant is isolated to the product code being
//! processed and ends up in the run summary.
//!
//! Field-level coercion problems (an unparseable grade or nutrient value)
//! are not errors at all: the transformer logs them and drops the field.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Error, Debug)]
pub enum EtlError {
    /// The upstream API has no record for this code.
    #[error("product {0} not found upstream")]
    NotFound(String),

    /// The raw document is missing required structure.
    #[error("malformed record for {code}: {reason}")]
    MalformedInput { code: String, reason: String },

    /// Transport, timeout, or body decoding failure while fetching.
    #[error("fetch failed for {code}: {source}")]
    Fetch {
        code: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream API answered with a non-success status.
    #[error("upstream returned HTTP {status} for {code}")]
    UpstreamStatus { code: String, status: u16 },

    /// Any database failure while reading or writing.
    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Required configuration is missing or still a placeholder.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EtlError {
    /// True for the soft failures that reject a code before any transaction
    /// is opened.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EtlError::NotFound(_)
                | EtlError::MalformedInput { .. }
                | EtlError::Fetch { .. }
                | EtlError::UpstreamStatus { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_soft() {
        assert!(EtlError::NotFound("1".into()).is_rejection());
        assert!(EtlError::MalformedInput {
            code: "1".into(),
            reason: "no product".into()
        }
        .is_rejection());
        assert!(!EtlError::Persistence(sqlx::Error::RowNotFound).is_rejection());
        assert!(!EtlError::Configuration("db.url".into()).is_rejection());
    }

    #[test]
    fn messages_name_the_code() {
        let err = EtlError::UpstreamStatus {
            code: "3017620422003".into(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "upstream returned HTTP 503 for 3017620422003"
        );
    }
}
