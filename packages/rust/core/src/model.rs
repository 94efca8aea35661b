//! Seam between the pipeline and the external structuring model.

use std::time::Duration;

use async_trait::async_trait;
use tenderwatch_shared::EnrichedTender;

use crate::retry::FailureKind;

/// Failure of one call to the external model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// Throttled (HTTP 429 or `RESOURCE_EXHAUSTED`).
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Server-suggested wait, if any.
        retry_after: Option<Duration>,
    },

    /// Network failure or unexpected server error.
    #[error("request failed: {0}")]
    Transient(String),

    /// The model answered with something that is not the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Today's call budget is spent; nothing was sent.
    #[error("daily call quota exhausted ({used}/{limit})")]
    QuotaExhausted { used: u32, limit: u32 },

    /// The call ledger could not be updated; nothing was sent.
    #[error("cannot record call: {0}")]
    LedgerUnavailable(String),
}

impl CallError {
    /// Suggested wait before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimit,
            Self::Transient(_) | Self::InvalidResponse(_) => FailureKind::Generic,
            Self::QuotaExhausted { .. } | Self::LedgerUnavailable(_) => FailureKind::Fatal,
        }
    }
}

/// External model able to turn a raw entry into a structured tender.
#[async_trait]
pub trait StructuringModel: Send + Sync {
    /// Extract the structured fields of one raw feed entry.
    async fn structure(&self, entry: &str) -> Result<EnrichedTender, CallError>;

    /// Write an HTML digest of the final tender list for `period` (`MM/YYYY`).
    async fn summarize(&self, tenders: &[EnrichedTender], period: &str) -> Result<String, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let throttled = CallError::RateLimited {
            message: "429".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(throttled.kind(), FailureKind::RateLimit);
        assert_eq!(throttled.retry_after(), Some(Duration::from_secs(5)));

        assert_eq!(CallError::Transient("reset".into()).kind(), FailureKind::Generic);
        assert_eq!(CallError::InvalidResponse("{".into()).retry_after(), None);
        assert_eq!(
            CallError::QuotaExhausted { used: 1000, limit: 1000 }.kind(),
            FailureKind::Fatal
        );
    }
}
