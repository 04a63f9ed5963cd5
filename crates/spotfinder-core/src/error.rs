use thiserror::Error;

use crate::model::SourceKind;

/// Failures the core absorbs instead of surfacing.
///
/// Every catch site in the fetch, parse and generation paths maps to exactly one
/// variant; the variant is logged and the caller receives an empty or
/// best-effort result.
#[derive(Debug, Error)]
pub enum DegradedError {
    /// A whole upstream fetch failed or timed out.
    #[error("{source_kind} source unavailable: {reason}")]
    SourceUnavailable {
        source_kind: SourceKind,
        reason: String,
    },
    /// A single record inside an otherwise usable batch could not be parsed.
    #[error("dropped malformed {source_kind} record `{record}`: {reason}")]
    MalformedRecord {
        source_kind: SourceKind,
        record: String,
        reason: String,
    },
    /// The text generator errored, timed out, or produced no usable JSON.
    #[error("text generation failed: {reason}")]
    GenerationFailure { reason: String },
}

impl DegradedError {
    pub fn source_unavailable(source_kind: SourceKind, err: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_kind,
            reason: format!("{err:#}"),
        }
    }

    pub fn malformed(
        source_kind: SourceKind,
        record: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedRecord {
            source_kind,
            record: record.into(),
            reason: reason.into(),
        }
    }

    pub fn generation(reason: impl std::fmt::Display) -> Self {
        Self::GenerationFailure {
            reason: format!("{reason:#}"),
        }
    }

    /// Emit the degradation through `tracing` at warn level.
    pub fn log(&self) {
        match self {
            Self::SourceUnavailable { source_kind, .. } => {
                tracing::warn!(source = %source_kind, kind = "source_unavailable", "{self}")
            }
            Self::MalformedRecord { source_kind, .. } => {
                tracing::warn!(source = %source_kind, kind = "malformed_record", "{self}")
            }
            Self::GenerationFailure { .. } => {
                tracing::warn!(kind = "generation_failure", "{self}")
            }
        }
    }
}
