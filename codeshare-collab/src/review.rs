//! Code-review collaborator seam.
//!
//! Reviews come from an external text service. The room only needs
//! `review(source) -> text`; deployments plug their client in behind
//! [`Reviewer`].

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("no review service configured")]
    Unavailable,
    #[error("review failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, source: &str) -> Result<String, ReviewError>;
}

/// Reviewer used when no service is configured. Every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledReviewer;

#[async_trait]
impl Reviewer for DisabledReviewer {
    async fn review(&self, _source: &str) -> Result<String, ReviewError> {
        Err(ReviewError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_reviewer_fails() {
        let err = DisabledReviewer.review("print(1)").await.unwrap_err();
        assert_eq!(err, ReviewError::Unavailable);
    }
}
