//! Collaborator traits
//!
//! The engine trusts its upstream collaborators and reaches them only through
//! these narrow interfaces:
//!
//! ```text
//!   - SentimentAnnotator: Text → optional sentiment label/confidence
//!   - CustomerIdentity:   Session → known customer name, if any
//! ```

use async_trait::async_trait;

use crate::{Result, Sentiment};

/// Attaches sentiment to utterance text before ingestion
#[async_trait]
pub trait SentimentAnnotator: Send + Sync {
    /// Annotate a piece of text; `None` means no opinion and the utterance is
    /// ingested without sentiment.
    async fn annotate(&self, text: &str) -> Result<Option<Sentiment>>;

    /// Annotator name for logging
    fn name(&self) -> &str;
}

/// Annotator that never produces sentiment
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnnotator;

#[async_trait]
impl SentimentAnnotator for NoopAnnotator {
    async fn annotate(&self, _text: &str) -> Result<Option<Sentiment>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Supplies the known customer name consumed by the greeting rule
pub trait CustomerIdentity: Send + Sync {
    fn customer_name(&self) -> Option<String>;
}

/// Customer whose name is known up front
#[derive(Debug, Clone)]
pub struct KnownCustomer(pub String);

impl CustomerIdentity for KnownCustomer {
    fn customer_name(&self) -> Option<String> {
        let name = self.0.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// No identity provider available
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousCustomer;

impl CustomerIdentity for AnonymousCustomer {
    fn customer_name(&self) -> Option<String> {
        None
    }
}
