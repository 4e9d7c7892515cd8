//! Core traits and types for the SOP compliance monitor
//!
//! This crate provides foundational types used across all other crates:
//! - Utterance and speaker types
//! - Sentiment annotations
//! - SOP phase and required-information vocabularies
//! - Error types
//! - Collaborator traits (sentiment annotation, customer identity)

pub mod error;
pub mod sop;
pub mod traits;
pub mod utterance;

pub use error::{Error, Result};
pub use sop::{InfoCategory, PhaseKind};
pub use traits::{AnonymousCustomer, CustomerIdentity, KnownCustomer, NoopAnnotator, SentimentAnnotator};
pub use utterance::{
    Sentiment, SentimentLabel, SpeakerRole, TranscriptEntry, Utterance, UtteranceRef,
};
