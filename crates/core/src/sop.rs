//! SOP vocabulary: phases and required-information categories

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named stage of the standard operating procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// Opening of the call
    Greeting,
    /// Understanding the customer's issue
    ProblemIdentification,
    /// Agreeing on what happens next
    SolutionSteps,
    /// Wrapping up the conversation
    Closing,
}

impl PhaseKind {
    /// All phases in SOP order
    pub const ALL: [PhaseKind; 4] = [
        PhaseKind::Greeting,
        PhaseKind::ProblemIdentification,
        PhaseKind::SolutionSteps,
        PhaseKind::Closing,
    ];

    /// Key used in SOP documents
    pub fn key(&self) -> &'static str {
        match self {
            PhaseKind::Greeting => "greeting",
            PhaseKind::ProblemIdentification => "problem_identification",
            PhaseKind::SolutionSteps => "solution_steps",
            PhaseKind::Closing => "closing",
        }
    }

    /// Get phase display name
    pub fn display_name(&self) -> &'static str {
        match self {
            PhaseKind::Greeting => "Greeting",
            PhaseKind::ProblemIdentification => "Problem Identification",
            PhaseKind::SolutionSteps => "Solution Steps",
            PhaseKind::Closing => "Closing",
        }
    }

    /// Parse a document key, tolerating `-`, spaces and case differences
    /// as well as the `*_protocol` section names of older SOP outlines.
    pub fn from_key(key: &str) -> Option<PhaseKind> {
        let normalized = key.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "greeting" | "greeting_protocol" => Some(PhaseKind::Greeting),
            "problem_identification" => Some(PhaseKind::ProblemIdentification),
            "solution_steps" => Some(PhaseKind::SolutionSteps),
            "closing" | "closing_protocol" => Some(PhaseKind::Closing),
            _ => None,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Information the agent is expected to collect during the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfoCategory {
    OrderNumber,
    ProductDetails,
    IssueDescription,
    ContactInfo,
}

impl InfoCategory {
    pub const ALL: [InfoCategory; 4] = [
        InfoCategory::OrderNumber,
        InfoCategory::ProductDetails,
        InfoCategory::IssueDescription,
        InfoCategory::ContactInfo,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            InfoCategory::OrderNumber => "Order number",
            InfoCategory::ProductDetails => "Product details",
            InfoCategory::IssueDescription => "Issue description",
            InfoCategory::ContactInfo => "Contact information",
        }
    }
}

impl fmt::Display for InfoCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
