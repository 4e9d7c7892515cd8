//! SOP rule set definition and loading

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use sop_monitor_core::{InfoCategory, PhaseKind, SpeakerRole};

use crate::ConfigError;

/// Versioned SOP rule set supplied at session start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SopRules {
    /// Version of rules
    pub version: String,
    /// Per-phase criteria, keyed by phase (`greeting`, `problem_identification`, ...)
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseRules>,
    /// Phrases the agent must never use
    #[serde(default)]
    pub prohibited_phrases: Vec<String>,
    /// Extraction rules for required information
    #[serde(default)]
    pub required_info: Vec<InfoRule>,
}

/// Criteria making up one phase
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PhaseRules {
    #[serde(default)]
    pub criteria: Vec<CriterionRule>,
}

/// One atomic testable condition within a phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionRule {
    /// Identifier, unique within the phase
    pub id: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Patterns to match (regex, case-insensitive)
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Satisfied by a reference to the known customer name
    #[serde(default)]
    pub match_customer_name: bool,
}

/// Extraction rule for one required-information category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoRule {
    pub category: InfoCategory,
    #[serde(default)]
    pub description: String,
    /// Patterns to match (regex, case-insensitive)
    pub patterns: Vec<String>,
    /// Only utterances from this speaker count
    #[serde(default)]
    pub speaker: Option<SpeakerRole>,
}

impl SopRules {
    /// Look up the rules for a phase
    pub fn phase(&self, kind: PhaseKind) -> Option<&PhaseRules> {
        self.phases
            .iter()
            .find(|(key, _)| PhaseKind::from_key(key) == Some(kind))
            .map(|(_, rules)| rules)
    }

    /// Validate the rule set
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "version".to_string(),
                message: "SOP version must not be empty".to_string(),
            });
        }

        let mut seen_phases = HashSet::new();
        for key in self.phases.keys() {
            let kind = PhaseKind::from_key(key).ok_or_else(|| ConfigError::InvalidValue {
                field: format!("phases.{}", key),
                message: "unknown phase".to_string(),
            })?;
            if !seen_phases.insert(kind) {
                return Err(ConfigError::InvalidValue {
                    field: format!("phases.{}", key),
                    message: format!("phase '{}' defined twice", kind.key()),
                });
            }
        }

        for kind in PhaseKind::ALL {
            let rules = self
                .phase(kind)
                .ok_or_else(|| ConfigError::MissingPhase(kind.key().to_string()))?;
            validate_phase(kind, rules)?;
        }

        for (i, phrase) in self.prohibited_phrases.iter().enumerate() {
            if phrase.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("prohibited_phrases[{}]", i),
                    message: "phrase must not be empty".to_string(),
                });
            }
        }

        let mut seen_categories = HashSet::new();
        for rule in &self.required_info {
            if !seen_categories.insert(rule.category) {
                return Err(ConfigError::InvalidValue {
                    field: "required_info".to_string(),
                    message: format!("category {:?} defined twice", rule.category),
                });
            }
            if rule.patterns.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("required_info.{:?}", rule.category),
                    message: "at least one pattern is required".to_string(),
                });
            }
            for pattern in &rule.patterns {
                check_pattern(&format!("required_info.{:?}", rule.category), pattern)?;
            }
        }

        Ok(())
    }
}

fn validate_phase(kind: PhaseKind, rules: &PhaseRules) -> Result<(), ConfigError> {
    if rules.criteria.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: format!("phases.{}.criteria", kind.key()),
            message: "a phase needs at least one criterion".to_string(),
        });
    }

    let mut ids = HashSet::new();
    for criterion in &rules.criteria {
        let field = format!("phases.{}.{}", kind.key(), criterion.id);
        if criterion.id.trim().is_empty() || !ids.insert(criterion.id.as_str()) {
            return Err(ConfigError::InvalidValue {
                field,
                message: "criterion ids must be non-empty and unique within a phase".to_string(),
            });
        }
        if criterion.patterns.is_empty() && !criterion.match_customer_name {
            return Err(ConfigError::InvalidValue {
                field,
                message: "criterion has neither patterns nor customer-name matching".to_string(),
            });
        }
        for pattern in &criterion.patterns {
            check_pattern(&field, pattern)?;
        }
    }

    Ok(())
}

fn check_pattern(rule: &str, pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern {
            rule: rule.to_string(),
            message: e.to_string(),
        })
}

impl Default for SopRules {
    fn default() -> Self {
        default_sop()
    }
}

/// Load and validate a rule set, choosing the format by file extension
///
/// - `.toml`: TOML document
/// - `.json`: JSON document
/// - `.md` / `.txt`: legacy outline (`## Section` headings with `- item` lines)
pub fn load_sop(path: impl AsRef<Path>) -> Result<SopRules, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("Failed to read SOP file: {}", e)))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let rules = match extension.as_str() {
        "toml" => toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse SOP file: {}", e)))?,
        "json" => serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse SOP file: {}", e)))?,
        "md" | "txt" => parse_outline(&content),
        other => {
            return Err(ConfigError::ParseError(format!(
                "Unsupported SOP file extension '{}'",
                other
            )))
        }
    };

    rules.validate()?;
    tracing::info!(
        path = %path.display(),
        version = %rules.version,
        prohibited = rules.prohibited_phrases.len(),
        "Loaded SOP rule set"
    );
    Ok(rules)
}

/// Build a rule set from a markdown SOP outline
///
/// The outline only carries prohibited phrases in machine-usable form; phase
/// criteria and extraction patterns come from the built-in rule set. A
/// `## Prohibited Phrases` section replaces the default prohibited list.
pub fn parse_outline(content: &str) -> SopRules {
    let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim_end();
        if let Some(heading) = line.strip_prefix("## ") {
            let key = heading.trim().to_lowercase().replace(' ', "_");
            sections.entry(key.clone()).or_default();
            current = Some(key);
        } else if let Some(item) = line.trim_start().strip_prefix("- ") {
            if let Some(section) = &current {
                let item = item.trim();
                if !item.is_empty() {
                    sections.entry(section.clone()).or_default().push(item.to_string());
                }
            }
        }
    }

    let mut rules = default_sop();
    rules.version = format!("{}+outline", rules.version);

    for (section, items) in sections {
        if section == "prohibited_phrases" {
            rules.prohibited_phrases = items;
        } else {
            tracing::debug!("Ignoring SOP outline section '{}' ({} items)", section, items.len());
        }
    }

    rules
}

fn criterion(id: &str, description: &str, patterns: &[&str]) -> CriterionRule {
    CriterionRule {
        id: id.to_string(),
        description: description.to_string(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        match_customer_name: false,
    }
}

fn info(category: InfoCategory, description: &str, patterns: &[&str]) -> InfoRule {
    InfoRule {
        category,
        description: description.to_string(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        speaker: None,
    }
}

/// Get the built-in customer-service rule set
pub fn default_sop() -> SopRules {
    let mut phases = BTreeMap::new();

    phases.insert(
        PhaseKind::Greeting.key().to_string(),
        PhaseRules {
            criteria: vec![
                criterion(
                    "greeting_token",
                    "Uses an appropriate greeting",
                    &[r"\b(hello|hi|hey|welcome|good (morning|afternoon|evening))\b"],
                ),
                CriterionRule {
                    id: "customer_name".to_string(),
                    description: "Addresses the customer by name".to_string(),
                    patterns: vec![],
                    match_customer_name: true,
                },
                criterion(
                    "offer_help",
                    "Offers to help",
                    &[
                        r"\bhow (can|may|could) (i|we) (help|assist)",
                        r"\bwhat can (i|we) do for you\b",
                        r"\b(happy|glad|here) to help\b",
                    ],
                ),
            ],
        },
    );

    phases.insert(
        PhaseKind::ProblemIdentification.key().to_string(),
        PhaseRules {
            criteria: vec![
                criterion(
                    "request_details",
                    "Asks for specifics about the issue",
                    &[
                        r"\bwhat seems to be\b",
                        r"\bwhat('s| is) the (issue|problem)\b",
                        r"\b(could|can|would) you (please )?(describe|explain|tell me more)\b",
                        r"\b(more|any) details?\b",
                        r"\bin detail\b",
                        r"\bwhat (exactly )?happened\b",
                    ],
                ),
                criterion(
                    "acknowledge_concern",
                    "Acknowledges the customer's stated concern",
                    &[
                        r"\bi (understand|see)\b",
                        r"\bi hear you\b",
                        r"\bsorry to hear\b",
                        r"\bi can see (why|how|that)\b",
                    ],
                ),
                criterion(
                    "empathy",
                    "Expresses empathy",
                    &[
                        r"\b(i'm|i am) (so |very |really |truly )?sorry\b",
                        r"\bi apologi[sz]e\b",
                        r"\bfrustrating\b",
                        r"\bthat must be\b",
                        r"\binconvenience\b",
                    ],
                ),
            ],
        },
    );

    phases.insert(
        PhaseKind::SolutionSteps.key().to_string(),
        PhaseRules {
            criteria: vec![
                criterion(
                    "next_steps",
                    "States the next steps",
                    &[
                        r"\bnext steps?\b",
                        r"\bhere's what\b",
                        r"\b(we'll|we will|i'll|i will) (process|replace|refund|send|arrange|escalate|ship|issue|schedule)\b",
                    ],
                ),
                criterion(
                    "request_information",
                    "Requests the required information",
                    &[
                        r"\bplease provide\b",
                        r"\b(could|can|would) you (please )?(provide|send|share|upload|confirm)\b",
                        r"\border number\b",
                        r"\bphotos?\b",
                        r"\bupload\b",
                    ],
                ),
                criterion(
                    "time_expectation",
                    "Sets an explicit time expectation",
                    &[
                        r"\b(within|in) (the next )?(\d+|a few|one|two|three|four|five|24|48) (business |working )?(minutes?|hours?|days?|weeks?)\b",
                        r"\b\d+\s*(-|to)\s*\d+\s*(business |working )?(hours|days|weeks)\b",
                        r"\bby (tomorrow|(the )?end of (the )?(day|week)|monday|tuesday|wednesday|thursday|friday)\b",
                    ],
                ),
            ],
        },
    );

    phases.insert(
        PhaseKind::Closing.key().to_string(),
        PhaseRules {
            criteria: vec![
                criterion(
                    "summarize_resolution",
                    "Summarizes the resolution",
                    &[
                        r"\bto (confirm|summari[sz]e|recap)\b",
                        r"\bin summary\b",
                        r"\bso we('ve| have) (agreed|arranged)\b",
                    ],
                ),
                criterion(
                    "thank_customer",
                    "Thanks the customer",
                    &[r"\bthank(s| you)\b", r"\bappreciate your (patience|time|call)\b"],
                ),
                criterion(
                    "offer_further_help",
                    "Asks whether further help is needed",
                    &[
                        r"\banything else\b",
                        r"\bany other (questions|concerns|issues)\b",
                        r"\bsomething else (i|we) can\b",
                    ],
                ),
            ],
        },
    );

    SopRules {
        version: "1.0.0".to_string(),
        phases,
        prohibited_phrases: vec![
            "there's nothing i can do".to_string(),
            "that's not my problem".to_string(),
            "that's not my department".to_string(),
            "calm down".to_string(),
            "you should have".to_string(),
            "it's not our fault".to_string(),
            "as i already said".to_string(),
            "i don't know".to_string(),
        ],
        required_info: vec![
            info(
                InfoCategory::OrderNumber,
                "Order number",
                &[
                    r"#\s?\d{4,}\b",
                    r"\border\s+(number|no\.?|id)\s*(is|:)?\s*#?[a-z0-9-]*\d[a-z0-9-]*",
                ],
            ),
            info(
                InfoCategory::ProductDetails,
                "Product model, serial or description",
                &[
                    r"\b(model|serial|sku|item)\s*(number|no\.?|#)?\s*(is|:)?\s*[a-z0-9-]*\d[a-z0-9-]*",
                    r"\bthe (product|item|package) (arrived|is|was|came)\b",
                ],
            ),
            info(
                InfoCategory::IssueDescription,
                "Description of what went wrong",
                &[
                    r"\b(arrived|came|is|was) (damaged|broken|defective|late|missing)\b",
                    r"\b(not working|stopped working|doesn't work|won't turn on)\b",
                    r"\bwrong (item|size|colou?r|product)\b",
                    r"\b(never arrived|didn't arrive|hasn't arrived)\b",
                ],
            ),
            info(
                InfoCategory::ContactInfo,
                "Email address or phone number",
                &[
                    r"\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
                    r"\b(phone|mobile|cell)\b[^.?!]{0,20}?\+?\d[\d\s().-]{7,}\d",
                    r"\+\d[\d\s().-]{8,}\d",
                ],
            ),
        ],
    }
}
