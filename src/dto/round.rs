//! Payloads accepted by the round action endpoints.

use std::collections::BTreeMap;

use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{dto::validation::validate_group_labels, state::state_machine::PromptSubmission};

/// Prompt chosen by the dasher for the current round.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PromptRequest {
    /// Category of the prompt; the round's category is kept when empty.
    #[serde(default)]
    #[validate(length(max = 64))]
    pub category: String,
    /// Word or phrase players must define.
    #[validate(length(min = 1, max = 64))]
    pub prompt: String,
    /// The true response.
    #[validate(length(min = 1, max = 300))]
    pub response: String,
    /// Whether the dasher wrote the prompt themselves.
    #[serde(default)]
    pub custom: bool,
}

impl From<PromptRequest> for PromptSubmission {
    fn from(value: PromptRequest) -> Self {
        Self {
            category: value.category,
            prompt: value.prompt,
            response: value.response,
            custom: value.custom,
        }
    }
}

/// A player's guess for the current prompt.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GuessRequest {
    /// Free-text guess, normalized before storage.
    #[validate(length(min = 1, max = 1000))]
    pub guess: String,
}

/// Correctness marks keyed by username; unlisted guesses count as wrong.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct MarksRequest {
    /// Whether each guess matches the true response.
    #[serde(default)]
    pub marks: BTreeMap<String, bool>,
}

/// Decoy labels keyed by the username of each wrong guess.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GroupsRequest {
    /// Label of each wrong guess; equal labels merge on the read-out.
    #[validate(custom(function = "validate_group_labels"))]
    pub groups: BTreeMap<String, String>,
}

/// A vote for one of the read-out labels.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct VoteRequest {
    /// Read-out label voted for.
    #[validate(length(min = 1, max = 64))]
    pub label: String,
}

/// Optional aggregated ballots sent by the dasher when closing the vote.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct RevealRequest {
    /// Replaces the stored votes when present.
    #[serde(default)]
    pub votes: Option<BTreeMap<String, String>>,
}
