//! Core data model types for cuecard.
//!
//! A prompt is a host-defined payload extended with an id and the date it
//! next becomes eligible for review.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque prompt identifier, stable for the prompt's lifetime.
pub type PromptId = String;

/// Bounds every host payload type has to satisfy.
///
/// Payloads are serialized flattened next to `id` and `next_review_date`,
/// so they must serialize as a map (a struct with named fields).
pub trait PromptData: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> PromptData for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A reviewable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt<D> {
    /// Unique identifier.
    pub id: PromptId,
    /// Earliest date the prompt becomes eligible for review.
    pub next_review_date: DateTime<Utc>,
    /// Host payload.
    #[serde(flatten)]
    pub data: D,
}

impl<D> Prompt<D> {
    pub fn new(id: impl Into<PromptId>, next_review_date: DateTime<Utc>, data: D) -> Self {
        Self {
            id: id.into(),
            next_review_date,
            data,
        }
    }
}

/// A partial prompt record keyed by id.
///
/// Fields are named as they appear in the serialized prompt, so a patch can
/// touch `next_review_date` as well as any payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPatch {
    pub id: PromptId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PromptPatch {
    pub fn new(id: impl Into<PromptId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Set a single field.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Set `next_review_date`.
    pub fn next_review_date(self, date: DateTime<Utc>) -> Self {
        let value = date.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        self.set("next_review_date", value)
    }

    /// Shallow-merge the patch over `prompt`. The id is never changed.
    pub(crate) fn apply<D: PromptData>(
        &self,
        prompt: &Prompt<D>,
    ) -> Result<Prompt<D>, serde_json::Error> {
        let mut record = match serde_json::to_value(prompt)? {
            Value::Object(map) => map,
            other => return serde_json::from_value(other),
        };

        for (field, value) in &self.fields {
            if field == "id" {
                continue;
            }
            record.insert(field.clone(), value.clone());
        }

        serde_json::from_value(Value::Object(record))
    }
}

/// Timing data handed to the answer policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerStatistics {
    /// Milliseconds between the prompt becoming current and its answer
    /// being processed.
    pub time_ms: u64,
}
