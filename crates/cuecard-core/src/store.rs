//! Prompt store: the id -> prompt mapping a scheduler owns.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::model::{Prompt, PromptData, PromptId, PromptPatch};

/// What `add` does when an incoming prompt reuses an id already stored.
///
/// Duplicates inside one batch are always rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddConflict {
    /// Fail with `DuplicateIdentifier`; nothing is inserted.
    #[default]
    Reject,
    /// Keep the stored prompt and drop the incoming one.
    KeepExisting,
    /// Overwrite the stored prompt with the incoming one.
    Replace,
}

impl fmt::Display for AddConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddConflict::Reject => write!(f, "reject"),
            AddConflict::KeepExisting => write!(f, "keep-existing"),
            AddConflict::Replace => write!(f, "replace"),
        }
    }
}

impl FromStr for AddConflict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(AddConflict::Reject),
            "keep-existing" | "keep" => Ok(AddConflict::KeepExisting),
            "replace" => Ok(AddConflict::Replace),
            other => Err(format!("unknown add-conflict policy: {other}")),
        }
    }
}

/// Mapping from prompt id to prompt. Ids are unique by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
#[serde(bound(
    serialize = "D: Serialize",
    deserialize = "D: serde::de::DeserializeOwned"
))]
pub struct PromptStore<D> {
    prompts: BTreeMap<PromptId, Prompt<D>>,
}

impl<D> Default for PromptStore<D> {
    fn default() -> Self {
        Self {
            prompts: BTreeMap::new(),
        }
    }
}

impl<D: PromptData> PromptStore<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a batch, rejecting duplicate ids.
    pub fn from_prompts(prompts: Vec<Prompt<D>>) -> Result<Self, ScheduleError> {
        let mut store = Self::new();
        store.add(prompts, AddConflict::Reject)?;
        Ok(store)
    }

    /// Insert a batch of prompts. Returns how many entries were written.
    ///
    /// All-or-nothing: on error the store is unchanged.
    pub fn add(
        &mut self,
        prompts: Vec<Prompt<D>>,
        on_conflict: AddConflict,
    ) -> Result<usize, ScheduleError> {
        let mut seen = HashSet::with_capacity(prompts.len());
        for prompt in &prompts {
            if !seen.insert(prompt.id.as_str()) {
                return Err(ScheduleError::DuplicateIdentifier {
                    id: prompt.id.clone(),
                });
            }
            if on_conflict == AddConflict::Reject && self.prompts.contains_key(&prompt.id) {
                return Err(ScheduleError::DuplicateIdentifier {
                    id: prompt.id.clone(),
                });
            }
        }

        let mut written = 0;
        for prompt in prompts {
            if on_conflict == AddConflict::KeepExisting && self.prompts.contains_key(&prompt.id) {
                tracing::warn!(id = %prompt.id, "prompt already stored, keeping existing entry");
                continue;
            }
            self.prompts.insert(prompt.id.clone(), prompt);
            written += 1;
        }
        Ok(written)
    }

    /// Shallow-merge each patch over the prompt with the same id. Unknown
    /// ids are ignored. Returns how many prompts changed.
    ///
    /// All patches are merged before any is committed, so a failing patch
    /// leaves the store unchanged.
    pub fn update(&mut self, patches: &[PromptPatch]) -> Result<usize, ScheduleError> {
        let mut staged: BTreeMap<PromptId, Prompt<D>> = BTreeMap::new();
        for patch in patches {
            // Later patches for the same id build on earlier ones.
            let Some(current) = staged
                .get(&patch.id)
                .or_else(|| self.prompts.get(&patch.id))
            else {
                tracing::debug!(id = %patch.id, "ignoring update for unknown prompt");
                continue;
            };
            let merged = patch
                .apply(current)
                .map_err(|source| ScheduleError::InvalidPatch {
                    id: patch.id.clone(),
                    source,
                })?;
            staged.insert(patch.id.clone(), merged);
        }

        let changed = staged.len();
        self.prompts.extend(staged);
        Ok(changed)
    }

    /// Remove prompts by id. Unknown ids are ignored. Returns how many were removed.
    pub fn remove(&mut self, ids: &[PromptId]) -> usize {
        ids.iter()
            .filter(|id| self.prompts.remove(id.as_str()).is_some())
            .count()
    }

    /// Replace (or insert) a single prompt under its own id.
    pub fn put(&mut self, prompt: Prompt<D>) {
        self.prompts.insert(prompt.id.clone(), prompt);
    }
}

impl<D> PromptStore<D> {
    pub fn get(&self, id: &str) -> Option<&Prompt<D>> {
        self.prompts.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.prompts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Prompts in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Prompt<D>> {
        self.prompts.values()
    }

    pub fn into_prompts(self) -> Vec<Prompt<D>> {
        self.prompts.into_values().collect()
    }
}
