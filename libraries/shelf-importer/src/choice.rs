//! Choice sources
//!
//! The session asks a [`ChoiceSource`] what to do with every task once its
//! candidates are known, and how to handle duplicates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::duplicates::{Duplicates, Resolution};
use crate::ranker::Recommendation;
use crate::task::{Action, ImportTask};
use crate::{ImportError, Result};

/// A decision for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Skip,
    AsIs,
    Tracks,
    Albums,
    /// Apply the best candidate
    Apply,
    /// Apply the candidate at this 1-based rank
    Candidate(usize),
    Retag,
}

/// Decides what happens to each task
#[async_trait]
pub trait ChoiceSource: Send {
    async fn choose_album(&mut self, task: &ImportTask) -> Choice;

    async fn choose_item(&mut self, task: &ImportTask) -> Choice;

    async fn resolve_duplicate(&mut self, task: &ImportTask, duplicates: &Duplicates)
        -> Resolution;
}

/// Set `choice` on `task`
pub(crate) fn apply_choice(task: &mut ImportTask, choice: Choice) -> Result<()> {
    match choice {
        Choice::Skip => task.set_choice(Action::Skip),
        Choice::AsIs => task.set_choice(Action::AsIs),
        Choice::Tracks => task.set_choice(Action::Tracks),
        Choice::Albums => task.set_choice(Action::Albums),
        Choice::Retag => task.set_choice(Action::Retag),
        Choice::Candidate(rank) => task.choose_candidate(rank),
        Choice::Apply => {
            if task.candidates.is_empty() {
                return Err(ImportError::InvalidChoice(
                    "no candidate to apply".to_string(),
                ));
            }
            task.choose_candidate(1)
        }
    }
}

/// Replays a fixed list of decisions, then falls back to defaults
#[derive(Debug, Clone)]
pub struct ScriptedChoices {
    choices: VecDeque<Choice>,
    default: Choice,
    resolutions: VecDeque<Resolution>,
    default_resolution: Resolution,
}

impl ScriptedChoices {
    pub fn new(default: Choice) -> Self {
        Self {
            choices: VecDeque::new(),
            default,
            resolutions: VecDeque::new(),
            default_resolution: Resolution::Skip,
        }
    }

    /// Queue choices, used in order
    pub fn with_choices(mut self, choices: impl IntoIterator<Item = Choice>) -> Self {
        self.choices.extend(choices);
        self
    }

    /// Resolution used once queued resolutions run out
    pub fn with_duplicate_default(mut self, resolution: Resolution) -> Self {
        self.default_resolution = resolution;
        self
    }

    /// Queue duplicate resolutions, used in order
    pub fn with_resolutions(mut self, resolutions: impl IntoIterator<Item = Resolution>) -> Self {
        self.resolutions.extend(resolutions);
        self
    }

    fn next_choice(&mut self) -> Choice {
        self.choices.pop_front().unwrap_or(self.default)
    }
}

#[async_trait]
impl ChoiceSource for ScriptedChoices {
    async fn choose_album(&mut self, _task: &ImportTask) -> Choice {
        self.next_choice()
    }

    async fn choose_item(&mut self, _task: &ImportTask) -> Choice {
        self.next_choice()
    }

    async fn resolve_duplicate(
        &mut self,
        _task: &ImportTask,
        _duplicates: &Duplicates,
    ) -> Resolution {
        self.resolutions
            .pop_front()
            .unwrap_or(self.default_resolution)
    }
}

/// Non-interactive decisions
///
/// Applies the best candidate when the recommendation is strong, otherwise
/// uses the fallback.
#[derive(Debug, Clone)]
pub struct AutoChoices {
    fallback: Choice,
    duplicate_action: Resolution,
}

impl AutoChoices {
    pub fn new(fallback: Choice, duplicate_action: Resolution) -> Self {
        Self {
            fallback,
            duplicate_action,
        }
    }

    fn decide(&self, task: &ImportTask) -> Choice {
        if task.recommendation == Recommendation::Strong {
            Choice::Apply
        } else {
            self.fallback
        }
    }
}

impl Default for AutoChoices {
    fn default() -> Self {
        Self::new(Choice::Skip, Resolution::Skip)
    }
}

#[async_trait]
impl ChoiceSource for AutoChoices {
    async fn choose_album(&mut self, task: &ImportTask) -> Choice {
        self.decide(task)
    }

    async fn choose_item(&mut self, task: &ImportTask) -> Choice {
        self.decide(task)
    }

    async fn resolve_duplicate(
        &mut self,
        _task: &ImportTask,
        _duplicates: &Duplicates,
    ) -> Resolution {
        self.duplicate_action
    }
}
