//! Pipeline stages, run states, and outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Authenticate,
    ResolveVersion,
    PublishRelease,
    PublishImage,
    Deploy,
}

impl Stage {
    /// Short stage label used in events, logs, and failure output.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Authenticate => "auth",
            Stage::ResolveVersion => "version",
            Stage::PublishRelease => "release",
            Stage::PublishImage => "image",
            Stage::Deploy => "deploy",
        }
    }

    /// All stages, in the order a run traverses them.
    pub fn all() -> [Stage; 5] {
        [
            Stage::Authenticate,
            Stage::ResolveVersion,
            Stage::PublishRelease,
            Stage::PublishImage,
            Stage::Deploy,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Observable state of a pipeline run.
///
/// A run advances through the states strictly in order; there is no
/// re-entry and no skipping. `Failed` is reachable from every
/// non-terminal state and, like `Succeeded`, admits no successor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Authenticating,
    VersionResolved,
    Released,
    ImagePublished,
    Deployed,
    Succeeded,
    Failed { stage: Stage, cause: String },
}

impl RunState {
    /// Whether `next` is a legal successor of this state.
    pub fn admits(&self, next: &RunState) -> bool {
        use RunState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Idle, Authenticating)
                | (Authenticating, VersionResolved)
                | (VersionResolved, Released)
                | (Released, ImagePublished)
                | (ImagePublished, Deployed)
                | (Deployed, Succeeded)
                | (_, Failed { .. })
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed { .. })
    }

    /// Short state label for logs and events.
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Authenticating => "authenticating",
            RunState::VersionResolved => "version-resolved",
            RunState::Released => "released",
            RunState::ImagePublished => "image-published",
            RunState::Deployed => "deployed",
            RunState::Succeeded => "succeeded",
            RunState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal outcome of a run.
#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    Failed { stage: Stage, error: Error },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}
