//! Single-pass execution of the release pipeline.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use shipit_core::broker::CredentialBroker;
use shipit_core::deploy::Deployer;
use shipit_core::image::ImagePublisher;
use shipit_core::pipeline::{Outcome, RunState, Stage};
use shipit_core::release::ReleaseHost;
use shipit_core::version::{VersionMarker, read_marker};
use shipit_core::{Error, Result, RunId};

use crate::plan::RunPlan;

/// Cooperative cancellation flag, observed at stage boundaries only.
///
/// A cancelled run never interrupts the stage in flight: that stage
/// finishes, and the run refuses to enter the next one.
#[derive(Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Event emitted while a run executes.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted { stage: Stage },
    StageCompleted { stage: Stage, success: bool },
    RunCompleted { success: bool },
}

/// One recorded state change and the instant it happened.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: RunState,
    pub at: DateTime<Utc>,
}

/// Final account of a run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    /// Resolved version, when the run got that far.
    pub version: Option<VersionMarker>,
    pub outcome: Outcome,
    /// Every state the run passed through, in order.
    pub transitions: Vec<Transition>,
}

/// Drives one release through the five stages, in order, exactly once.
///
/// There are no retries at this level: a stage error ends the run, and
/// a finished run (either terminal state) cannot be restarted.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    broker: Arc<dyn CredentialBroker>,
    releases: Arc<dyn ReleaseHost>,
    images: Arc<dyn ImagePublisher>,
    deployer: Arc<dyn Deployer>,
}

impl PipelineOrchestrator {
    pub fn new(
        broker: Arc<dyn CredentialBroker>,
        releases: Arc<dyn ReleaseHost>,
        images: Arc<dyn ImagePublisher>,
        deployer: Arc<dyn Deployer>,
    ) -> Self {
        Self {
            broker,
            releases,
            images,
            deployer,
        }
    }

    /// Start a run, returning its event stream and a handle to the report.
    pub fn execute(
        &self,
        plan: RunPlan,
        cancel: CancelSignal,
    ) -> (mpsc::Receiver<PipelineEvent>, JoinHandle<RunReport>) {
        let (tx, rx) = mpsc::channel(100);
        let runner = self.clone();

        let handle = tokio::spawn(async move { runner.run(plan, cancel, tx).await });

        (rx, handle)
    }

    async fn run(
        &self,
        plan: RunPlan,
        cancel: CancelSignal,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> RunReport {
        let run_id = RunId::new();
        let mut state = RunState::Idle;
        let mut transitions = Vec::new();
        let mut version = None;

        info!(run_id = %run_id, commit = %plan.commit, "run starting");

        let outcome = match self
            .run_stages(&plan, &cancel, &tx, &mut state, &mut transitions, &mut version)
            .await
        {
            Ok(()) => Outcome::Succeeded,
            Err((stage, error)) => {
                error!(run_id = %run_id, stage = %stage, error = %error, "run failed");
                let failed = RunState::Failed {
                    stage,
                    cause: error.to_string(),
                };
                // Failure is admitted from every non-terminal state.
                let _ = Self::transition(&mut state, failed, &mut transitions);
                Outcome::Failed { stage, error }
            }
        };

        let success = outcome.is_success();
        let _ = tx.send(PipelineEvent::RunCompleted { success }).await;
        if success {
            info!(run_id = %run_id, "run succeeded");
        }

        RunReport {
            run_id,
            version,
            outcome,
            transitions,
        }
    }

    async fn run_stages(
        &self,
        plan: &RunPlan,
        cancel: &CancelSignal,
        tx: &mpsc::Sender<PipelineEvent>,
        state: &mut RunState,
        transitions: &mut Vec<Transition>,
        version: &mut Option<VersionMarker>,
    ) -> std::result::Result<(), (Stage, Error)> {
        Self::boundary(cancel, Stage::Authenticate)?;
        Self::transition(state, RunState::Authenticating, transitions)
            .map_err(|e| (Stage::Authenticate, e))?;
        let token =
            Self::run_stage(tx, Stage::Authenticate, self.broker.installation_token()).await?;

        Self::boundary(cancel, Stage::ResolveVersion)?;
        let resolved = Self::run_stage(tx, Stage::ResolveVersion, async {
            read_marker(&plan.marker_path)
        })
        .await?;
        Self::transition(state, RunState::VersionResolved, transitions)
            .map_err(|e| (Stage::ResolveVersion, e))?;
        info!(version = %resolved, "version resolved");
        *version = Some(resolved.clone());

        Self::boundary(cancel, Stage::PublishRelease)?;
        let request = plan.release_request(&resolved);
        let record = Self::run_stage(
            tx,
            Stage::PublishRelease,
            self.releases.publish(&token, &request),
        )
        .await?;
        Self::transition(state, RunState::Released, transitions)
            .map_err(|e| (Stage::PublishRelease, e))?;
        debug!(release_id = record.id, "release recorded");

        Self::boundary(cancel, Stage::PublishImage)?;
        let spec = plan.build_spec(&resolved);
        let published = Self::run_stage(tx, Stage::PublishImage, self.images.publish(&spec)).await?;
        Self::transition(state, RunState::ImagePublished, transitions)
            .map_err(|e| (Stage::PublishImage, e))?;

        Self::boundary(cancel, Stage::Deploy)?;
        let rollout = plan.deployment_request(published.by_commit());
        let receipt = Self::run_stage(tx, Stage::Deploy, self.deployer.roll_out(&rollout)).await?;
        Self::transition(state, RunState::Deployed, transitions)
            .map_err(|e| (Stage::Deploy, e))?;
        debug!(status = %receipt.status, "rollout accepted");

        Self::transition(state, RunState::Succeeded, transitions)
            .map_err(|e| (Stage::Deploy, e))?;
        Ok(())
    }

    /// Refuse to enter `next` once cancellation has been observed.
    fn boundary(cancel: &CancelSignal, next: Stage) -> std::result::Result<(), (Stage, Error)> {
        if cancel.is_cancelled() {
            info!(stage = %next, "cancellation observed at stage boundary");
            return Err((next, Error::Cancelled));
        }
        Ok(())
    }

    /// Run one stage, pairing its started/completed events around the work.
    async fn run_stage<T>(
        tx: &mpsc::Sender<PipelineEvent>,
        stage: Stage,
        work: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, (Stage, Error)> {
        info!(stage = %stage, "stage started");
        let _ = tx.send(PipelineEvent::StageStarted { stage }).await;

        match work.await {
            Ok(value) => {
                info!(stage = %stage, "stage completed");
                let _ = tx
                    .send(PipelineEvent::StageCompleted {
                        stage,
                        success: true,
                    })
                    .await;
                Ok(value)
            }
            Err(error) => {
                let _ = tx
                    .send(PipelineEvent::StageCompleted {
                        stage,
                        success: false,
                    })
                    .await;
                Err((stage, error))
            }
        }
    }

    /// Sole mutation point for the run state; refuses illegal edges.
    fn transition(
        state: &mut RunState,
        next: RunState,
        transitions: &mut Vec<Transition>,
    ) -> Result<()> {
        if !state.admits(&next) {
            return Err(Error::Internal(format!(
                "illegal state transition: {state} does not admit {next}"
            )));
        }
        debug!(from = %state, to = %next, "state transition");
        *state = next.clone();
        transitions.push(Transition {
            state: next,
            at: Utc::now(),
        });
        Ok(())
    }
}
