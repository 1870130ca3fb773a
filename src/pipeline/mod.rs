//! # Pipeline Driver
//!
//! Drives one step's pipeline through `Idle → SourceFetch → Plan →
//! WaitApproval → Apply → (Succeeded | Failed | Stopped | Superseded)`.
//! Polling is the driver's own responsibility (fixed 10 s interval, via
//! `get_state`); `Pipeline::wait` is used only for the final run-to-
//! terminal once a verdict (auto or human) has been recorded.

pub mod planparse;

pub use planparse::{ArgoCdPlanParser, PlanParser, TerraformPlanParser};

use crate::errors::{CoreError, CoreResult};
use crate::model::{ApprovePolicy, PipelineChangeSummary, Step};
use crate::ports::{ApprovalVerdict, Builder, LogStream, Notifier, Pipeline, PipelineState, ProjectSpec};
use crate::resolver::StepDecision;
use std::time::Duration;
use tokio::sync::watch;

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const SCRAPE_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const SCRAPE_MAX_BACKOFF: Duration = Duration::from_secs(8);
const SCRAPE_MAX_ATTEMPTS: u32 = 12;

fn is_terminal(state: PipelineState) -> bool {
    matches!(
        state,
        PipelineState::Succeeded | PipelineState::Failed | PipelineState::Stopped | PipelineState::Superseded
    )
}

pub struct PipelineDriver<'a> {
    builder: &'a dyn Builder,
    pipeline: &'a dyn Pipeline,
    notifier: &'a dyn Notifier,
    cancel: watch::Receiver<bool>,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(builder: &'a dyn Builder, pipeline: &'a dyn Pipeline, notifier: &'a dyn Notifier, cancel: watch::Receiver<bool>) -> Self {
        Self { builder, pipeline, notifier, cancel }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Creates the project and its apply/destroy pipelines on first run,
    /// or refreshes only the action environment on subsequent runs — the
    /// source and approval stage definitions are left untouched either
    /// way, and only when the environment actually changed.
    pub async fn ensure_pipeline(&self, step: &str, project_spec: &ProjectSpec) -> CoreResult<()> {
        match self.builder.get_project(&project_spec.name).await? {
            Some(existing) => {
                if existing.environment != project_spec.environment {
                    self.builder.update_project(project_spec).await?;
                    self.pipeline.update_pipeline(step, project_spec).await?;
                }
            }
            None => {
                self.builder.create_project(project_spec).await?;
                self.pipeline.create_apply_pipeline(step, project_spec).await?;
                self.pipeline.create_destroy_pipeline(step, project_spec).await?;
                for stage in ["Destroy", "WaitApproval", "ApplyDestroy"] {
                    self.pipeline.disable_stage_transition(step, stage).await?;
                }
            }
        }
        Ok(())
    }

    /// Runs one step to completion against an execution the caller has
    /// already started: scrape the plan, gate on approval, wait for the
    /// apply leg. Returns `Ok(())` only for a successful apply or a no-op
    /// plan; every other terminal state maps onto a step-scoped
    /// `CoreError`.
    ///
    /// `previous_execution`, when set, names an execution for this same
    /// step that a prior tick left in flight (typically cancelled or
    /// crashed mid-`WaitApproval`). Once the new execution reaches
    /// `Plan`, that stale execution is stopped with reason "new pipeline
    /// execution started" if it's still waiting on approval — this is
    /// the only way two live executions for the same step can coexist,
    /// since ticks otherwise drive one step at a time.
    pub async fn run_step(
        &self,
        step: &Step,
        decision: &StepDecision,
        execution_id: &str,
        previous_execution: Option<&str>,
        log_stream: &mut dyn LogStream,
        plan_parser: &dyn PlanParser,
        approval_link: &str,
    ) -> CoreResult<()> {
        let reached = self.poll_until(&step.name, execution_id, &[PipelineState::Plan]).await?;
        self.supersede_stale_execution(&step.name, execution_id, previous_execution).await?;
        if is_terminal(reached) {
            return self.terminal_result(step, reached);
        }

        let summary = self.scrape_plan_output(&step.name, log_stream, plan_parser).await?;
        self.notifier.step_state("plan complete", &step.name).await.ok();

        if step.approve == ApprovePolicy::Reject {
            self.pipeline.stop(&step.name, execution_id, "Rejected").await?;
            return Err(CoreError::PipelineRejected { step: step.name.clone() });
        }

        if summary.no_changes() {
            let final_state = self.pipeline.wait(&step.name, execution_id).await?;
            return self.terminal_result(step, final_state);
        }

        let auto_approve = self.auto_approves(step.approve, &summary, decision);
        if auto_approve {
            self.pipeline.approve(&step.name, execution_id, ApprovalVerdict::Approved).await?;
        } else {
            self.notifier.manual_approval(&step.name, &summary, approval_link).await.ok();
            self.await_human_verdict(&step.name, execution_id).await?;
        }

        let final_state = self.pipeline.wait(&step.name, execution_id).await?;
        self.terminal_result(step, final_state)
    }

    /// Stops `previous_execution` if it's a different, still-pending
    /// execution for the same step: a new execution entering `Plan` while
    /// an older one is still in `WaitApproval` means the older one is
    /// stale and must not be allowed to apply.
    async fn supersede_stale_execution(&self, step: &str, execution_id: &str, previous_execution: Option<&str>) -> CoreResult<()> {
        let Some(previous) = previous_execution else {
            return Ok(());
        };
        if previous == execution_id {
            return Ok(());
        }
        if self.pipeline.get_state(step, previous).await? == PipelineState::WaitApproval {
            self.pipeline.stop(step, previous, "new pipeline execution started").await?;
        }
        Ok(())
    }

    /// `approve ∈ {force}` OR `(destroyed = 0 ∧ (changed = 0 ∨ auto_approve))`.
    fn auto_approves(&self, policy: ApprovePolicy, summary: &PipelineChangeSummary, decision: &StepDecision) -> bool {
        policy == ApprovePolicy::Force || (summary.destroyed == 0 && (summary.changed == 0 || decision.auto_approve()))
    }

    fn terminal_result(&self, step: &Step, state: PipelineState) -> CoreResult<()> {
        match state {
            PipelineState::Succeeded => Ok(()),
            PipelineState::Stopped => Err(CoreError::PipelineStopped {
                step: step.name.clone(),
                reason: "pipeline execution stopped".to_string(),
            }),
            PipelineState::Superseded => Err(CoreError::PipelineSuperseded { step: step.name.clone() }),
            PipelineState::Failed => Err(CoreError::PipelineFailed {
                step: step.name.clone(),
                cause: "pipeline action reported failure".to_string(),
            }),
            other => Err(CoreError::PipelineFailed {
                step: step.name.clone(),
                cause: format!("unexpected non-terminal state {other:?} after wait"),
            }),
        }
    }

    /// No internal timeout — an external notifier prompts a human and the
    /// driver waits however long that takes. Cancellation is the only
    /// way out besides the verdict itself arriving.
    async fn await_human_verdict(&self, step: &str, execution_id: &str) -> CoreResult<()> {
        loop {
            if self.cancelled() {
                return Err(CoreError::Cancelled);
            }
            let state = self.pipeline.get_state(step, execution_id).await?;
            if state != PipelineState::WaitApproval {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn poll_until(&self, step: &str, execution_id: &str, targets: &[PipelineState]) -> CoreResult<PipelineState> {
        loop {
            if self.cancelled() {
                return Err(CoreError::Cancelled);
            }
            let state = self.pipeline.get_state(step, execution_id).await?;
            if targets.contains(&state) || is_terminal(state) {
                return Ok(state);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Bounded, exponentially-capped retry over the log stream until the
    /// parser finds a plan summary. `PlanOutputMissing` once the budget
    /// is exhausted.
    async fn scrape_plan_output(&self, step: &str, log_stream: &mut dyn LogStream, parser: &dyn PlanParser) -> CoreResult<PipelineChangeSummary> {
        let mut lines = Vec::new();
        let mut backoff = SCRAPE_INITIAL_BACKOFF;

        for _ in 0..SCRAPE_MAX_ATTEMPTS {
            if self.cancelled() {
                return Err(CoreError::Cancelled);
            }
            while let Some(line) = log_stream.next_line().await? {
                lines.push(line);
            }
            if let Some(summary) = parser.parse(&lines) {
                return Ok(summary);
            }
            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, SCRAPE_MAX_BACKOFF);
        }
        Err(CoreError::PlanOutputMissing { step: step.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_policy_always_auto_approves() {
        let summary = PipelineChangeSummary { added: 0, changed: 5, destroyed: 3 };
        let decision = StepDecision { step: "net".into(), modules: vec![] };
        let driver_auto = ApprovePolicy::Force == ApprovePolicy::Force
            || (summary.destroyed == 0 && (summary.changed == 0 || decision.auto_approve()));
        assert!(driver_auto);
    }

    #[test]
    fn destructive_change_is_not_auto_approved_without_force() {
        let summary = PipelineChangeSummary { added: 0, changed: 0, destroyed: 1 };
        let decision = StepDecision { step: "net".into(), modules: vec![] };
        let auto = summary.destroyed == 0 && (summary.changed == 0 || decision.auto_approve());
        assert!(!auto);
    }
}
