//! Sequential approval state machine.
//!
//! ```text
//! Draft ──submit──▶ PendingApproval ──approve (last step)──▶ Approved ──close──▶ Closed
//!   ▲  ╲                │    │
//!   │   cancel          │    └──reject──▶ Rejected ──submit──▶ PendingApproval
//!   │     ╲             │                   │
//!   └─recall┘           │                   └──cancel──▶ Cancelled
//!                       └──approve (not last)──▶ PendingApproval (next step)
//! ```
//!
//! Documents own an [`ApprovalState`], route [`WorkflowCommand`]s into
//! [`ApprovalState::decide`] and wrap the resulting [`WorkflowEvent`] in their
//! own event enum. The same code serves every document kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{AggregateId, DomainError, DomainResult, TenantId, UserId};

use crate::kind::DocumentKind;
use crate::route::{ApprovalRoute, ApprovalStep, Approver};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Closed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::PendingApproval => "pending_approval",
            WorkflowStatus::Approved => "approved",
            WorkflowStatus::Rejected => "rejected",
            WorkflowStatus::Closed => "closed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for WorkflowStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "draft" => Ok(WorkflowStatus::Draft),
            "pending_approval" | "pending" => Ok(WorkflowStatus::PendingApproval),
            "approved" => Ok(WorkflowStatus::Approved),
            "rejected" => Ok(WorkflowStatus::Rejected),
            "closed" => Ok(WorkflowStatus::Closed),
            "cancelled" | "canceled" => Ok(WorkflowStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown workflow status: {other}"))),
        }
    }
}

/// The user performing a workflow action, with the roles they hold in the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(user_id: UserId, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn can_act_on(&self, approver: &Approver) -> bool {
        match approver {
            Approver::Role(role) => self.has_role(role),
            Approver::User(user) => *user == self.user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WorkflowAction {
    /// The route is resolved by the caller (the active definition for the
    /// document kind) and snapshotted onto the document.
    Submit { route: ApprovalRoute },
    Approve { comment: Option<String> },
    Reject { reason: String },
    Recall,
    Close,
    Cancel { reason: String },
}

impl WorkflowAction {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowAction::Submit { .. } => "submit",
            WorkflowAction::Approve { .. } => "approve",
            WorkflowAction::Reject { .. } => "reject",
            WorkflowAction::Recall => "recall",
            WorkflowAction::Close => "close",
            WorkflowAction::Cancel { .. } => "cancel",
        }
    }
}

/// A workflow action addressed to one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowCommand {
    pub tenant_id: TenantId,
    pub document_id: AggregateId,
    pub actor: Actor,
    pub action: WorkflowAction,
    pub occurred_at: DateTime<Utc>,
}

/// What a workflow action did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum WorkflowTransition {
    Submitted { route: ApprovalRoute },
    StepApproved { sequence: u32, comment: Option<String>, final_step: bool },
    Rejected { sequence: u32, reason: String },
    Recalled,
    Closed,
    Cancelled { reason: String },
}

impl WorkflowTransition {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowTransition::Submitted { .. } => "submitted",
            WorkflowTransition::StepApproved { .. } => "step_approved",
            WorkflowTransition::Rejected { .. } => "rejected",
            WorkflowTransition::Recalled => "recalled",
            WorkflowTransition::Closed => "closed",
            WorkflowTransition::Cancelled { .. } => "cancelled",
        }
    }
}

/// Workflow fact carried inside each document's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub tenant_id: TenantId,
    pub document_id: AggregateId,
    pub kind: DocumentKind,
    pub document_number: String,
    pub actor: UserId,
    pub transition: WorkflowTransition,
    pub occurred_at: DateTime<Utc>,
}

/// One row of the approval history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub actor: UserId,
    pub transition: WorkflowTransition,
    pub status_after: WorkflowStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalState {
    status: WorkflowStatus,
    route: ApprovalRoute,
    /// Index into `route.steps` of the step waiting for a decision.
    current_step: usize,
    submitted_by: Option<UserId>,
    history: Vec<WorkflowRecord>,
}

impl Default for ApprovalState {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalState {
    pub fn new() -> Self {
        Self {
            status: WorkflowStatus::Draft,
            route: ApprovalRoute::default(),
            current_step: 0,
            submitted_by: None,
            history: Vec::new(),
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn route(&self) -> &ApprovalRoute {
        &self.route
    }

    pub fn submitted_by(&self) -> Option<UserId> {
        self.submitted_by
    }

    pub fn history(&self) -> &[WorkflowRecord] {
        &self.history
    }

    /// The step waiting for a decision, if the document is pending.
    pub fn pending_step(&self) -> Option<&ApprovalStep> {
        if self.status == WorkflowStatus::PendingApproval {
            self.route.step(self.current_step)
        } else {
            None
        }
    }

    pub fn is_editable(&self) -> bool {
        matches!(self.status, WorkflowStatus::Draft | WorkflowStatus::Rejected)
    }

    pub fn ensure_editable(&self) -> DomainResult<()> {
        if self.is_editable() {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "document is {} and can no longer be edited",
                self.status
            )))
        }
    }

    /// Downstream documents may only draw on approved, unclosed documents.
    pub fn ensure_fulfillable(&self) -> DomainResult<()> {
        match self.status {
            WorkflowStatus::Approved => Ok(()),
            WorkflowStatus::Closed => Err(DomainError::invariant("document is closed")),
            other => Err(DomainError::invariant(format!(
                "document must be approved first (status: {other})"
            ))),
        }
    }

    /// Decide the transition for `action` by `actor`. Pure.
    pub fn decide(&self, actor: &Actor, action: &WorkflowAction) -> DomainResult<WorkflowTransition> {
        match action {
            WorkflowAction::Submit { route } => {
                if !self.is_editable() {
                    return Err(DomainError::invariant(format!(
                        "cannot submit a document that is {}",
                        self.status
                    )));
                }
                route.validate()?;
                Ok(WorkflowTransition::Submitted { route: route.clone() })
            }
            WorkflowAction::Approve { comment } => {
                let step = self.step_for_decision(actor)?;
                let final_step = self.current_step + 1 >= self.route.len();
                Ok(WorkflowTransition::StepApproved {
                    sequence: step.sequence,
                    comment: comment.clone().filter(|c| !c.trim().is_empty()),
                    final_step,
                })
            }
            WorkflowAction::Reject { reason } => {
                let step = self.step_for_decision(actor)?;
                if reason.trim().is_empty() {
                    return Err(DomainError::validation("rejection reason is required"));
                }
                Ok(WorkflowTransition::Rejected {
                    sequence: step.sequence,
                    reason: reason.trim().to_string(),
                })
            }
            WorkflowAction::Recall => {
                if self.status != WorkflowStatus::PendingApproval {
                    return Err(DomainError::invariant(format!(
                        "only pending documents can be recalled (status: {})",
                        self.status
                    )));
                }
                if self.submitted_by != Some(actor.user_id) {
                    return Err(DomainError::Unauthorized);
                }
                Ok(WorkflowTransition::Recalled)
            }
            WorkflowAction::Close => {
                if self.status != WorkflowStatus::Approved {
                    return Err(DomainError::invariant(format!(
                        "only approved documents can be closed (status: {})",
                        self.status
                    )));
                }
                Ok(WorkflowTransition::Closed)
            }
            WorkflowAction::Cancel { reason } => {
                if !self.is_editable() {
                    return Err(DomainError::invariant(format!(
                        "cannot cancel a document that is {}",
                        self.status
                    )));
                }
                if reason.trim().is_empty() {
                    return Err(DomainError::validation("cancellation reason is required"));
                }
                Ok(WorkflowTransition::Cancelled { reason: reason.trim().to_string() })
            }
        }
    }

    fn step_for_decision(&self, actor: &Actor) -> DomainResult<&ApprovalStep> {
        let step = self.pending_step().ok_or_else(|| {
            DomainError::invariant(format!("document is not pending approval (status: {})", self.status))
        })?;
        if !actor.can_act_on(&step.approver) {
            return Err(DomainError::Unauthorized);
        }
        // Role-based steps never let the submitter sign off on their own document.
        let named_explicitly = matches!(step.approver, Approver::User(u) if u == actor.user_id);
        if self.submitted_by == Some(actor.user_id) && !named_explicitly {
            return Err(DomainError::Unauthorized);
        }
        Ok(step)
    }

    /// Build the document-level event for a command, or fail.
    pub fn handle(
        &self,
        kind: DocumentKind,
        document_number: &str,
        cmd: &WorkflowCommand,
    ) -> DomainResult<WorkflowEvent> {
        let transition = self.decide(&cmd.actor, &cmd.action)?;
        Ok(WorkflowEvent {
            tenant_id: cmd.tenant_id,
            document_id: cmd.document_id,
            kind,
            document_number: document_number.to_string(),
            actor: cmd.actor.user_id,
            transition,
            occurred_at: cmd.occurred_at,
        })
    }

    pub fn apply(&mut self, event: &WorkflowEvent) {
        match &event.transition {
            WorkflowTransition::Submitted { route } => {
                self.route = route.clone();
                self.current_step = 0;
                self.submitted_by = Some(event.actor);
                self.status = if route.is_empty() {
                    WorkflowStatus::Approved
                } else {
                    WorkflowStatus::PendingApproval
                };
            }
            WorkflowTransition::StepApproved { final_step, .. } => {
                if *final_step {
                    self.status = WorkflowStatus::Approved;
                } else {
                    self.current_step += 1;
                }
            }
            WorkflowTransition::Rejected { .. } => {
                self.status = WorkflowStatus::Rejected;
                self.current_step = 0;
            }
            WorkflowTransition::Recalled => {
                self.status = WorkflowStatus::Draft;
                self.current_step = 0;
            }
            WorkflowTransition::Closed => self.status = WorkflowStatus::Closed,
            WorkflowTransition::Cancelled { .. } => self.status = WorkflowStatus::Cancelled,
        }
        self.history.push(WorkflowRecord {
            actor: event.actor,
            transition: event.transition.clone(),
            status_after: self.status,
            at: event.occurred_at,
        });
    }

    /// Who should be notified next, given the state after `event` was applied.
    pub fn next_approver(&self) -> Option<&Approver> {
        self.pending_step().map(|s| &s.approver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cmd(actor: &Actor, action: WorkflowAction) -> WorkflowCommand {
        WorkflowCommand {
            tenant_id: TenantId::new(),
            document_id: AggregateId::new(),
            actor: actor.clone(),
            action,
            occurred_at: Utc::now(),
        }
    }

    fn run(state: &mut ApprovalState, actor: &Actor, action: WorkflowAction) -> DomainResult<WorkflowEvent> {
        let ev = state.handle(DocumentKind::PurchaseOrder, "PO-000001", &cmd(actor, action))?;
        state.apply(&ev);
        Ok(ev)
    }

    fn two_step_route() -> ApprovalRoute {
        ApprovalRoute::of_roles(["manager", "director"]).unwrap()
    }

    #[test]
    fn full_two_step_approval() {
        let clerk = Actor::new(UserId::new(), ["purchaser"]);
        let manager = Actor::new(UserId::new(), ["manager"]);
        let director = Actor::new(UserId::new(), ["director"]);
        let mut s = ApprovalState::new();

        run(&mut s, &clerk, WorkflowAction::Submit { route: two_step_route() }).unwrap();
        assert_eq!(s.status(), WorkflowStatus::PendingApproval);
        assert_eq!(s.next_approver(), Some(&Approver::Role("manager".into())));

        let ev = run(&mut s, &manager, WorkflowAction::Approve { comment: None }).unwrap();
        assert!(matches!(ev.transition, WorkflowTransition::StepApproved { sequence: 1, final_step: false, .. }));
        assert_eq!(s.status(), WorkflowStatus::PendingApproval);

        run(&mut s, &director, WorkflowAction::Approve { comment: Some("ok".into()) }).unwrap();
        assert_eq!(s.status(), WorkflowStatus::Approved);
        assert_eq!(s.history().len(), 3);
    }

    #[test]
    fn empty_route_approves_on_submit() {
        let clerk = Actor::new(UserId::new(), ["purchaser"]);
        let mut s = ApprovalState::new();
        run(&mut s, &clerk, WorkflowAction::Submit { route: ApprovalRoute::default() }).unwrap();
        assert_eq!(s.status(), WorkflowStatus::Approved);
    }

    #[test]
    fn wrong_role_cannot_approve_current_step() {
        let clerk = Actor::new(UserId::new(), ["purchaser"]);
        let director = Actor::new(UserId::new(), ["director"]);
        let mut s = ApprovalState::new();
        run(&mut s, &clerk, WorkflowAction::Submit { route: two_step_route() }).unwrap();

        let err = run(&mut s, &director, WorkflowAction::Approve { comment: None }).unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[test]
    fn submitter_cannot_self_approve_through_role() {
        let boss = Actor::new(UserId::new(), ["manager"]);
        let mut s = ApprovalState::new();
        run(&mut s, &boss, WorkflowAction::Submit { route: ApprovalRoute::of_roles(["manager"]).unwrap() }).unwrap();

        let err = run(&mut s, &boss, WorkflowAction::Approve { comment: None }).unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[test]
    fn named_user_step_allows_submitter() {
        let owner = Actor::new(UserId::new(), Vec::<String>::new());
        let route = ApprovalRoute::new(vec![ApprovalStep {
            sequence: 1,
            approver: Approver::User(owner.user_id),
            label: Some("owner sign-off".into()),
        }])
        .unwrap();
        let mut s = ApprovalState::new();
        run(&mut s, &owner, WorkflowAction::Submit { route }).unwrap();
        run(&mut s, &owner, WorkflowAction::Approve { comment: None }).unwrap();
        assert_eq!(s.status(), WorkflowStatus::Approved);
    }

    #[test]
    fn reject_requires_reason_and_allows_resubmit() {
        let clerk = Actor::new(UserId::new(), ["purchaser"]);
        let manager = Actor::new(UserId::new(), ["manager"]);
        let mut s = ApprovalState::new();
        run(&mut s, &clerk, WorkflowAction::Submit { route: two_step_route() }).unwrap();

        let err = run(&mut s, &manager, WorkflowAction::Reject { reason: "  ".into() }).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        run(&mut s, &manager, WorkflowAction::Reject { reason: "price too high".into() }).unwrap();
        assert_eq!(s.status(), WorkflowStatus::Rejected);
        assert!(s.is_editable());

        run(&mut s, &clerk, WorkflowAction::Submit { route: two_step_route() }).unwrap();
        assert_eq!(s.status(), WorkflowStatus::PendingApproval);
        assert_eq!(s.pending_step().map(|p| p.sequence), Some(1));
    }

    #[test]
    fn only_submitter_can_recall() {
        let clerk = Actor::new(UserId::new(), ["purchaser"]);
        let other = Actor::new(UserId::new(), ["purchaser"]);
        let mut s = ApprovalState::new();
        run(&mut s, &clerk, WorkflowAction::Submit { route: two_step_route() }).unwrap();

        assert_eq!(run(&mut s, &other, WorkflowAction::Recall).unwrap_err(), DomainError::Unauthorized);
        run(&mut s, &clerk, WorkflowAction::Recall).unwrap();
        assert_eq!(s.status(), WorkflowStatus::Draft);
    }

    #[test]
    fn close_only_from_approved_and_cancel_only_while_editable() {
        let clerk = Actor::new(UserId::new(), ["purchaser"]);
        let mut s = ApprovalState::new();

        let err = run(&mut s, &clerk, WorkflowAction::Close).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        run(&mut s, &clerk, WorkflowAction::Submit { route: ApprovalRoute::default() }).unwrap();
        let err = run(&mut s, &clerk, WorkflowAction::Cancel { reason: "dup".into() }).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        run(&mut s, &clerk, WorkflowAction::Close).unwrap();
        assert_eq!(s.status(), WorkflowStatus::Closed);
        assert!(s.ensure_fulfillable().is_err());
    }

    #[test]
    fn editing_locked_while_pending() {
        let clerk = Actor::new(UserId::new(), ["purchaser"]);
        let mut s = ApprovalState::new();
        assert!(s.ensure_editable().is_ok());
        run(&mut s, &clerk, WorkflowAction::Submit { route: two_step_route() }).unwrap();
        assert!(s.ensure_editable().is_err());
    }

    proptest! {
        /// Whatever order approvers show up in, a document only becomes
        /// approved after every step was approved by its own approver, in order.
        #[test]
        fn approval_never_skips_steps(order in proptest::collection::vec(0usize..3, 1..12)) {
            let roles = ["r0", "r1", "r2"];
            let actors: Vec<Actor> = roles.iter().map(|r| Actor::new(UserId::new(), [*r])).collect();
            let clerk = Actor::new(UserId::new(), ["clerk"]);
            let mut s = ApprovalState::new();
            run(&mut s, &clerk, WorkflowAction::Submit { route: ApprovalRoute::of_roles(roles).unwrap() }).unwrap();

            let mut expected_next = 0usize;
            for idx in order {
                let res = run(&mut s, &actors[idx], WorkflowAction::Approve { comment: None });
                if s.status() == WorkflowStatus::Approved && res.is_err() {
                    continue;
                }
                if idx == expected_next && expected_next < roles.len() {
                    prop_assert!(res.is_ok());
                    expected_next += 1;
                } else {
                    prop_assert!(res.is_err());
                }
            }
            prop_assert_eq!(s.status() == WorkflowStatus::Approved, expected_next == roles.len());
        }
    }
}
