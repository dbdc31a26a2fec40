//! Workflow notifications (the in-app bell).
//!
//! Derived from the workflow events inside every document stream:
//! - submission or a non-final step approval notifies the next approver;
//! - final approval, rejection and close notify the submitter.
//!
//! A notification never goes to the user who caused it. Read flags come from
//! the per-user inbox streams so they survive a rebuild. A role notification
//! is shared, but each member of the role reads it independently.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use tradeflow_core::{AggregateId, TenantId, UserId};
use tradeflow_events::EventEnvelope;
use tradeflow_invoicing::SalesInvoice;
use tradeflow_purchasing::{PurchaseOrder, PurchaseRequest};
use tradeflow_sales::{CustomerOrder, DeliveryOrder};
use tradeflow_workflow::{
    ApprovalState, Approver, DocumentKind, InboxEvent, WorkflowDocument, WorkflowEvent,
    WorkflowTransition,
};

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::cursor::{CursorCheck, ProjectionError, StreamCursors};

/// Event-store aggregate type of per-user inbox streams.
pub const INBOX_STREAM: &str = "workflow.inbox";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Recipient {
    User(UserId),
    Role(String),
}

impl Recipient {
    pub fn matches(&self, user_id: UserId, roles: &[String]) -> bool {
        match self {
            Recipient::User(u) => *u == user_id,
            Recipient::Role(r) => roles.iter().any(|held| held == r),
        }
    }
}

impl From<&Approver> for Recipient {
    fn from(approver: &Approver) -> Self {
        match approver {
            Approver::Role(r) => Recipient::Role(r.clone()),
            Approver::User(u) => Recipient::User(*u),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Id of the workflow event that produced it.
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub document_kind: DocumentKind,
    pub document_id: AggregateId,
    pub document_number: String,
    pub created_at: DateTime<Utc>,
    /// Read by the user the notification was fetched for.
    pub read: bool,
}

#[derive(Debug)]
pub struct NotificationsProjection {
    notifications: InMemoryTenantStore<Uuid, Notification>,
    read_by: InMemoryTenantStore<Uuid, HashSet<UserId>>,
    approvals: InMemoryTenantStore<AggregateId, ApprovalState>,
    cursors: StreamCursors,
}

impl Default for NotificationsProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationsProjection {
    pub fn new() -> Self {
        Self {
            notifications: InMemoryTenantStore::new(),
            read_by: InMemoryTenantStore::new(),
            approvals: InMemoryTenantStore::new(),
            cursors: StreamCursors::new(),
        }
    }

    /// Notifications addressed to the user directly or through one of their
    /// roles, newest first.
    pub fn list_for(&self, tenant_id: TenantId, user_id: UserId, roles: &[String]) -> Vec<Notification> {
        let mut list: Vec<_> = self
            .notifications
            .list(tenant_id)
            .into_iter()
            .filter(|n| n.recipient.matches(user_id, roles))
            .map(|n| self.as_seen_by(tenant_id, n, user_id))
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        list
    }

    pub fn unread_count_for(&self, tenant_id: TenantId, user_id: UserId, roles: &[String]) -> usize {
        self.list_for(tenant_id, user_id, roles).iter().filter(|n| !n.read).count()
    }

    /// One notification, if it is addressed to the user.
    pub fn get_for(&self, tenant_id: TenantId, id: Uuid, user_id: UserId, roles: &[String]) -> Option<Notification> {
        self.notifications
            .get(tenant_id, &id)
            .filter(|n| n.recipient.matches(user_id, roles))
            .map(|n| self.as_seen_by(tenant_id, n, user_id))
    }

    fn as_seen_by(&self, tenant_id: TenantId, mut notification: Notification, user_id: UserId) -> Notification {
        notification.read = self
            .read_by
            .get(tenant_id, &notification.id)
            .is_some_and(|readers| readers.contains(&user_id));
        notification
    }

    /// Apply one envelope and return the notifications it created.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Vec<Notification>, ProjectionError> {
        let kind = DocumentKind::from_aggregate_type(envelope.aggregate_type());
        if kind.is_none() && envelope.aggregate_type() != INBOX_STREAM {
            return Ok(Vec::new());
        }
        if self.cursors.check(envelope)? == CursorCheck::Duplicate {
            return Ok(Vec::new());
        }

        let created = match kind {
            Some(kind) => match workflow_event_of(kind, envelope)? {
                Some(event) => self.on_workflow_event(envelope, &event)?,
                None => Vec::new(),
            },
            None => {
                self.on_inbox_event(envelope)?;
                Vec::new()
            }
        };

        self.cursors.advance(envelope);
        Ok(created)
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.notifications.clear_tenant(tenant_id);
        self.read_by.clear_tenant(tenant_id);
        self.approvals.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }

    fn on_workflow_event(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: &WorkflowEvent,
    ) -> Result<Vec<Notification>, ProjectionError> {
        let tenant_id = envelope.tenant_id();
        if event.tenant_id != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "workflow event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        let mut approval = self
            .approvals
            .get(tenant_id, &event.document_id)
            .unwrap_or_default();
        approval.apply(event);

        let recipient = recipient_after(&approval, event);
        self.approvals.upsert(tenant_id, event.document_id, approval);

        let Some(recipient) = recipient else {
            return Ok(Vec::new());
        };
        if recipient == Recipient::User(event.actor) {
            return Ok(Vec::new());
        }

        let (title, message) = describe(event);
        let notification = Notification {
            id: envelope.event_id(),
            tenant_id,
            recipient,
            title,
            message,
            document_kind: event.kind,
            document_id: event.document_id,
            document_number: event.document_number.clone(),
            created_at: event.occurred_at,
            read: false,
        };
        self.notifications.upsert(tenant_id, notification.id, notification.clone());
        Ok(vec![notification])
    }

    fn on_inbox_event(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let event: InboxEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::deserialize(envelope, e))?;
        let InboxEvent::NotificationsRead(read) = event;
        if read.tenant_id != envelope.tenant_id() {
            return Err(ProjectionError::TenantIsolation(
                "inbox event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        for id in read.notification_ids {
            let mut readers = self.read_by.get(read.tenant_id, &id).unwrap_or_default();
            readers.insert(read.user_id);
            self.read_by.upsert(read.tenant_id, id, readers);
        }
        Ok(())
    }
}

fn recipient_after(approval: &ApprovalState, event: &WorkflowEvent) -> Option<Recipient> {
    let submitter = || approval.submitted_by().map(Recipient::User);
    match &event.transition {
        WorkflowTransition::Submitted { .. } => approval.next_approver().map(Recipient::from),
        WorkflowTransition::StepApproved { final_step: false, .. } => {
            approval.next_approver().map(Recipient::from)
        }
        WorkflowTransition::StepApproved { final_step: true, .. }
        | WorkflowTransition::Rejected { .. }
        | WorkflowTransition::Closed => submitter(),
        WorkflowTransition::Recalled | WorkflowTransition::Cancelled { .. } => None,
    }
}

fn describe(event: &WorkflowEvent) -> (String, String) {
    let doc = format!("{} {}", event.kind.title(), event.document_number);
    match &event.transition {
        WorkflowTransition::Submitted { .. } | WorkflowTransition::StepApproved { final_step: false, .. } => (
            format!("Approval required: {}", event.document_number),
            format!("{doc} is waiting for your approval."),
        ),
        WorkflowTransition::StepApproved { .. } => (
            format!("Approved: {}", event.document_number),
            format!("{doc} has been approved."),
        ),
        WorkflowTransition::Rejected { reason, .. } => (
            format!("Rejected: {}", event.document_number),
            format!("{doc} was rejected: {reason}"),
        ),
        WorkflowTransition::Closed => (
            format!("Closed: {}", event.document_number),
            format!("{doc} has been closed."),
        ),
        WorkflowTransition::Recalled | WorkflowTransition::Cancelled { .. } => (doc.clone(), doc),
    }
}

fn workflow_event_of(
    kind: DocumentKind,
    envelope: &EventEnvelope<JsonValue>,
) -> Result<Option<WorkflowEvent>, ProjectionError> {
    match kind {
        DocumentKind::PurchaseRequest => extract::<PurchaseRequest>(envelope),
        DocumentKind::PurchaseOrder => extract::<PurchaseOrder>(envelope),
        DocumentKind::CustomerOrder => extract::<CustomerOrder>(envelope),
        DocumentKind::DeliveryOrder => extract::<DeliveryOrder>(envelope),
        DocumentKind::SalesInvoice => extract::<SalesInvoice>(envelope),
    }
}

fn extract<D: WorkflowDocument>(envelope: &EventEnvelope<JsonValue>) -> Result<Option<WorkflowEvent>, ProjectionError> {
    let event: D::Event = serde_json::from_value(envelope.payload().clone())
        .map_err(|e| ProjectionError::deserialize(envelope, e))?;
    Ok(D::workflow_event(&event).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_purchasing::PurchaseOrderEvent;
    use tradeflow_workflow::{ApprovalRoute, ApprovalStep, NotificationsRead};

    struct Stream {
        tenant: TenantId,
        doc: AggregateId,
        seq: u64,
    }

    impl Stream {
        fn new(tenant: TenantId) -> Self {
            Self { tenant, doc: AggregateId::new(), seq: 0 }
        }

        fn next(&mut self, actor: UserId, transition: WorkflowTransition) -> EventEnvelope<JsonValue> {
            self.seq += 1;
            let event = PurchaseOrderEvent::Workflow(WorkflowEvent {
                tenant_id: self.tenant,
                document_id: self.doc,
                kind: DocumentKind::PurchaseOrder,
                document_number: "PO-000007".to_string(),
                actor,
                transition,
                occurred_at: Utc::now(),
            });
            EventEnvelope::new(
                Uuid::now_v7(),
                self.tenant,
                self.doc,
                "purchasing.order",
                self.seq,
                serde_json::to_value(&event).unwrap(),
            )
        }
    }

    fn route(manager: &str, director: UserId) -> ApprovalRoute {
        ApprovalRoute::new(vec![
            ApprovalStep { sequence: 1, approver: Approver::Role(manager.into()), label: None },
            ApprovalStep { sequence: 2, approver: Approver::User(director), label: None },
        ])
        .unwrap()
    }

    #[test]
    fn approval_chain_notifies_each_next_approver_then_submitter() {
        let projection = NotificationsProjection::new();
        let tenant = TenantId::new();
        let (clerk, manager, director) = (UserId::new(), UserId::new(), UserId::new());
        let mut s = Stream::new(tenant);

        let created = projection
            .apply_envelope(&s.next(clerk, WorkflowTransition::Submitted { route: route("manager", director) }))
            .unwrap();
        assert_eq!(created[0].recipient, Recipient::Role("manager".into()));

        let created = projection
            .apply_envelope(&s.next(
                manager,
                WorkflowTransition::StepApproved { sequence: 1, comment: None, final_step: false },
            ))
            .unwrap();
        assert_eq!(created[0].recipient, Recipient::User(director));

        let created = projection
            .apply_envelope(&s.next(
                director,
                WorkflowTransition::StepApproved { sequence: 2, comment: None, final_step: true },
            ))
            .unwrap();
        assert_eq!(created[0].recipient, Recipient::User(clerk));
        assert!(created[0].title.starts_with("Approved"));

        let roles = vec!["manager".to_string()];
        assert_eq!(projection.list_for(tenant, manager, &roles).len(), 1);
        assert_eq!(projection.unread_count_for(tenant, clerk, &[]), 1);
        assert!(projection.list_for(TenantId::new(), clerk, &[]).is_empty());
    }

    #[test]
    fn rejection_notifies_submitter_and_recall_is_silent() {
        let projection = NotificationsProjection::new();
        let tenant = TenantId::new();
        let (clerk, manager) = (UserId::new(), UserId::new());
        let mut s = Stream::new(tenant);
        let r = ApprovalRoute::of_roles(["manager"]).unwrap();

        projection.apply_envelope(&s.next(clerk, WorkflowTransition::Submitted { route: r.clone() })).unwrap();
        let created = projection
            .apply_envelope(&s.next(manager, WorkflowTransition::Rejected { sequence: 1, reason: "price".into() }))
            .unwrap();
        assert_eq!(created[0].recipient, Recipient::User(clerk));
        assert!(created[0].message.contains("price"));

        projection.apply_envelope(&s.next(clerk, WorkflowTransition::Submitted { route: r })).unwrap();
        let created = projection.apply_envelope(&s.next(clerk, WorkflowTransition::Recalled)).unwrap();
        assert!(created.is_empty());
    }

    #[test]
    fn actor_is_never_notified_about_own_action() {
        let projection = NotificationsProjection::new();
        let tenant = TenantId::new();
        let clerk = UserId::new();
        let mut s = Stream::new(tenant);
        let r = ApprovalRoute::new(vec![ApprovalStep {
            sequence: 1,
            approver: Approver::User(clerk),
            label: None,
        }])
        .unwrap();

        let created = projection.apply_envelope(&s.next(clerk, WorkflowTransition::Submitted { route: r })).unwrap();
        assert!(created.is_empty());
    }

    #[test]
    fn inbox_events_mark_notifications_read() {
        let projection = NotificationsProjection::new();
        let tenant = TenantId::new();
        let (clerk, manager) = (UserId::new(), UserId::new());
        let mut s = Stream::new(tenant);

        let created = projection
            .apply_envelope(&s.next(
                clerk,
                WorkflowTransition::Submitted { route: ApprovalRoute::of_roles(["manager"]).unwrap() },
            ))
            .unwrap();
        let roles = vec!["manager".to_string()];
        assert_eq!(projection.unread_count_for(tenant, manager, &roles), 1);

        let read = InboxEvent::NotificationsRead(NotificationsRead {
            tenant_id: tenant,
            user_id: manager,
            notification_ids: vec![created[0].id],
            occurred_at: Utc::now(),
        });
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            tenant,
            tradeflow_workflow::inbox_stream_id(manager),
            INBOX_STREAM,
            1,
            serde_json::to_value(&read).unwrap(),
        );
        projection.apply_envelope(&env).unwrap();

        assert_eq!(projection.unread_count_for(tenant, manager, &roles), 0);
        assert!(projection.get_for(tenant, created[0].id, manager, &roles).unwrap().read);
        assert!(projection.get_for(tenant, created[0].id, clerk, &[]).is_none());
    }

    #[test]
    fn role_notification_is_read_per_member() {
        let projection = NotificationsProjection::new();
        let tenant = TenantId::new();
        let (clerk, first_manager, second_manager) = (UserId::new(), UserId::new(), UserId::new());
        let mut s = Stream::new(tenant);

        let created = projection
            .apply_envelope(&s.next(
                clerk,
                WorkflowTransition::Submitted { route: ApprovalRoute::of_roles(["manager"]).unwrap() },
            ))
            .unwrap();
        let id = created[0].id;
        let roles = vec!["manager".to_string()];

        let read = InboxEvent::NotificationsRead(NotificationsRead {
            tenant_id: tenant,
            user_id: first_manager,
            notification_ids: vec![id],
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&EventEnvelope::new(
                Uuid::now_v7(),
                tenant,
                tradeflow_workflow::inbox_stream_id(first_manager),
                INBOX_STREAM,
                1,
                serde_json::to_value(&read).unwrap(),
            ))
            .unwrap();

        assert_eq!(projection.unread_count_for(tenant, first_manager, &roles), 0);
        assert_eq!(projection.unread_count_for(tenant, second_manager, &roles), 1);
        assert!(projection.list_for(tenant, first_manager, &roles)[0].read);
        assert!(!projection.list_for(tenant, second_manager, &roles)[0].read);
        assert!(!projection.get_for(tenant, id, second_manager, &roles).unwrap().read);
    }
}
