//! Read receipts for workflow notifications.
//!
//! Notifications themselves are derived from workflow events; marking them
//! read is the only user-driven state, so it is recorded here as a small
//! per-user stream and replays with everything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use tradeflow_events::Event;

const INBOX_NAMESPACE: Uuid = Uuid::from_u128(0x5b1e_6a0c_2f4d_4e0b_9c3a_7d21_e8f4_c610);

/// Stream id of a user's inbox. Deterministic so no lookup table is needed.
pub fn inbox_stream_id(user_id: UserId) -> AggregateId {
    AggregateId::from_uuid(Uuid::new_v5(&INBOX_NAMESPACE, user_id.as_uuid().as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbox {
    id: AggregateId,
    tenant_id: Option<TenantId>,
    read: std::collections::BTreeSet<Uuid>,
    version: u64,
}

impl Inbox {
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            read: Default::default(),
            version: 0,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn has_read(&self, notification_id: Uuid) -> bool {
        self.read.contains(&notification_id)
    }
}

impl AggregateRoot for Inbox {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRead {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub notification_ids: Vec<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboxCommand {
    MarkRead(MarkRead),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsRead {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub notification_ids: Vec<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboxEvent {
    NotificationsRead(NotificationsRead),
}

impl Event for InboxEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InboxEvent::NotificationsRead(_) => "workflow.inbox.read",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InboxEvent::NotificationsRead(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Inbox {
    type Command = InboxCommand;
    type Event = InboxEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InboxEvent::NotificationsRead(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.read.extend(e.notification_ids.iter().copied());
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InboxCommand::MarkRead(cmd) => {
                if inbox_stream_id(cmd.user_id) != self.id {
                    return Err(DomainError::invariant("inbox does not belong to this user"));
                }
                if let Some(tenant) = self.tenant_id {
                    if tenant != cmd.tenant_id {
                        return Err(DomainError::invariant("tenant mismatch"));
                    }
                }
                let mut fresh: Vec<Uuid> = cmd
                    .notification_ids
                    .iter()
                    .copied()
                    .filter(|id| !self.read.contains(id))
                    .collect();
                fresh.sort();
                fresh.dedup();
                if fresh.is_empty() {
                    return Ok(vec![]);
                }
                Ok(vec![InboxEvent::NotificationsRead(NotificationsRead {
                    tenant_id: cmd.tenant_id,
                    user_id: cmd.user_id,
                    notification_ids: fresh,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_events::execute;

    fn mark(tenant_id: TenantId, user_id: UserId, ids: &[Uuid]) -> InboxCommand {
        InboxCommand::MarkRead(MarkRead {
            tenant_id,
            user_id,
            notification_ids: ids.to_vec(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn marking_twice_only_records_new_ids() {
        let (tenant, user) = (TenantId::new(), UserId::new());
        let mut inbox = Inbox::empty(inbox_stream_id(user));
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        execute(&mut inbox, &mark(tenant, user, &[a])).unwrap();
        let events = execute(&mut inbox, &mark(tenant, user, &[a, b, b])).unwrap();

        let InboxEvent::NotificationsRead(e) = &events[0];
        assert_eq!(e.notification_ids, vec![b]);
        assert!(inbox.has_read(a) && inbox.has_read(b));
        assert!(execute(&mut inbox, &mark(tenant, user, &[a])).unwrap().is_empty());
    }

    #[test]
    fn another_users_inbox_is_refused() {
        let tenant = TenantId::new();
        let inbox = Inbox::empty(inbox_stream_id(UserId::new()));
        let err = inbox.handle(&mark(tenant, UserId::new(), &[Uuid::now_v7()])).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn stream_ids_are_stable_per_user() {
        let user = UserId::new();
        assert_eq!(inbox_stream_id(user), inbox_stream_id(user));
        assert_ne!(inbox_stream_id(user), inbox_stream_id(UserId::new()));
    }
}
