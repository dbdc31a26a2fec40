//! Per-tenant approval route definitions, one stream per document kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use tradeflow_events::Event;

use crate::kind::DocumentKind;
use crate::route::ApprovalRoute;

/// The active route for one document kind.
///
/// Documents snapshot the route when they are submitted, so redefining a route
/// only affects later submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    id: AggregateId,
    tenant_id: Option<TenantId>,
    kind: Option<DocumentKind>,
    route: ApprovalRoute,
    revision: u32,
    version: u64,
}

impl WorkflowDefinition {
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: None,
            route: ApprovalRoute::default(),
            revision: 0,
            version: 0,
        }
    }

    pub fn for_kind(kind: DocumentKind) -> Self {
        Self::empty(kind.definition_id())
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn kind(&self) -> Option<DocumentKind> {
        self.kind
    }

    pub fn route(&self) -> &ApprovalRoute {
        &self.route
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }
}

impl AggregateRoot for WorkflowDefinition {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineRoute {
    pub tenant_id: TenantId,
    pub kind: DocumentKind,
    pub route: ApprovalRoute,
    pub defined_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowDefinitionCommand {
    DefineRoute(DefineRoute),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefined {
    pub tenant_id: TenantId,
    pub kind: DocumentKind,
    pub route: ApprovalRoute,
    pub revision: u32,
    pub defined_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowDefinitionEvent {
    RouteDefined(RouteDefined),
}

impl Event for WorkflowDefinitionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkflowDefinitionEvent::RouteDefined(_) => "workflow.definition.route_defined",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkflowDefinitionEvent::RouteDefined(e) => e.occurred_at,
        }
    }
}

impl Aggregate for WorkflowDefinition {
    type Command = WorkflowDefinitionCommand;
    type Event = WorkflowDefinitionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WorkflowDefinitionEvent::RouteDefined(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.kind = Some(e.kind);
                self.route = e.route.clone();
                self.revision = e.revision;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WorkflowDefinitionCommand::DefineRoute(cmd) => {
                if let Some(tenant) = self.tenant_id {
                    if tenant != cmd.tenant_id {
                        return Err(DomainError::invariant("tenant mismatch"));
                    }
                }
                if self.id != cmd.kind.definition_id() {
                    return Err(DomainError::invariant("definition stream does not match document kind"));
                }
                cmd.route.validate()?;
                Ok(vec![WorkflowDefinitionEvent::RouteDefined(RouteDefined {
                    tenant_id: cmd.tenant_id,
                    kind: cmd.kind,
                    route: cmd.route.clone(),
                    revision: self.revision + 1,
                    defined_by: cmd.defined_by,
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

    fn define(kind: DocumentKind, tenant_id: TenantId, roles: &[&str]) -> WorkflowDefinitionCommand {
        WorkflowDefinitionCommand::DefineRoute(DefineRoute {
            tenant_id,
            kind,
            route: ApprovalRoute::of_roles(roles.iter().copied()).unwrap(),
            defined_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn redefining_bumps_revision() {
        let tenant = TenantId::new();
        let mut def = WorkflowDefinition::for_kind(DocumentKind::CustomerOrder);

        execute(&mut def, &define(DocumentKind::CustomerOrder, tenant, &["manager"])).unwrap();
        execute(&mut def, &define(DocumentKind::CustomerOrder, tenant, &["manager", "director"])).unwrap();

        assert_eq!(def.revision(), 2);
        assert_eq!(def.route().len(), 2);
        assert_eq!(def.version(), 2);
    }

    #[test]
    fn kind_must_match_stream() {
        let def = WorkflowDefinition::for_kind(DocumentKind::CustomerOrder);
        let err = def
            .handle(&define(DocumentKind::PurchaseOrder, TenantId::new(), &["manager"]))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
