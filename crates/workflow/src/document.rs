use serde::Serialize;
use serde::de::DeserializeOwned;

use tradeflow_core::{Aggregate, AggregateId, DomainError, TenantId};
use tradeflow_events::Event;

use crate::approval::{ApprovalState, WorkflowCommand, WorkflowEvent};
use crate::kind::DocumentKind;

/// An aggregate that goes through the shared approval workflow.
///
/// Lets infra and the API run submit/approve/reject/recall/close/cancel for any
/// document with one generic code path.
pub trait WorkflowDocument:
    Aggregate<Error = DomainError, Event: Event + Serialize + DeserializeOwned> + Send + Sync + 'static
{
    const KIND: DocumentKind;

    /// Unborn instance used for rehydration.
    fn empty(id: AggregateId) -> Self;

    fn workflow_command(cmd: WorkflowCommand) -> Self::Command;

    /// The workflow fact inside one of this document's events, if any.
    fn workflow_event(event: &Self::Event) -> Option<&WorkflowEvent>;

    fn approval(&self) -> &ApprovalState;

    fn tenant_id(&self) -> Option<TenantId>;

    fn number(&self) -> &str;

    fn is_created(&self) -> bool;
}
