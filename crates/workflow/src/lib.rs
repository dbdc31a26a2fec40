//! `tradeflow-workflow`: the sequential approval workflow shared by every
//! TradeFlow document (PR, PO, CO, DO, SI), plus outstanding-quantity
//! bookkeeping and the per-tenant approval route definitions.

pub mod approval;
pub mod definition;
pub mod document;
pub mod fulfillment;
pub mod inbox;
pub mod kind;
pub mod route;

pub use approval::{
    Actor, ApprovalState, WorkflowAction, WorkflowCommand, WorkflowEvent, WorkflowRecord,
    WorkflowStatus, WorkflowTransition,
};
pub use definition::{
    DefineRoute, RouteDefined, WorkflowDefinition, WorkflowDefinitionCommand,
    WorkflowDefinitionEvent,
};
pub use document::WorkflowDocument;
pub use inbox::{Inbox, InboxCommand, InboxEvent, MarkRead, NotificationsRead, inbox_stream_id};
pub use fulfillment::{Allocation, Fulfillment, LineQuantity, validate_line_quantities};
pub use kind::DocumentKind;
pub use route::{ApprovalRoute, ApprovalStep, Approver};
