use std::collections::BTreeSet;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use tradeflow_auth::User;
use tradeflow_catalog::{Item, Unit, Warehouse};
use tradeflow_core::TenantId;
use tradeflow_events::EventEnvelope;
use tradeflow_invoicing::SalesInvoice;
use tradeflow_parties::Party;
use tradeflow_purchasing::{PurchaseOrder, PurchaseRequest};
use tradeflow_sales::{CustomerOrder, DeliveryOrder};
use tradeflow_workflow::WorkflowDefinition;

use crate::event_store::StoredEvent;

use super::cursor::ProjectionError;
use super::mirror::AggregateMirror;
use super::notifications::{Notification, NotificationsProjection};
use super::stock_on_hand::StockOnHandProjection;

/// Every query-side view of the system, fed from one envelope stream.
#[derive(Default)]
pub struct ReadModels {
    pub parties: AggregateMirror<Party>,
    pub items: AggregateMirror<Item>,
    pub units: AggregateMirror<Unit>,
    pub warehouses: AggregateMirror<Warehouse>,
    pub users: AggregateMirror<User>,
    pub workflow_definitions: AggregateMirror<WorkflowDefinition>,
    pub purchase_requests: AggregateMirror<PurchaseRequest>,
    pub purchase_orders: AggregateMirror<PurchaseOrder>,
    pub customer_orders: AggregateMirror<CustomerOrder>,
    pub delivery_orders: AggregateMirror<DeliveryOrder>,
    pub sales_invoices: AggregateMirror<SalesInvoice>,
    pub stock: StockOnHandProjection,
    pub notifications: NotificationsProjection,
}

impl ReadModels {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Feed one envelope to every projection.
    ///
    /// All projections see the envelope even if an earlier one fails; the
    /// first error is returned. Returns the notifications created by it.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Vec<Notification>, ProjectionError> {
        let results = [
            self.parties.apply_envelope(envelope),
            self.items.apply_envelope(envelope),
            self.units.apply_envelope(envelope),
            self.warehouses.apply_envelope(envelope),
            self.users.apply_envelope(envelope),
            self.workflow_definitions.apply_envelope(envelope),
            self.purchase_requests.apply_envelope(envelope),
            self.purchase_orders.apply_envelope(envelope),
            self.customer_orders.apply_envelope(envelope),
            self.delivery_orders.apply_envelope(envelope),
            self.sales_invoices.apply_envelope(envelope),
            self.stock.apply_envelope(envelope),
        ];
        let notifications = self.notifications.apply_envelope(envelope);

        let mut first_error = None;
        for result in results {
            if let Err(err) = result {
                warn!(
                    aggregate_type = envelope.aggregate_type(),
                    aggregate_id = %envelope.aggregate_id(),
                    sequence = envelope.sequence_number(),
                    error = %err,
                    "projection failed"
                );
                first_error.get_or_insert(err);
            }
        }
        match (first_error, notifications) {
            (Some(err), _) => Err(err),
            (None, notifications) => notifications,
        }
    }

    /// Drop the tenants present in `events` and replay them in commit order.
    pub fn rebuild(&self, events: &[StoredEvent]) -> Result<(), ProjectionError> {
        let tenants: BTreeSet<_> = events.iter().map(|e| *e.tenant_id.as_uuid()).collect();
        for tenant in tenants {
            self.clear_tenant(TenantId::from_uuid(tenant));
        }
        for event in events {
            self.apply(&event.to_envelope())?;
        }
        debug!(event_count = events.len(), "read models rebuilt");
        Ok(())
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.parties.clear_tenant(tenant_id);
        self.items.clear_tenant(tenant_id);
        self.units.clear_tenant(tenant_id);
        self.warehouses.clear_tenant(tenant_id);
        self.users.clear_tenant(tenant_id);
        self.workflow_definitions.clear_tenant(tenant_id);
        self.purchase_requests.clear_tenant(tenant_id);
        self.purchase_orders.clear_tenant(tenant_id);
        self.customer_orders.clear_tenant(tenant_id);
        self.delivery_orders.clear_tenant(tenant_id);
        self.sales_invoices.clear_tenant(tenant_id);
        self.stock.clear_tenant(tenant_id);
        self.notifications.clear_tenant(tenant_id);
    }
}
