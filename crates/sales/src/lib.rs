//! Sales: customer orders and the delivery orders that fulfil them.
//!
//! Deterministic domain logic only (no IO, no HTTP, no storage). Creating a
//! delivery from an order is orchestrated by infra.

pub mod delivery;
pub mod order;

pub use delivery::{
    CreateDeliveryOrder, DeliveryDispatched, DeliveryLine, DeliveryLineData, DeliveryOrder,
    DeliveryOrderCommand, DeliveryOrderCreated, DeliveryOrderEvent, DeliveryOrderId,
    DispatchedLine, InvoicedQuantitiesRecorded, InvoicedQuantitiesReleased, NewDeliveryLine,
    RecordInvoiced, ReleaseInvoiced,
};
pub use order::{
    AddLine, AllocateDelivery, CreateCustomerOrder, CustomerOrder, CustomerOrderCommand,
    CustomerOrderCreated, CustomerOrderEvent, CustomerOrderId, DeliveryAllocated,
    DeliveryReleased, LineAdded, LineRemoved, LineUpdated, NewOrderLine, OrderLine,
    OrderLineData, ReleaseDelivery, RemoveLine, UpdateLine,
};
