//! Purchasing: purchase requests, purchase orders and goods receipts.
//!
//! Deterministic domain logic only (no IO, no HTTP, no storage). Cross-document
//! steps such as converting a request into an order are orchestrated by infra.

pub mod order;
pub mod request;

pub use order::{
    AddLine, CreatePurchaseOrder, GoodsReceived, NewOrderLine, OrderLineData, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderEvent, PurchaseOrderId,
    PurchaseOrderLine, PurchaseOrderLineAdded, PurchaseOrderLineRemoved, PurchaseOrderLineUpdated,
    ReceiveGoods, ReceivedLine, RemoveLine, RequestLineRef, UpdateLine,
};
pub use request::{
    AddRequestLine, CreatePurchaseRequest, NewRequestLine, OrderedQuantitiesRecorded,
    OrderedQuantitiesReleased, PurchaseRequest, PurchaseRequestCommand, PurchaseRequestCreated,
    PurchaseRequestEvent, PurchaseRequestId, RecordOrdered, ReleaseOrdered, RemoveRequestLine,
    RequestLine, RequestLineAdded, RequestLineData, RequestLineRemoved, RequestLineUpdated,
    UpdateRequestLine,
};
