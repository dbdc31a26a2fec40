use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradeflow_core::{AggregateId, DomainError};

/// The documents that go through approval.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PurchaseRequest,
    PurchaseOrder,
    CustomerOrder,
    DeliveryOrder,
    SalesInvoice,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::PurchaseRequest,
        DocumentKind::PurchaseOrder,
        DocumentKind::CustomerOrder,
        DocumentKind::DeliveryOrder,
        DocumentKind::SalesInvoice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::PurchaseRequest => "purchase_request",
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::CustomerOrder => "customer_order",
            DocumentKind::DeliveryOrder => "delivery_order",
            DocumentKind::SalesInvoice => "sales_invoice",
        }
    }

    /// Prefix of human-facing document numbers (`PO-000042`).
    pub fn number_prefix(self) -> &'static str {
        match self {
            DocumentKind::PurchaseRequest => "PR",
            DocumentKind::PurchaseOrder => "PO",
            DocumentKind::CustomerOrder => "CO",
            DocumentKind::DeliveryOrder => "DO",
            DocumentKind::SalesInvoice => "SI",
        }
    }

    /// Event-store aggregate type of the document stream.
    pub fn aggregate_type(self) -> &'static str {
        match self {
            DocumentKind::PurchaseRequest => "purchasing.request",
            DocumentKind::PurchaseOrder => "purchasing.order",
            DocumentKind::CustomerOrder => "sales.order",
            DocumentKind::DeliveryOrder => "sales.delivery",
            DocumentKind::SalesInvoice => "invoicing.invoice",
        }
    }

    pub fn from_aggregate_type(aggregate_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.aggregate_type() == aggregate_type)
    }

    pub fn title(self) -> &'static str {
        match self {
            DocumentKind::PurchaseRequest => "Purchase Request",
            DocumentKind::PurchaseOrder => "Purchase Order",
            DocumentKind::CustomerOrder => "Customer Order",
            DocumentKind::DeliveryOrder => "Delivery Order",
            DocumentKind::SalesInvoice => "Sales Invoice",
        }
    }

    /// Fixed stream id of this kind's route definition. Streams are keyed by
    /// tenant as well, so the same id is reused by every tenant.
    pub fn definition_id(self) -> AggregateId {
        let n: u128 = match self {
            DocumentKind::PurchaseRequest => 1,
            DocumentKind::PurchaseOrder => 2,
            DocumentKind::CustomerOrder => 3,
            DocumentKind::DeliveryOrder => 4,
            DocumentKind::SalesInvoice => 5,
        };
        AggregateId::from_uuid(Uuid::from_u128(0x7f10_0000_0000_7000_8000_0000_0000_0000 | n))
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = DomainError;

    /// Accepts `purchase_order`, `purchase-order` and the short prefix `PO`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized || k.number_prefix().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| DomainError::validation(format!("unknown document kind: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slugs_and_prefixes() {
        assert_eq!("purchase-order".parse::<DocumentKind>().unwrap(), DocumentKind::PurchaseOrder);
        assert_eq!("SI".parse::<DocumentKind>().unwrap(), DocumentKind::SalesInvoice);
        assert!("quote".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn definition_ids_are_distinct() {
        let ids: std::collections::HashSet<_> =
            DocumentKind::ALL.iter().map(|k| k.definition_id()).collect();
        assert_eq!(ids.len(), DocumentKind::ALL.len());
    }

    #[test]
    fn aggregate_type_round_trips() {
        for kind in DocumentKind::ALL {
            assert_eq!(DocumentKind::from_aggregate_type(kind.aggregate_type()), Some(kind));
        }
    }
}
