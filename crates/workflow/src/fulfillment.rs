//! Outstanding-quantity bookkeeping for document lines.
//!
//! A line orders some quantity; downstream documents (a PO drawing on a PR line,
//! a DO drawing on a CO line, a receipt against a PO line, an invoice against a
//! DO line) allocate part of it. `outstanding = ordered - fulfilled` and is
//! never negative.

use serde::{Deserialize, Serialize};

use tradeflow_core::{AggregateId, DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// The downstream document (or receipt) holding the quantity.
    pub source: AggregateId,
    pub quantity: i64,
}

/// Quantity drawn from one upstream line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQuantity {
    pub line_no: u32,
    pub quantity: i64,
}

/// Non-empty, positive and each line referenced at most once.
pub fn validate_line_quantities(lines: &[LineQuantity]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("at least one line is required"));
    }
    let mut seen = std::collections::BTreeSet::new();
    for l in lines {
        if l.quantity <= 0 {
            return Err(DomainError::validation(format!("line {}: quantity must be positive", l.line_no)));
        }
        if !seen.insert(l.line_no) {
            return Err(DomainError::validation(format!("line {} referenced twice", l.line_no)));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    ordered: i64,
    allocations: Vec<Allocation>,
}

impl Fulfillment {
    pub fn new(ordered: i64) -> Self {
        Self {
            ordered,
            allocations: Vec::new(),
        }
    }

    pub fn ordered(&self) -> i64 {
        self.ordered
    }

    pub fn fulfilled(&self) -> i64 {
        self.allocations.iter().map(|a| a.quantity).sum()
    }

    pub fn outstanding(&self) -> i64 {
        self.ordered - self.fulfilled()
    }

    pub fn is_complete(&self) -> bool {
        self.outstanding() == 0
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn allocated_to(&self, source: AggregateId) -> i64 {
        self.allocations
            .iter()
            .filter(|a| a.source == source)
            .map(|a| a.quantity)
            .sum()
    }

    /// Changing the ordered quantity below what is already fulfilled is refused.
    pub fn check_reorder(&self, ordered: i64) -> DomainResult<()> {
        if ordered <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if ordered < self.fulfilled() {
            return Err(DomainError::invariant(format!(
                "quantity {ordered} is below the already fulfilled {}",
                self.fulfilled()
            )));
        }
        Ok(())
    }

    pub fn set_ordered(&mut self, ordered: i64) {
        self.ordered = ordered;
    }

    pub fn check_allocate(&self, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let outstanding = self.outstanding();
        if quantity > outstanding {
            return Err(DomainError::invariant(format!(
                "quantity {quantity} exceeds outstanding quantity {outstanding}"
            )));
        }
        Ok(())
    }

    /// Record an allocation already validated by [`Fulfillment::check_allocate`].
    pub fn allocate(&mut self, source: AggregateId, quantity: i64) {
        match self.allocations.iter_mut().find(|a| a.source == source) {
            Some(existing) => existing.quantity += quantity,
            None => self.allocations.push(Allocation { source, quantity }),
        }
    }

    /// Drop everything held by `source`; returns the released quantity.
    pub fn release(&mut self, source: AggregateId) -> i64 {
        let released = self.allocated_to(source);
        self.allocations.retain(|a| a.source != source);
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn partial_allocations_reduce_outstanding() {
        let mut f = Fulfillment::new(10);
        let a = AggregateId::new();
        let b = AggregateId::new();

        f.check_allocate(4).unwrap();
        f.allocate(a, 4);
        f.check_allocate(6).unwrap();
        f.allocate(b, 6);

        assert_eq!(f.outstanding(), 0);
        assert!(f.is_complete());
        assert!(matches!(f.check_allocate(1), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn release_returns_quantity_to_outstanding() {
        let mut f = Fulfillment::new(5);
        let a = AggregateId::new();
        f.allocate(a, 2);
        f.allocate(a, 1);

        assert_eq!(f.release(a), 3);
        assert_eq!(f.outstanding(), 5);
        assert_eq!(f.release(a), 0);
    }

    #[test]
    fn cannot_reorder_below_fulfilled() {
        let mut f = Fulfillment::new(8);
        f.allocate(AggregateId::new(), 5);
        assert!(f.check_reorder(4).is_err());
        assert!(f.check_reorder(5).is_ok());
    }

    #[test]
    fn duplicate_line_refs_are_rejected() {
        let lines = [
            LineQuantity { line_no: 1, quantity: 2 },
            LineQuantity { line_no: 1, quantity: 3 },
        ];
        assert!(validate_line_quantities(&lines).is_err());
        assert!(validate_line_quantities(&[]).is_err());
        assert!(validate_line_quantities(&lines[..1]).is_ok());
    }

    proptest! {
        #[test]
        fn outstanding_never_negative(ordered in 1i64..1_000, requests in proptest::collection::vec(1i64..400, 0..20)) {
            let mut f = Fulfillment::new(ordered);
            for q in requests {
                if f.check_allocate(q).is_ok() {
                    f.allocate(AggregateId::new(), q);
                }
                prop_assert!(f.outstanding() >= 0);
                prop_assert_eq!(f.ordered(), f.fulfilled() + f.outstanding());
            }
        }
    }
}
