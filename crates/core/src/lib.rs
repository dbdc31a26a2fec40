//! `tradeflow-core`: domain building blocks shared by every TradeFlow module.
//!
//! Pure domain primitives only: identifiers, the aggregate contract, the domain
//! error model and a handful of value objects. No IO lives here.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use value_object::{Money, ValueObject};
