//! Customers and suppliers (event-sourced master data).

pub mod party;

pub use party::{
    ContactInfo, MAX_PAYMENT_TERMS_DAYS, Party, PartyCommand, PartyEvent, PartyId, PartyKind,
    PartyReactivated, PartyRegistered, PartyStatus, PartySuspended, PartyUpdated,
    ReactivateParty, RegisterParty, SuspendParty, UpdateDetails,
};
