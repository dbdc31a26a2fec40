use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use tradeflow_events::Event;

/// Customer or supplier identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub AggregateId);

impl PartyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

impl PartyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyKind::Customer => "customer",
            PartyKind::Supplier => "supplier",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Longest payment term accepted on a party record.
pub const MAX_PAYMENT_TERMS_DAYS: u32 = 365;

/// Aggregate root: a customer or supplier master record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    id: PartyId,
    tenant_id: Option<TenantId>,
    kind: PartyKind,
    code: String,
    name: String,
    contact: ContactInfo,
    payment_terms_days: u32,
    status: PartyStatus,
    version: u64,
    created: bool,
}

impl Party {
    pub fn empty(id: PartyId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: PartyKind::Customer,
            code: String::new(),
            name: String::new(),
            contact: ContactInfo::default(),
            payment_terms_days: 0,
            status: PartyStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn payment_terms_days(&self) -> u32 {
        self.payment_terms_days
    }

    pub fn status(&self) -> PartyStatus {
        self.status
    }

    /// Suspended parties cannot receive new orders.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == PartyStatus::Active
    }

    /// Checks that this party exists, is of `kind` and may transact.
    pub fn ensure_usable_as(&self, kind: PartyKind) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::validation(format!("unknown {}", kind.as_str())));
        }
        if self.kind != kind {
            return Err(DomainError::validation(format!(
                "party {} is a {}, not a {}",
                self.code,
                self.kind.as_str(),
                kind.as_str()
            )));
        }
        if !self.can_transact() {
            return Err(DomainError::invariant(format!("{} {} is suspended", kind.as_str(), self.code)));
        }
        Ok(())
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub code: String,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub payment_terms_days: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub payment_terms_days: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyCommand {
    RegisterParty(RegisterParty),
    UpdateDetails(UpdateDetails),
    SuspendParty(SuspendParty),
    ReactivateParty(ReactivateParty),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRegistered {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub code: String,
    pub name: String,
    pub contact: ContactInfo,
    pub payment_terms_days: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyUpdated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: String,
    pub contact: ContactInfo,
    pub payment_terms_days: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySuspended {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyReactivated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyEvent {
    PartyRegistered(PartyRegistered),
    PartyUpdated(PartyUpdated),
    PartySuspended(PartySuspended),
    PartyReactivated(PartyReactivated),
}

impl Event for PartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartyEvent::PartyRegistered(_) => "parties.party.registered",
            PartyEvent::PartyUpdated(_) => "parties.party.updated",
            PartyEvent::PartySuspended(_) => "parties.party.suspended",
            PartyEvent::PartyReactivated(_) => "parties.party.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartyEvent::PartyRegistered(e) => e.occurred_at,
            PartyEvent::PartyUpdated(e) => e.occurred_at,
            PartyEvent::PartySuspended(e) => e.occurred_at,
            PartyEvent::PartyReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Party {
    type Command = PartyCommand;
    type Event = PartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartyEvent::PartyRegistered(e) => {
                self.id = e.party_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.payment_terms_days = e.payment_terms_days;
                self.status = PartyStatus::Active;
                self.created = true;
            }
            PartyEvent::PartyUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.payment_terms_days = e.payment_terms_days;
            }
            PartyEvent::PartySuspended(_) => self.status = PartyStatus::Suspended,
            PartyEvent::PartyReactivated(_) => self.status = PartyStatus::Active,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartyCommand::RegisterParty(cmd) => self.handle_register(cmd),
            PartyCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            PartyCommand::SuspendParty(cmd) => self.handle_suspend(cmd),
            PartyCommand::ReactivateParty(cmd) => self.handle_reactivate(cmd),
        }
    }
}

fn validate_terms(days: u32) -> Result<(), DomainError> {
    if days > MAX_PAYMENT_TERMS_DAYS {
        return Err(DomainError::validation(format!(
            "payment terms cannot exceed {MAX_PAYMENT_TERMS_DAYS} days"
        )));
    }
    Ok(())
}

impl Party {
    fn ensure_existing(&self, tenant_id: TenantId, party_id: PartyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != party_id {
            return Err(DomainError::invariant("party_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterParty) -> Result<Vec<PartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("party already exists"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        validate_terms(cmd.payment_terms_days)?;

        Ok(vec![PartyEvent::PartyRegistered(PartyRegistered {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            kind: cmd.kind,
            code: cmd.code.trim().to_ascii_uppercase(),
            name: cmd.name.trim().to_string(),
            contact: cmd.contact.clone().unwrap_or_default(),
            payment_terms_days: cmd.payment_terms_days,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let payment_terms_days = cmd.payment_terms_days.unwrap_or(self.payment_terms_days);
        validate_terms(payment_terms_days)?;

        Ok(vec![PartyEvent::PartyUpdated(PartyUpdated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            name: name.trim().to_string(),
            contact: cmd.contact.clone().unwrap_or_else(|| self.contact.clone()),
            payment_terms_days,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendParty) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;
        if self.status == PartyStatus::Suspended {
            return Err(DomainError::conflict("party is already suspended"));
        }
        Ok(vec![PartyEvent::PartySuspended(PartySuspended {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateParty) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;
        if self.status == PartyStatus::Active {
            return Err(DomainError::conflict("party is already active"));
        }
        Ok(vec![PartyEvent::PartyReactivated(PartyReactivated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_events::execute;

    fn register(party: &mut Party, tenant_id: TenantId, kind: PartyKind) {
        let cmd = PartyCommand::RegisterParty(RegisterParty {
            tenant_id,
            party_id: party.id_typed(),
            kind,
            code: " acme ".into(),
            name: "Acme Trading".into(),
            contact: None,
            payment_terms_days: 30,
            occurred_at: Utc::now(),
        });
        execute(party, &cmd).unwrap();
    }

    fn new_party() -> Party {
        Party::empty(PartyId::new(AggregateId::new()))
    }

    #[test]
    fn register_normalizes_code() {
        let mut party = new_party();
        register(&mut party, TenantId::new(), PartyKind::Customer);
        assert_eq!(party.code(), "ACME");
        assert_eq!(party.payment_terms_days(), 30);
        assert!(party.can_transact());
    }

    #[test]
    fn register_rejects_duplicate_creation() {
        let mut party = new_party();
        let tenant_id = TenantId::new();
        register(&mut party, tenant_id, PartyKind::Customer);

        let err = party
            .handle(&PartyCommand::RegisterParty(RegisterParty {
                tenant_id,
                party_id: party.id_typed(),
                kind: PartyKind::Customer,
                code: "X".into(),
                name: "X".into(),
                contact: None,
                payment_terms_days: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn register_rejects_excessive_terms() {
        let party = new_party();
        let err = party
            .handle(&PartyCommand::RegisterParty(RegisterParty {
                tenant_id: TenantId::new(),
                party_id: party.id_typed(),
                kind: PartyKind::Supplier,
                code: "S1".into(),
                name: "Supplier".into(),
                contact: None,
                payment_terms_days: 400,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let mut party = new_party();
        let tenant_id = TenantId::new();
        register(&mut party, tenant_id, PartyKind::Supplier);

        let party_id = party.id_typed();
        execute(
            &mut party,
            &PartyCommand::UpdateDetails(UpdateDetails {
                tenant_id,
                party_id,
                name: Some("Acme Trading Ltd".into()),
                contact: None,
                payment_terms_days: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(party.name(), "Acme Trading Ltd");
        assert_eq!(party.payment_terms_days(), 30);
    }

    #[test]
    fn suspend_and_reactivate_toggle_transacting() {
        let mut party = new_party();
        let tenant_id = TenantId::new();
        register(&mut party, tenant_id, PartyKind::Customer);

        let party_id = party.id_typed();
        execute(
            &mut party,
            &PartyCommand::SuspendParty(SuspendParty {
                tenant_id,
                party_id,
                reason: Some("credit hold".into()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!party.can_transact());
        assert!(matches!(
            party.ensure_usable_as(PartyKind::Customer),
            Err(DomainError::InvariantViolation(_))
        ));

        execute(
            &mut party,
            &PartyCommand::ReactivateParty(ReactivateParty {
                tenant_id,
                party_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(party.ensure_usable_as(PartyKind::Customer).is_ok());
    }

    #[test]
    fn supplier_is_not_usable_as_customer() {
        let mut party = new_party();
        register(&mut party, TenantId::new(), PartyKind::Supplier);
        assert!(matches!(
            party.ensure_usable_as(PartyKind::Customer),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn commands_on_unknown_party_are_not_found() {
        let party = new_party();
        let err = party
            .handle(&PartyCommand::SuspendParty(SuspendParty {
                tenant_id: TenantId::new(),
                party_id: party.id_typed(),
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
