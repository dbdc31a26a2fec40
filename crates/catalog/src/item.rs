use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use tradeflow_events::Event;

use crate::normalize_code;
use crate::unit::UnitId;

/// Item identifier (stock-keeping unit).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub AggregateId);

impl ItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Discontinued,
}

/// Aggregate root: an item that can appear on purchasing and sales documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    description: Option<String>,
    unit_id: Option<UnitId>,
    standard_price: Money,
    status: ItemStatus,
    version: u64,
    created: bool,
}

impl Item {
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            description: None,
            unit_id: None,
            standard_price: Money::ZERO,
            status: ItemStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn unit_id(&self) -> Option<UnitId> {
        self.unit_id
    }

    pub fn standard_price(&self) -> Money {
        self.standard_price
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    /// New document lines may only reference active items.
    pub fn ensure_orderable(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::validation(format!("unknown item {}", self.id)));
        }
        if self.status == ItemStatus::Discontinued {
            return Err(DomainError::invariant(format!("item {} is discontinued", self.code)));
        }
        Ok(())
    }
}

impl AggregateRoot for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_id: UnitId,
    pub standard_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItem {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit_id: Option<UnitId>,
    pub standard_price: Option<Money>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscontinueItem {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemCommand {
    RegisterItem(RegisterItem),
    UpdateItem(UpdateItem),
    DiscontinueItem(DiscontinueItem),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_id: UnitId,
    pub standard_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdated {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub name: String,
    pub description: Option<String>,
    pub unit_id: UnitId,
    pub standard_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDiscontinued {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemEvent {
    ItemRegistered(ItemRegistered),
    ItemUpdated(ItemUpdated),
    ItemDiscontinued(ItemDiscontinued),
}

impl Event for ItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ItemEvent::ItemRegistered(_) => "catalog.item.registered",
            ItemEvent::ItemUpdated(_) => "catalog.item.updated",
            ItemEvent::ItemDiscontinued(_) => "catalog.item.discontinued",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ItemEvent::ItemRegistered(e) => e.occurred_at,
            ItemEvent::ItemUpdated(e) => e.occurred_at,
            ItemEvent::ItemDiscontinued(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Item {
    type Command = ItemCommand;
    type Event = ItemEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ItemEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.unit_id = Some(e.unit_id);
                self.standard_price = e.standard_price;
                self.status = ItemStatus::Active;
                self.created = true;
            }
            ItemEvent::ItemUpdated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.unit_id = Some(e.unit_id);
                self.standard_price = e.standard_price;
            }
            ItemEvent::ItemDiscontinued(_) => self.status = ItemStatus::Discontinued,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ItemCommand::RegisterItem(cmd) => self.handle_register(cmd),
            ItemCommand::UpdateItem(cmd) => self.handle_update(cmd),
            ItemCommand::DiscontinueItem(cmd) => self.handle_discontinue(cmd),
        }
    }
}

impl Item {
    fn ensure_existing(&self, tenant_id: TenantId, item_id: ItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<ItemEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(vec![ItemEvent::ItemRegistered(ItemRegistered {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            code: normalize_code(&cmd.code)?,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone().filter(|d| !d.trim().is_empty()),
            unit_id: cmd.unit_id,
            standard_price: cmd.standard_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateItem) -> Result<Vec<ItemEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.item_id)?;
        if self.status == ItemStatus::Discontinued {
            return Err(DomainError::invariant("discontinued items cannot be changed"));
        }
        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let unit_id = cmd
            .unit_id
            .or(self.unit_id)
            .ok_or_else(|| DomainError::invariant("item has no unit"))?;

        Ok(vec![ItemEvent::ItemUpdated(ItemUpdated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            name: name.trim().to_string(),
            description: cmd.description.clone().or_else(|| self.description.clone()),
            unit_id,
            standard_price: cmd.standard_price.unwrap_or(self.standard_price),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_discontinue(&self, cmd: &DiscontinueItem) -> Result<Vec<ItemEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.item_id)?;
        if self.status == ItemStatus::Discontinued {
            return Err(DomainError::conflict("item is already discontinued"));
        }
        Ok(vec![ItemEvent::ItemDiscontinued(ItemDiscontinued {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_events::execute;

    fn registered(tenant_id: TenantId) -> Item {
        let item_id = ItemId::new(AggregateId::new());
        let mut item = Item::empty(item_id);
        execute(
            &mut item,
            &ItemCommand::RegisterItem(RegisterItem {
                tenant_id,
                item_id,
                code: "bolt-m8".into(),
                name: "Bolt M8".into(),
                description: Some("  ".into()),
                unit_id: UnitId::new(AggregateId::new()),
                standard_price: Money::from_cents(45),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        item
    }

    #[test]
    fn register_sets_code_and_price() {
        let item = registered(TenantId::new());
        assert_eq!(item.code(), "BOLT-M8");
        assert_eq!(item.standard_price(), Money::from_cents(45));
        assert_eq!(item.description(), None);
        assert!(item.ensure_orderable().is_ok());
    }

    #[test]
    fn update_changes_price_only() {
        let tenant_id = TenantId::new();
        let mut item = registered(tenant_id);
        let item_id = item.id_typed();
        execute(
            &mut item,
            &ItemCommand::UpdateItem(UpdateItem {
                tenant_id,
                item_id,
                name: None,
                description: None,
                unit_id: None,
                standard_price: Some(Money::from_cents(50)),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(item.name(), "Bolt M8");
        assert_eq!(item.standard_price().cents(), 50);
    }

    #[test]
    fn discontinued_item_is_not_orderable() {
        let tenant_id = TenantId::new();
        let mut item = registered(tenant_id);
        let item_id = item.id_typed();
        execute(
            &mut item,
            &ItemCommand::DiscontinueItem(DiscontinueItem {
                tenant_id,
                item_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        match item.ensure_orderable() {
            Err(DomainError::InvariantViolation(msg)) if msg.contains("discontinued") => {}
            other => panic!("expected discontinued invariant, got {other:?}"),
        }
    }

    #[test]
    fn other_tenant_cannot_update() {
        let mut item = registered(TenantId::new());
        let err = execute(
            &mut item,
            &ItemCommand::DiscontinueItem(DiscontinueItem {
                tenant_id: TenantId::new(),
                item_id: ItemId::new(AggregateId::new()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
