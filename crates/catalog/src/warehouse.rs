use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use tradeflow_events::Event;

use crate::normalize_code;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(pub AggregateId);

impl WarehouseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A stocking location. Goods are received into and dispatched from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warehouse {
    id: WarehouseId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    address: Option<String>,
    active: bool,
    version: u64,
    created: bool,
}

impl Warehouse {
    pub fn empty(id: WarehouseId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            address: None,
            active: false,
            version: 0,
            created: false,
        }
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

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn ensure_operational(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::validation(format!("unknown warehouse {}", self.id)));
        }
        if !self.active {
            return Err(DomainError::invariant(format!("warehouse {} is deactivated", self.code)));
        }
        Ok(())
    }
}

impl AggregateRoot for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWarehouse {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateWarehouse {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub name: Option<String>,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateWarehouse {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseCommand {
    RegisterWarehouse(RegisterWarehouse),
    UpdateWarehouse(UpdateWarehouse),
    DeactivateWarehouse(DeactivateWarehouse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRegistered {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseUpdated {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseDeactivated {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseEvent {
    WarehouseRegistered(WarehouseRegistered),
    WarehouseUpdated(WarehouseUpdated),
    WarehouseDeactivated(WarehouseDeactivated),
}

impl Event for WarehouseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseEvent::WarehouseRegistered(_) => "catalog.warehouse.registered",
            WarehouseEvent::WarehouseUpdated(_) => "catalog.warehouse.updated",
            WarehouseEvent::WarehouseDeactivated(_) => "catalog.warehouse.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WarehouseEvent::WarehouseRegistered(e) => e.occurred_at,
            WarehouseEvent::WarehouseUpdated(e) => e.occurred_at,
            WarehouseEvent::WarehouseDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Warehouse {
    type Command = WarehouseCommand;
    type Event = WarehouseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WarehouseEvent::WarehouseRegistered(e) => {
                self.id = e.warehouse_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.address = e.address.clone();
                self.active = true;
                self.created = true;
            }
            WarehouseEvent::WarehouseUpdated(e) => {
                self.name = e.name.clone();
                self.address = e.address.clone();
            }
            WarehouseEvent::WarehouseDeactivated(_) => self.active = false,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WarehouseCommand::RegisterWarehouse(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("warehouse already exists"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                Ok(vec![WarehouseEvent::WarehouseRegistered(WarehouseRegistered {
                    tenant_id: cmd.tenant_id,
                    warehouse_id: cmd.warehouse_id,
                    code: normalize_code(&cmd.code)?,
                    name: cmd.name.trim().to_string(),
                    address: cmd.address.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            WarehouseCommand::UpdateWarehouse(cmd) => {
                self.ensure_existing(cmd.tenant_id)?;
                let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
                if name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                Ok(vec![WarehouseEvent::WarehouseUpdated(WarehouseUpdated {
                    tenant_id: cmd.tenant_id,
                    warehouse_id: cmd.warehouse_id,
                    name: name.trim().to_string(),
                    address: cmd.address.clone().or_else(|| self.address.clone()),
                    occurred_at: cmd.occurred_at,
                })])
            }
            WarehouseCommand::DeactivateWarehouse(cmd) => {
                self.ensure_existing(cmd.tenant_id)?;
                if !self.active {
                    return Err(DomainError::conflict("warehouse is already deactivated"));
                }
                Ok(vec![WarehouseEvent::WarehouseDeactivated(WarehouseDeactivated {
                    tenant_id: cmd.tenant_id,
                    warehouse_id: cmd.warehouse_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Warehouse {
    fn ensure_existing(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}
