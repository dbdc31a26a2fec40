//! Units of measure (`PCS`, `BOX`, `KG`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use tradeflow_events::Event;

use crate::normalize_code;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub AggregateId);

impl UnitId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for UnitId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    id: UnitId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    version: u64,
    created: bool,
}

impl Unit {
    pub fn empty(id: UnitId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
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
}

impl AggregateRoot for Unit {
    type Id = UnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineUnit {
    pub tenant_id: TenantId,
    pub unit_id: UnitId,
    pub code: String,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameUnit {
    pub tenant_id: TenantId,
    pub unit_id: UnitId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitCommand {
    DefineUnit(DefineUnit),
    RenameUnit(RenameUnit),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDefined {
    pub tenant_id: TenantId,
    pub unit_id: UnitId,
    pub code: String,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRenamed {
    pub tenant_id: TenantId,
    pub unit_id: UnitId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitEvent {
    UnitDefined(UnitDefined),
    UnitRenamed(UnitRenamed),
}

impl Event for UnitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UnitEvent::UnitDefined(_) => "catalog.unit.defined",
            UnitEvent::UnitRenamed(_) => "catalog.unit.renamed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UnitEvent::UnitDefined(e) => e.occurred_at,
            UnitEvent::UnitRenamed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Unit {
    type Command = UnitCommand;
    type Event = UnitEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UnitEvent::UnitDefined(e) => {
                self.id = e.unit_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.created = true;
            }
            UnitEvent::UnitRenamed(e) => self.name = e.name.clone(),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UnitCommand::DefineUnit(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("unit already exists"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                Ok(vec![UnitEvent::UnitDefined(UnitDefined {
                    tenant_id: cmd.tenant_id,
                    unit_id: cmd.unit_id,
                    code: normalize_code(&cmd.code)?,
                    name: cmd.name.trim().to_string(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            UnitCommand::RenameUnit(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.tenant_id != Some(cmd.tenant_id) {
                    return Err(DomainError::invariant("tenant mismatch"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                Ok(vec![UnitEvent::UnitRenamed(UnitRenamed {
                    tenant_id: cmd.tenant_id,
                    unit_id: cmd.unit_id,
                    name: cmd.name.trim().to_string(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_events::execute;

    #[test]
    fn define_then_rename() {
        let tenant_id = TenantId::new();
        let unit_id = UnitId::new(AggregateId::new());
        let mut unit = Unit::empty(unit_id);

        execute(
            &mut unit,
            &UnitCommand::DefineUnit(DefineUnit {
                tenant_id,
                unit_id,
                code: "pcs".into(),
                name: "Pieces".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(unit.code(), "PCS");

        execute(
            &mut unit,
            &UnitCommand::RenameUnit(RenameUnit {
                tenant_id,
                unit_id,
                name: "Piece".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(unit.name(), "Piece");
        assert_eq!(unit.version(), 2);
    }

    #[test]
    fn code_with_spaces_is_rejected() {
        let unit_id = UnitId::new(AggregateId::new());
        let err = Unit::empty(unit_id)
            .handle(&UnitCommand::DefineUnit(DefineUnit {
                tenant_id: TenantId::new(),
                unit_id,
                code: "big box".into(),
                name: "Big box".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
