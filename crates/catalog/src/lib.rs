//! Item catalog master data: units of measure, items and warehouses.

pub mod item;
pub mod unit;
pub mod warehouse;

pub use item::{
    DiscontinueItem, Item, ItemCommand, ItemDiscontinued, ItemEvent, ItemId, ItemRegistered,
    ItemStatus, ItemUpdated, RegisterItem, UpdateItem,
};
pub use unit::{DefineUnit, RenameUnit, Unit, UnitCommand, UnitDefined, UnitEvent, UnitId, UnitRenamed};
pub use warehouse::{
    DeactivateWarehouse, RegisterWarehouse, UpdateWarehouse, Warehouse, WarehouseCommand,
    WarehouseDeactivated, WarehouseEvent, WarehouseId, WarehouseRegistered, WarehouseUpdated,
};

/// Master-data codes are trimmed, upper-cased and limited to 32 characters.
pub(crate) fn normalize_code(code: &str) -> Result<String, tradeflow_core::DomainError> {
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(tradeflow_core::DomainError::validation("code cannot be empty"));
    }
    if code.len() > 32 {
        return Err(tradeflow_core::DomainError::validation("code cannot exceed 32 characters"));
    }
    if code.chars().any(char::is_whitespace) {
        return Err(tradeflow_core::DomainError::validation("code cannot contain whitespace"));
    }
    Ok(code)
}
