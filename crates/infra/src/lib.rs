//! Infrastructure layer: event storage, command dispatch, read models,
//! cross-document flows and process configuration.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod flows;
pub mod numbering;
pub mod projections;
pub mod read_model;
pub mod workers;


pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::{AppConfig, ConfigError, LogFormat};
pub use numbering::DocumentNumbering;
pub use projections::ReadModels;
