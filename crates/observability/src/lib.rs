//! Process-wide tracing setup shared by the binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::Format;

/// Initialize tracing with the format named by `LOG_FORMAT` (JSON unless it
/// says `pretty`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(Format::from_env());
}
