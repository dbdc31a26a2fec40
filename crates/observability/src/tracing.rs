//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Output format of the fmt subscriber.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Pretty,
}

impl Format {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Format::Pretty,
            _ => Format::Json,
        }
    }

    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT").map(|v| Self::parse(&v)).unwrap_or_default()
    }
}

/// Initialize tracing/logging for the process, filtered by `RUST_LOG`
/// (default `info`).
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with(format: Format) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let _ = match format {
        Format::Json => builder.json().with_target(false).try_init(),
        Format::Pretty => builder.pretty().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_formats_fall_back_to_json() {
        assert_eq!(Format::parse("pretty"), Format::Pretty);
        assert_eq!(Format::parse(" TEXT "), Format::Pretty);
        assert_eq!(Format::parse("xml"), Format::Json);
    }

    #[test]
    fn init_twice_is_harmless() {
        init_with(Format::Pretty);
        init_with(Format::Json);
        ::tracing::info!("still logging");
    }
}
