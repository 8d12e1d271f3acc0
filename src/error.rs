//! Shield error taxonomy
//!
//! Hot-path failures are absorbed where they happen (the packet still gets a
//! verdict); only aggregator-level errors travel up to the scheduler.

use thiserror::Error;

/// Errors surfaced by the shield components
#[derive(Debug, Error)]
pub enum ShieldError {
    /// Payload shorter than a DNS header or not an IPv4/UDP datagram
    #[error("Malformed input: {0}")]
    MalformedInput(&'static str),

    /// A bounded structure (or the allocator) refused a new entry
    #[error("Resource exhausted: {resource} (limit {limit})")]
    ResourceExhausted { resource: &'static str, limit: usize },

    /// The synthetic reply could not be routed back to the client
    #[error("Routing failure: {0}")]
    Routing(String),

    /// A whole aggregation epoch failed
    #[error("Scheduling failure: {0}")]
    Scheduling(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl ShieldError {
    /// Shorthand for a bounded-structure overflow
    pub fn exhausted(resource: &'static str, limit: usize) -> Self {
        ShieldError::ResourceExhausted { resource, limit }
    }

    /// Whether this error only means "best effort state, keep going"
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, ShieldError::ResourceExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, ShieldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_display() {
        let err = ShieldError::exhausted("blocklist", 8);
        assert_eq!(err.to_string(), "Resource exhausted: blocklist (limit 8)");
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_routing_is_not_exhaustion() {
        let err = ShieldError::Routing("no route to 10.0.0.5".to_string());
        assert!(!err.is_resource_exhaustion());
        assert!(err.to_string().contains("10.0.0.5"));
    }
}
