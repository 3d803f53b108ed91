//! Error types for the Weft runtime.
//!
//! Expected absence (a missing context value, an owner with nothing left to
//! tear down) is expressed with `Option` or a no-op. The variants here are
//! either faults that the runtime recovers from locally (a failing opcode) or
//! programming errors surfaced to the caller.

use thiserror::Error;

use crate::graph::NodeId;
use crate::lifecycle::OwnerId;
use crate::reactive::SubscriberId;

/// Boxed error returned by fallible opcode callbacks.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// An opcode returned an error during revalidation and was evicted.
    #[error("opcode {subscriber} on {origin} failed: {message}")]
    OpcodeFailed {
        subscriber: SubscriberId,
        origin: NodeId,
        message: String,
    },

    /// An opcode panicked during revalidation and was evicted.
    #[error("opcode {subscriber} on {origin} panicked: {message}")]
    OpcodePanicked {
        subscriber: SubscriberId,
        origin: NodeId,
        message: String,
    },

    /// A context value was required but no ancestor provides it.
    #[error("no `{type_name}` context is visible from {owner}")]
    MissingContext {
        type_name: &'static str,
        owner: OwnerId,
    },

    /// The owner is not part of the structural tree.
    #[error("{0} is not in the structural tree")]
    UnknownOwner(OwnerId),

    /// The owner was already inserted into the structural tree.
    #[error("{0} is already in the structural tree")]
    AlreadyInTree(OwnerId),

    /// A list key selector produced no key for an item.
    #[error("key selector returned no key for the item at index {index}")]
    KeyUnresolved { index: usize },

    /// Runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a recovered subscriber fault.
    pub fn is_opcode_fault(&self) -> bool {
        matches!(
            self,
            Error::OpcodeFailed { .. } | Error::OpcodePanicked { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_faults_are_classified() {
        let fault = Error::OpcodeFailed {
            subscriber: SubscriberId::new(),
            origin: NodeId::new(),
            message: "boom".into(),
        };
        assert!(fault.is_opcode_fault());
        assert!(fault.to_string().contains("boom"));

        let misuse = Error::KeyUnresolved { index: 3 };
        assert!(!misuse.is_opcode_fault());
        assert_eq!(
            misuse.to_string(),
            "key selector returned no key for the item at index 3"
        );
    }
}
