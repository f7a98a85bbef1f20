//! GUID provider
//!
//! Every successful lock write stamps the row with a fresh GUID so that
//! watchers can tell two writes with the same index apart.

use crate::error::{LocketError, Result};

/// Source of opaque unique write tokens
pub trait GuidProvider: Send + Sync {
    fn next_guid(&self) -> Result<String>;
}

/// Random (v4) UUID provider
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGuidProvider;

impl GuidProvider for UuidGuidProvider {
    fn next_guid(&self) -> Result<String> {
        let guid = uuid::Uuid::new_v4();
        if guid.is_nil() {
            return Err(LocketError::GuidGeneration("nil uuid".to_string()));
        }
        Ok(guid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_guids_are_unique() {
        let provider = UuidGuidProvider;
        let first = provider.next_guid().unwrap();
        let second = provider.next_guid().unwrap();

        assert_ne!(first, second);
        assert_eq!(first.len(), 36);
    }
}
