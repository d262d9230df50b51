//! Fixed roster read from configuration.

use async_trait::async_trait;
use pvm_validators::{RosterSource, ValidatorError};
use shared_types::Node;

/// Roster source that always reports the same nodes.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    nodes: Vec<Node>,
}

impl StaticRoster {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl RosterSource for StaticRoster {
    async fn fetch_nodes(&self) -> Result<Vec<Node>, ValidatorError> {
        Ok(self.nodes.clone())
    }

    async fn validator_count(&self) -> Result<usize, ValidatorError> {
        Ok(self.nodes.iter().filter(|n| n.is_validator).count())
    }
}
