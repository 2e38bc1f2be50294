//! redb table definitions for the ShardGrid state store.

use redb::TableDefinition;

/// Deployment state keyed by `{deployment_id}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");
