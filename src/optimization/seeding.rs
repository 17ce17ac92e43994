use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;

use crate::error::ModularityError;
use crate::graph::{CommunityId, NodeId, SeedProperty};

/// Label reported for a node without a seed, `max(max_seed, 0) + 1 + node_id`.
///
/// Real labels are non-negative and at most `max_seed`, so synthetic ones start right above.
/// This is one more than a plain `max_seed + node_id`: with seeds `[7, 7, -1, 42]` node 2
/// reports 45, not 44, and an unseeded node 0 never lands on the largest real label.
/// Returns `None` when the label does not fit a community id.
pub fn synthetic_label(node_id: NodeId, max_seed: Option<i64>) -> Option<CommunityId> {
    let base = max_seed.unwrap_or(0).max(0) as CommunityId;
    base.checked_add(1)?.checked_add(node_id)
}

/// External seed labels to dense community ids and back.
///
/// Only real labels are looked up, every unseeded node gets a fresh id of its own.
#[derive(Debug, Clone, Default)]
pub struct SeedMapping {
    internal_ids: HashMap<i64, CommunityId>,
    external_ids: Vec<CommunityId>,
}

impl SeedMapping {
    fn map_seed(&mut self, label: i64) -> CommunityId {
        let next_id = self.external_ids.len() as CommunityId;
        let external_ids = &mut self.external_ids;
        *self.internal_ids.entry(label).or_insert_with(|| {
            external_ids.push(label as CommunityId);
            next_id
        })
    }

    fn map_unseeded(&mut self, synthetic_label: CommunityId) -> CommunityId {
        self.external_ids.push(synthetic_label);
        self.external_ids.len() as CommunityId - 1
    }

    pub fn internal_id(&self, label: i64) -> Option<CommunityId> {
        self.internal_ids.get(&label).copied()
    }

    pub fn external_id(&self, community_id: CommunityId) -> CommunityId {
        self.external_ids[community_id as usize]
    }

    pub fn len(&self) -> usize {
        self.external_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.external_ids.is_empty()
    }

    /// The reverse mapping alone, all that is needed to report results.
    pub fn into_external_ids(self) -> Vec<CommunityId> {
        self.external_ids
    }
}

/// Assign every node the dense id of its seed label, first come first served in node order.
pub fn init_seeding(seed_property: &dyn SeedProperty, communities: &[AtomicU64]) -> Result<SeedMapping> {
    let max_seed = seed_property.max_long_property_value();
    let mut mapping = SeedMapping::default();
    for (node_id, community) in communities.iter().enumerate() {
        let node_id = node_id as NodeId;
        let seed = seed_property.long_value(node_id);
        let community_id = if seed >= 0 {
            mapping.map_seed(seed)
        } else {
            let label = synthetic_label(node_id, max_seed).ok_or(ModularityError::SeedLabelOverflow(node_id))?;
            mapping.map_unseeded(label)
        };
        community.store(community_id, Ordering::Relaxed);
    }
    Ok(mapping)
}
