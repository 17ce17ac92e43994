use itertools::Itertools;

use crate::graph::{CommunityId, NodeId};

/// Final state of a finished optimization run.
#[derive(Debug, Clone)]
pub struct ModularityOptimizationResult {
    communities: Vec<CommunityId>,
    external_ids: Option<Vec<CommunityId>>,
    modularity: f64,
    iterations: u32,
    did_converge: bool,
}

impl ModularityOptimizationResult {
    pub(crate) fn new(
        communities: Vec<CommunityId>,
        external_ids: Option<Vec<CommunityId>>,
        modularity: f64,
        iterations: u32,
        did_converge: bool,
    ) -> Self {
        Self { communities, external_ids, modularity, iterations, did_converge }
    }

    /// Community of `node_id`, reported with the seed label when the run was seeded.
    pub fn community_of(&self, node_id: NodeId) -> CommunityId {
        let community_id = self.communities[node_id as usize];
        match &self.external_ids {
            Some(external_ids) => external_ids[community_id as usize],
            None => community_id,
        }
    }

    pub fn modularity(&self) -> f64 {
        self.modularity
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn did_converge(&self) -> bool {
        self.did_converge
    }

    pub fn node_count(&self) -> u64 {
        self.communities.len() as u64
    }

    /// `community_of` for every node in id order.
    pub fn communities(&self) -> impl Iterator<Item = CommunityId> + '_ {
        (0..self.node_count()).map(|node_id| self.community_of(node_id))
    }

    pub fn community_count(&self) -> usize {
        self.communities.iter().unique().count()
    }
}

/// The three ways a run can end.
#[derive(Debug, Clone)]
pub enum ModularityOptimizationOutcome {
    Converged(ModularityOptimizationResult),
    IterationLimitReached(ModularityOptimizationResult),
    Cancelled,
}

impl ModularityOptimizationOutcome {
    pub fn result(&self) -> Option<&ModularityOptimizationResult> {
        match self {
            Self::Converged(result) | Self::IterationLimitReached(result) => Some(result),
            Self::Cancelled => None,
        }
    }

    pub fn into_result(self) -> Option<ModularityOptimizationResult> {
        match self {
            Self::Converged(result) | Self::IterationLimitReached(result) => Some(result),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
