use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::rank::{Rank, RankEquivalence};

/// Layer index in execution order.
pub type LayerId = u32;

// Role - Which tensor of a layer a dataspace is

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Inputs,
    Weights,
    Outputs,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Inputs, Role::Weights, Role::Outputs];

    pub fn parse(name: &str) -> Option<Role> {
        match name {
            "Inputs" => Some(Role::Inputs),
            "Weights" => Some(Role::Weights),
            "Outputs" => Some(Role::Outputs),
            _ => None,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Inputs => "Inputs",
            Role::Weights => "Weights",
            Role::Outputs => "Outputs",
        };
        f.write_str(s)
    }
}

// Dataspace - (layer, role) identity of one tensor

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dataspace {
    pub layer: LayerId,
    pub role: Role,
}

impl Dataspace {
    pub fn new(layer: LayerId, role: Role) -> Self {
        Dataspace { layer, role }
    }

    pub fn inputs(layer: LayerId) -> Self {
        Dataspace::new(layer, Role::Inputs)
    }

    pub fn outputs(layer: LayerId) -> Self {
        Dataspace::new(layer, Role::Outputs)
    }
}

impl Display for Dataspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.layer, self.role)
    }
}

// Workload - Per-role ranks and instance extents of one layer

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workload {
    pub instance: BTreeMap<Rank, u64>,
    pub dataspaces: BTreeMap<Role, Vec<Rank>>,
}

impl Workload {
    pub fn ranks(&self, role: Role) -> Option<&[Rank]> {
        self.dataspaces.get(&role).map(Vec::as_slice)
    }

    /// Extent of `rank` in the problem instance, 1 if unspecified.
    pub fn extent(&self, rank: Rank) -> u64 {
        self.instance.get(&rank).copied().unwrap_or(1)
    }
}

/// Ranks of `role` for a layer: the workload's list when known, otherwise the
/// canonical side of the equivalence (Outputs and Inputs only).
pub fn role_ranks(
    workload: Option<&Workload>,
    role: Role,
    equivalence: &RankEquivalence,
) -> Vec<Rank> {
    if let Some(ranks) = workload.and_then(|w| w.ranks(role)) {
        return ranks.to_vec();
    }
    match role {
        Role::Outputs => equivalence.output_ranks(),
        Role::Inputs => equivalence.input_ranks(),
        Role::Weights => Vec::new(),
    }
}

// DependencyGraph - Layer to the producers feeding its Inputs

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    producers: BTreeMap<LayerId, BTreeSet<LayerId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Record that `consumer` reads the Outputs of `producer`.
    pub fn add_edge(&mut self, producer: LayerId, consumer: LayerId) {
        self.producers.entry(consumer).or_default().insert(producer);
    }

    /// Register a layer with no producers.
    pub fn add_layer(&mut self, layer: LayerId) {
        self.producers.entry(layer).or_default();
    }

    pub fn with_edge(mut self, producer: LayerId, consumer: LayerId) -> Self {
        self.add_edge(producer, consumer);
        self
    }

    pub fn producers(&self, layer: LayerId) -> impl Iterator<Item = LayerId> + '_ {
        self.producers.get(&layer).into_iter().flatten().copied()
    }

    pub fn consumers(&self, layer: LayerId) -> impl Iterator<Item = LayerId> + '_ {
        self.producers
            .iter()
            .filter(move |(_, ps)| ps.contains(&layer))
            .map(|(c, _)| *c)
    }

    pub fn depends_on(&self, consumer: LayerId, producer: LayerId) -> bool {
        self.producers.get(&consumer).is_some_and(|ps| ps.contains(&producer))
    }

    /// Every layer named as a consumer or a producer, sorted.
    pub fn layers(&self) -> BTreeSet<LayerId> {
        let mut out: BTreeSet<LayerId> = self.producers.keys().copied().collect();
        out.extend(self.producers.values().flatten().copied());
        out
    }

    /// (producer, consumer) pairs, sorted by consumer then producer.
    pub fn edges(&self) -> Vec<(LayerId, LayerId)> {
        self.producers
            .iter()
            .flat_map(|(c, ps)| ps.iter().map(move |p| (*p, *c)))
            .collect()
    }

    /// Consumers with their producer sets, consumers without producers omitted.
    pub fn entries(&self) -> impl Iterator<Item = (LayerId, &BTreeSet<LayerId>)> {
        self.producers
            .iter()
            .filter(|(_, ps)| !ps.is_empty())
            .map(|(c, ps)| (*c, ps))
    }

    pub fn is_empty(&self) -> bool {
        self.producers.values().all(BTreeSet::is_empty)
    }
}

impl FromIterator<(LayerId, LayerId)> for DependencyGraph {
    fn from_iter<I: IntoIterator<Item = (LayerId, LayerId)>>(iter: I) -> Self {
        let mut graph = DependencyGraph::new();
        for (producer, consumer) in iter {
            graph.add_edge(producer, consumer);
        }
        graph
    }
}
