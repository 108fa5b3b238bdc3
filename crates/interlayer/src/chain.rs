//! Chain ordering search.
//!
//! Layers are visited in execution order and cut into maximal dependency
//! chains. Inside a chain every edge is resolved greedily, left to right, by
//! keeping both layouts and paying a rehash or by adopting one of the two
//! propagation proposals. Chains longer than two layers are swept in both
//! directions and the cheaper sweep is kept. Edges between chains always pay
//! a rehash on baseline layouts.
//!
//! The greedy commit is not globally optimal: a later edge is priced against
//! layouts an earlier edge already committed.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::Cycles;
use crate::aggregate::{
    DependencyGroup, Reorganization, SharedConstraints, dependency_groups, reorganizations,
    shared_constraints,
};
use crate::compat::check_compatibility;
use crate::config::AnalysisConfig;
use crate::dataspace::{DependencyGraph, LayerId, Role, Workload, role_ranks};
use crate::error::AnalysisError;
use crate::layout::LayoutDescriptor;
use crate::oracle::CostOracle;
use crate::propagate::{Direction, Proposal, proposals};
use crate::rank::Rank;
use crate::rehash::{RehashEstimate, estimate_rehash};

// Network - Baseline layouts, workloads and dependency maps of a whole model

#[derive(Debug, Clone, Default)]
pub struct Network {
    /// Baseline layout per layer, one descriptor covering all of its ranks.
    pub layouts: BTreeMap<LayerId, LayoutDescriptor>,
    pub workloads: BTreeMap<LayerId, Workload>,
    /// Edges whose endpoints may share a layout; these form chains.
    pub dependent: DependencyGraph,
    /// All producer edges, including those through a dependency breaker.
    /// `None` treats every adjacent pair of layers as consecutive.
    pub consecutive: Option<DependencyGraph>,
}

impl Network {
    pub fn new(dependent: DependencyGraph) -> Self {
        Network {
            dependent,
            ..Default::default()
        }
    }

    pub fn with_layout(mut self, layer: LayerId, layout: LayoutDescriptor) -> Self {
        self.layouts.insert(layer, layout);
        self
    }

    pub fn with_workload(mut self, layer: LayerId, workload: Workload) -> Self {
        self.workloads.insert(layer, workload);
        self
    }

    pub fn with_consecutive(mut self, consecutive: DependencyGraph) -> Self {
        self.consecutive = Some(consecutive);
        self
    }

    /// Every known layer in execution order.
    pub fn layers(&self) -> Vec<LayerId> {
        let mut layers = self.dependent.layers();
        layers.extend(self.layouts.keys().copied());
        if let Some(c) = &self.consecutive {
            layers.extend(c.layers());
        }
        layers.into_iter().collect()
    }

    pub fn ranks(&self, layer: LayerId, role: Role, config: &AnalysisConfig) -> Vec<Rank> {
        role_ranks(self.workloads.get(&layer), role, &config.equivalence)
    }

    fn baseline(&self, layer: LayerId) -> Result<&LayoutDescriptor, AnalysisError> {
        self.layouts.get(&layer).ok_or(AnalysisError::MissingLayout(layer))
    }

    /// (producer, consumer) edges that may force a rehash at a chain boundary.
    fn consecutive_edges(&self, layers: &[LayerId]) -> Vec<(LayerId, LayerId)> {
        match &self.consecutive {
            Some(graph) => graph.edges(),
            None => layers.windows(2).map(|w| (w[0], w[1])).collect(),
        }
    }
}

/// Cut `layers` (in execution order) into maximal runs where each layer
/// depends on the one before it.
pub fn find_chains(layers: &[LayerId], dependent: &DependencyGraph) -> Vec<Vec<LayerId>> {
    let mut chains: Vec<Vec<LayerId>> = Vec::new();
    for &layer in layers {
        match chains.last_mut() {
            Some(chain) if chain.last().is_some_and(|&prev| dependent.depends_on(layer, prev)) => {
                chain.push(layer)
            }
            _ => chains.push(vec![layer]),
        }
    }
    chains
}

// Decisions - What happened on each edge

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeAction {
    /// Layouts already compatible.
    Keep,
    Rehash,
    PropagateForward,
    PropagateBackward,
}

impl From<Direction> for EdgeAction {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Forward => EdgeAction::PropagateForward,
            Direction::Backward => EdgeAction::PropagateBackward,
        }
    }
}

impl Display for EdgeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeAction::Keep => "keep",
            EdgeAction::Rehash => "rehash",
            EdgeAction::PropagateForward => "propagate-forward",
            EdgeAction::PropagateBackward => "propagate-backward",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeDecision {
    pub producer: LayerId,
    pub consumer: LayerId,
    pub action: EdgeAction,
    /// Both layers at their current layouts plus the rehash estimate.
    pub keep_cost: Option<Cycles>,
    pub forward_cost: Option<Cycles>,
    pub backward_cost: Option<Cycles>,
    /// False when a side of the rehash estimate could not be priced.
    pub rehash_complete: bool,
    /// Rehash charged for this edge on the final layouts of the sweep.
    pub rehash_charged: Cycles,
}

impl EdgeDecision {
    fn keep(producer: LayerId, consumer: LayerId) -> Self {
        EdgeDecision {
            producer,
            consumer,
            action: EdgeAction::Keep,
            keep_cost: None,
            forward_cost: None,
            backward_cost: None,
            rehash_complete: true,
            rehash_charged: 0,
        }
    }
}

// ChainState - Running layouts and decision log of one sweep

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    pub layouts: BTreeMap<LayerId, LayoutDescriptor>,
    pub decisions: Vec<EdgeDecision>,
}

impl ChainState {
    fn layout(&self, layer: LayerId) -> Result<&LayoutDescriptor, AnalysisError> {
        self.layouts.get(&layer).ok_or(AnalysisError::MissingLayout(layer))
    }

    /// Record a decision and adopt the proposal's layouts, if any.
    fn commit(mut self, decision: EdgeDecision, proposal: Option<Proposal>) -> ChainState {
        if let Some(p) = proposal {
            self.layouts.insert(decision.producer, p.producer);
            self.layouts.insert(decision.consumer, p.consumer);
        }
        self.decisions.push(decision);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepOrder {
    Forward,
    Reverse,
}

/// Edges visited by a sweep: `(i, next(i))` for each `i` in sweep order whose
/// chain successor exists. Each edge stays (producer, consumer).
pub fn sweep_pairs(chain: &[LayerId], order: SweepOrder) -> Vec<(LayerId, LayerId)> {
    let forward: Vec<(LayerId, LayerId)> = chain.windows(2).map(|w| (w[0], w[1])).collect();
    match order {
        SweepOrder::Forward => forward,
        SweepOrder::Reverse => forward.into_iter().rev().collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrialSummary {
    pub order: SweepOrder,
    pub processing: Cycles,
    pub rehash: Cycles,
    pub total: Cycles,
}

#[derive(Debug, Clone)]
struct Trial {
    summary: TrialSummary,
    state: ChainState,
    layer_latency: BTreeMap<LayerId, Cycles>,
}

// ChainReport - Materialized result of one chain

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainReport {
    pub layers: Vec<LayerId>,
    pub order: SweepOrder,
    pub trials: Vec<TrialSummary>,
    pub processing: Cycles,
    /// Rehash charged on the chain's own edges.
    pub rehash: Cycles,
    pub total: Cycles,
    /// The chain's share of the network breakdown. [`ChainSearch::run`] fills
    /// in processing and in-chain rehash only; [`analyze_network`] adds the
    /// reorganizations and boundary rehashes leaving the chain.
    pub breakdown: LatencyBreakdown,
    pub layer_latency: BTreeMap<LayerId, Cycles>,
    pub layouts: BTreeMap<LayerId, LayoutDescriptor>,
    pub decisions: Vec<EdgeDecision>,
}

// ChainSearch - Greedy edge resolution over one chain

pub struct ChainSearch<'a, O: CostOracle + ?Sized> {
    network: &'a Network,
    config: &'a AnalysisConfig,
    oracle: &'a mut O,
}

impl<'a, O: CostOracle + ?Sized> ChainSearch<'a, O> {
    pub fn new(network: &'a Network, config: &'a AnalysisConfig, oracle: &'a mut O) -> Self {
        ChainSearch { network, config, oracle }
    }

    fn price(
        &mut self,
        layer: LayerId,
        layout: &LayoutDescriptor,
    ) -> Result<Cycles, AnalysisError> {
        self.oracle
            .submit(layer, layout)
            .map_err(|source| AnalysisError::Oracle { layer, source })
    }

    /// Resolve one edge against the running state.
    fn step(
        &mut self,
        state: ChainState,
        producer: LayerId,
        consumer: LayerId,
    ) -> Result<ChainState, AnalysisError> {
        let lp = state.layout(producer)?.clone();
        let lc = state.layout(consumer)?.clone();
        let compat = check_compatibility(
            &lp,
            &lc,
            &self.network.ranks(producer, Role::Outputs, self.config),
            &self.network.ranks(consumer, Role::Inputs, self.config),
            self.config,
        );
        if compat.is_compatible() {
            debug!(producer, consumer, "layouts compatible, keeping");
            return Ok(state.commit(EdgeDecision::keep(producer, consumer), None));
        }

        let rehash = estimate_rehash(&lp, &lc, self.config);
        let keep_cost = self
            .price(producer, &lp)?
            .saturating_add(self.price(consumer, &lc)?)
            .saturating_add(rehash.total);

        let mut forward_cost = None;
        let mut backward_cost = None;
        let mut best: Option<(Cycles, Proposal)> = None;
        for proposal in proposals(&lp, &lc, self.config) {
            let cost = self
                .price(producer, &proposal.producer)?
                .saturating_add(self.price(consumer, &proposal.consumer)?);
            match proposal.direction {
                Direction::Forward => forward_cost = Some(cost),
                Direction::Backward => backward_cost = Some(cost),
            }
            if best.as_ref().is_none_or(|(c, _)| cost < *c) {
                best = Some((cost, proposal));
            }
        }

        let (action, adopted) = match best {
            Some((cost, proposal)) if cost <= keep_cost => {
                (EdgeAction::from(proposal.direction), Some(proposal))
            }
            _ => (EdgeAction::Rehash, None),
        };
        debug!(
            producer,
            consumer,
            %action,
            keep_cost,
            ?forward_cost,
            ?backward_cost,
            "edge resolved"
        );

        let decision = EdgeDecision {
            producer,
            consumer,
            action,
            keep_cost: Some(keep_cost),
            forward_cost,
            backward_cost,
            rehash_complete: rehash.is_complete(),
            rehash_charged: 0,
        };
        Ok(state.commit(decision, adopted))
    }

    /// One sweep over `chain` in `order`, starting from baseline layouts.
    fn sweep(&mut self, chain: &[LayerId], order: SweepOrder) -> Result<Trial, AnalysisError> {
        let mut initial = ChainState {
            layouts: BTreeMap::new(),
            decisions: Vec::new(),
        };
        for &layer in chain {
            initial.layouts.insert(layer, self.network.baseline(layer)?.clone());
        }

        let mut state = sweep_pairs(chain, order)
            .into_iter()
            .try_fold(initial, |state, (p, c)| self.step(state, p, c))?;

        let mut layer_latency = BTreeMap::new();
        let mut processing: Cycles = 0;
        for &layer in chain {
            let cycles = self.price(layer, state.layout(layer)?)?;
            layer_latency.insert(layer, cycles);
            processing = processing.saturating_add(cycles);
        }

        let mut rehash: Cycles = 0;
        for i in 0..state.decisions.len() {
            if state.decisions[i].action != EdgeAction::Rehash {
                continue;
            }
            let (p, c) = (state.decisions[i].producer, state.decisions[i].consumer);
            let charged = estimate_rehash(state.layout(p)?, state.layout(c)?, self.config).total;
            state.decisions[i].rehash_charged = charged;
            rehash = rehash.saturating_add(charged);
        }

        let summary = TrialSummary {
            order,
            processing,
            rehash,
            total: processing.saturating_add(rehash),
        };
        debug!(?order, processing, rehash, total = summary.total, "sweep finished");
        Ok(Trial {
            summary,
            state,
            layer_latency,
        })
    }

    /// Resolve a whole chain. A single layer is priced at its baseline layout.
    #[instrument(skip_all, fields(first = chain.first().copied(), len = chain.len()))]
    pub fn run(&mut self, chain: &[LayerId]) -> Result<ChainReport, AnalysisError> {
        let mut trials = vec![self.sweep(chain, SweepOrder::Forward)?];
        if chain.len() > 2 {
            trials.push(self.sweep(chain, SweepOrder::Reverse)?);
        }
        let summaries: Vec<TrialSummary> = trials.iter().map(|t| t.summary).collect();

        let mut best = 0;
        for (i, t) in trials.iter().enumerate() {
            if t.summary.total < trials[best].summary.total {
                best = i;
            }
        }
        let winner = trials.swap_remove(best);
        info!(order = ?winner.summary.order, total = winner.summary.total, "chain resolved");

        Ok(ChainReport {
            layers: chain.to_vec(),
            order: winner.summary.order,
            trials: summaries,
            processing: winner.summary.processing,
            rehash: winner.summary.rehash,
            total: winner.summary.total,
            breakdown: LatencyBreakdown::new(winner.summary.processing, 0, winner.summary.rehash),
            layer_latency: winner.layer_latency,
            layouts: winner.state.layouts,
            decisions: winner.state.decisions,
        })
    }
}

// Network analysis

/// Rehash charged on an edge that crosses a chain boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundaryRehash {
    pub producer: LayerId,
    pub consumer: LayerId,
    pub estimate: RehashEstimate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyBreakdown {
    pub processing: Cycles,
    pub reorganization: Cycles,
    pub rehash: Cycles,
    /// max(reorganization, rehash)
    pub interlayer_memory: Cycles,
    /// processing + interlayer_memory
    pub total: Cycles,
    pub reorganization_ratio: f64,
    pub rehash_ratio: f64,
    pub interlayer_memory_ratio: f64,
    pub processing_efficiency: f64,
}

impl LatencyBreakdown {
    pub fn new(processing: Cycles, reorganization: Cycles, rehash: Cycles) -> Self {
        let interlayer_memory = reorganization.max(rehash);
        let total = processing.saturating_add(interlayer_memory);
        let ratio = |n: Cycles, d: Cycles| if d == 0 { 0.0 } else { n as f64 / d as f64 };
        LatencyBreakdown {
            processing,
            reorganization,
            rehash,
            interlayer_memory,
            total,
            reorganization_ratio: ratio(reorganization, processing),
            rehash_ratio: ratio(rehash, processing),
            interlayer_memory_ratio: ratio(interlayer_memory, processing),
            processing_efficiency: ratio(processing, total),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub chains: Vec<ChainReport>,
    pub boundaries: Vec<BoundaryRehash>,
    pub groups: Vec<DependencyGroup>,
    pub shared: SharedConstraints,
    pub reorganizations: Vec<Reorganization>,
    pub breakdown: LatencyBreakdown,
}

impl NetworkReport {
    /// Processing plus every rehash the search charged, inside chains and at
    /// boundaries.
    pub fn search_total(&self) -> Cycles {
        self.breakdown.processing.saturating_add(self.breakdown.rehash)
    }

    /// Final layout of every layer.
    pub fn layouts(&self) -> BTreeMap<LayerId, &LayoutDescriptor> {
        self.chains
            .iter()
            .flat_map(|c| c.layouts.iter().map(|(l, d)| (*l, d)))
            .collect()
    }

    pub fn decisions(&self) -> impl Iterator<Item = &EdgeDecision> {
        self.chains.iter().flat_map(|c| c.decisions.iter())
    }
}

/// Resolve every chain of `network`, charge boundary rehashes and layout
/// reorganizations, and build the latency breakdowns. A boundary rehash or a
/// reorganization is attributed to the chain holding its producing layer.
/// Fails on the first oracle error or missing layout.
#[instrument(skip_all, fields(layers = network.layouts.len()))]
pub fn analyze_network<O: CostOracle + ?Sized>(
    network: &Network,
    oracle: &mut O,
    config: &AnalysisConfig,
) -> Result<NetworkReport, AnalysisError> {
    let layers = network.layers();
    let chains = find_chains(&layers, &network.dependent);
    info!(chains = chains.len(), "dependency chains found");

    let mut search = ChainSearch::new(network, config, oracle);
    let mut reports = chains
        .iter()
        .map(|chain| search.run(chain))
        .collect::<Result<Vec<_>, _>>()?;

    let chain_of = |layer: LayerId| chains.iter().position(|c| c.contains(&layer));
    let mut boundaries = Vec::new();
    for (p, c) in network.consecutive_edges(&layers) {
        if chain_of(p) == chain_of(c) {
            continue;
        }
        let estimate = estimate_rehash(network.baseline(p)?, network.baseline(c)?, config);
        debug!(producer = p, consumer = c, cycles = estimate.total, "forced boundary rehash");
        boundaries.push(BoundaryRehash {
            producer: p,
            consumer: c,
            estimate,
        });
    }

    let groups = dependency_groups(&network.dependent);
    let shared = shared_constraints(&groups, &network.layouts, &network.workloads, config);
    let transitions = reorganizations(&layers, &groups, &shared, config);

    for (index, report) in reports.iter_mut().enumerate() {
        let reorganization = transitions
            .iter()
            .filter(|r| chain_of(r.from_layer) == Some(index))
            .map(|r| r.cycles)
            .fold(0, Cycles::saturating_add);
        let rehash = boundaries
            .iter()
            .filter(|b| chain_of(b.producer) == Some(index))
            .map(|b| b.estimate.total)
            .fold(report.rehash, Cycles::saturating_add);
        report.breakdown = LatencyBreakdown::new(report.processing, reorganization, rehash);
    }

    let processing = reports.iter().map(|r| r.processing).fold(0, Cycles::saturating_add);
    let reorganization = transitions.iter().map(|r| r.cycles).fold(0, Cycles::saturating_add);
    let rehash = reports
        .iter()
        .map(|r| r.rehash)
        .chain(boundaries.iter().map(|b| b.estimate.total))
        .fold(0, Cycles::saturating_add);

    Ok(NetworkReport {
        chains: reports,
        boundaries,
        groups,
        shared,
        reorganizations: transitions,
        breakdown: LatencyBreakdown::new(processing, reorganization, rehash),
    })
}
