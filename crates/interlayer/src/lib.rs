//! Interlayer - cross-layer layout analysis for accelerators with encrypted,
//! authenticated external memory.
//!
//! When a producer layer writes a tensor with one memory layout and the
//! consumer reads it with another, the tensor has to be re-chunked and
//! re-authenticated (a *rehash*). This crate decides, per dependency edge,
//! whether two layouts are compatible, what a rehash costs, and, over whole
//! dependency chains, whether propagating one side's layout to the other is
//! cheaper than paying the rehash.
//!
//! ```
//! use interlayer::{
//!     AnalysisConfig, LayoutDescriptor, LayoutKind, LayoutNest, check_compatibility, factors,
//! };
//!
//! let config = AnalysisConfig::default();
//! let nest = |kind, factors, order: &str| LayoutNest::new("MainMemory", kind, factors, order);
//! let out = LayoutDescriptor::new(vec![
//!     nest(LayoutKind::Interline, factors!('N' => 1, 'P' => 2, 'Q' => 2), "NPQ"),
//!     nest(LayoutKind::Intraline, factors!('N' => 1, 'P' => 4, 'Q' => 4), "NPQ"),
//! ])
//! .unwrap();
//! let inp = LayoutDescriptor::new(vec![
//!     nest(LayoutKind::Interline, factors!('N' => 1, 'H' => 2, 'W' => 2), "NHW"),
//!     nest(LayoutKind::Intraline, factors!('N' => 1, 'H' => 4, 'W' => 4), "NHW"),
//! ])
//! .unwrap();
//! assert!(check_compatibility(&out, &inp, &[], &[], &config).is_compatible());
//! ```

pub mod aggregate;
pub mod chain;
pub mod compat;
pub mod config;
pub mod dataspace;
pub mod descriptor;
pub mod error;
pub mod layout;
pub mod oracle;
pub mod propagate;
pub mod rank;
pub mod rehash;

/// Latency in accelerator cycles.
pub type Cycles = u64;

pub use aggregate::{
    DependencyGroup, FactorConflict, Reorganization, SharedConstraint, SharedConstraints,
    SkippedGroup, dataspace_layout, dependency_groups, reorganizations, shared_constraints,
};
pub use chain::{
    BoundaryRehash, ChainReport, ChainSearch, ChainState, EdgeAction, EdgeDecision,
    LatencyBreakdown, Network, NetworkReport, SweepOrder, TrialSummary, analyze_network,
    find_chains, sweep_pairs,
};
pub use compat::{Compatibility, MissingNest, RankMismatch, Side, check_compatibility};
pub use config::{
    AnalysisConfig, DEFAULT_MEMORY_PORTS, DEFAULT_SHARED_TARGET, RehashCostParameters,
};
pub use dataspace::{Dataspace, DependencyGraph, LayerId, Role, Workload, role_ranks};
pub use descriptor::{
    layout_to_yaml, load_dependencies, load_layout, load_workload, parse_dependencies, parse_layout,
    parse_workload, write_layout,
};
pub use error::{AnalysisError, DescriptorError, OracleError};
pub use layout::{
    DEFAULT_AUTHBLOCK_RANKS, DEPTHWISE_AUTHBLOCK_RANKS, LayoutDescriptor, LayoutKind, LayoutNest,
};
pub use oracle::{CachedOracle, CommandOracle, CostOracle, StatsReport};
pub use propagate::{Direction, Proposal, propagate, proposals};
pub use rank::{FactorMap, Permutation, Rank, RankEquivalence, ranks};
pub use rehash::{AuthBlockCost, RehashEstimate, SidePrice, estimate_rehash, estimate_side};
