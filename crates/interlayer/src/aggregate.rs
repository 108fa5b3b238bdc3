//! Dependency groups and the shared layout each group must agree on.
//!
//! A producer whose Outputs feed several consumers (or a consumer reading
//! several producers) ties all of those dataspaces to one physical layout.
//! Groups are the connected components of the producer-Outputs /
//! consumer-Inputs graph.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::Cycles;
use crate::config::AnalysisConfig;
use crate::dataspace::{Dataspace, DependencyGraph, LayerId, Role, Workload, role_ranks};
use crate::layout::{LayoutDescriptor, LayoutKind};
use crate::rank::{FactorMap, Permutation, RankEquivalence};

// Union-find over dataspaces

fn uf_find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Attach the later root under the earlier one so a root is always the
/// first-seen member of its set.
fn uf_union(parent: &mut [usize], a: usize, b: usize) {
    let ra = uf_find(parent, a);
    let rb = uf_find(parent, b);
    if ra != rb {
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

// DependencyGroup - Dataspaces that must share one layout

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyGroup {
    /// Members in discovery order. The first one is the canonical member.
    pub members: Vec<Dataspace>,
}

impl DependencyGroup {
    pub fn canonical(&self) -> Option<Dataspace> {
        self.members.first().copied()
    }

    pub fn contains(&self, ds: Dataspace) -> bool {
        self.members.contains(&ds)
    }
}

/// Partition the Inputs and Outputs dataspaces of every layer in `graph` into
/// dependency groups.
///
/// Discovery order: for each consumer (ascending) its Inputs followed by its
/// producers' Outputs, then every remaining Inputs/Outputs per layer. Groups
/// come out in the order their first member was discovered; an unconnected
/// dataspace forms a singleton group.
pub fn dependency_groups(graph: &DependencyGraph) -> Vec<DependencyGroup> {
    let mut order: Vec<Dataspace> = Vec::new();
    let mut index: HashMap<Dataspace, usize> = HashMap::new();
    let mut visit = |ds: Dataspace, order: &mut Vec<Dataspace>| -> usize {
        *index.entry(ds).or_insert_with(|| {
            order.push(ds);
            order.len() - 1
        })
    };

    let mut edges: Vec<(usize, usize)> = Vec::new();
    for (consumer, producers) in graph.entries() {
        let input = visit(Dataspace::inputs(consumer), &mut order);
        for &producer in producers {
            let output = visit(Dataspace::outputs(producer), &mut order);
            edges.push((output, input));
        }
    }
    for layer in graph.layers() {
        visit(Dataspace::inputs(layer), &mut order);
        visit(Dataspace::outputs(layer), &mut order);
    }

    let mut parent: Vec<usize> = (0..order.len()).collect();
    for (a, b) in edges {
        uf_union(&mut parent, a, b);
    }

    let mut groups: Vec<DependencyGroup> = Vec::new();
    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    for (i, ds) in order.iter().enumerate() {
        let root = uf_find(&mut parent, i);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            groups.push(DependencyGroup { members: Vec::new() });
            groups.len() - 1
        });
        groups[slot].members.push(*ds);
    }
    groups
}

/// A layer's layout restricted to one dataspace's ranks.
pub fn dataspace_layout(
    ds: Dataspace,
    layouts: &BTreeMap<LayerId, LayoutDescriptor>,
    workloads: &BTreeMap<LayerId, Workload>,
    config: &AnalysisConfig,
) -> Option<LayoutDescriptor> {
    let layout = layouts.get(&ds.layer)?;
    let ranks = role_ranks(workloads.get(&ds.layer), ds.role, &config.equivalence);
    Some(layout.restrict(&ranks))
}

/// Rename Outputs ranks to their input-side equivalents; other roles unchanged.
fn to_input_names(factors: &FactorMap, role: Role, eq: &RankEquivalence) -> FactorMap {
    if role != Role::Outputs {
        return factors.clone();
    }
    factors
        .iter()
        .map(|(r, f)| (eq.input_for(r).unwrap_or(r), f))
        .collect()
}

// SharedConstraint - One group's agreed layout at one target

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedConstraint {
    /// Index into the group list.
    pub group: usize,
    pub target: String,
    pub interline: FactorMap,
    pub intraline: FactorMap,
    pub authblock: FactorMap,
    pub permutation: Permutation,
}

/// A member whose interline or authblock factors disagree with the canonical
/// member. The canonical member's values are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactorConflict {
    pub group: usize,
    pub target: String,
    pub kind: LayoutKind,
    pub canonical: Dataspace,
    pub member: Dataspace,
    pub canonical_factors: FactorMap,
    pub member_factors: FactorMap,
}

/// A group/target left without a shared constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedGroup {
    pub group: usize,
    pub target: String,
    pub member: Dataspace,
    pub missing: LayoutKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SharedConstraints {
    pub constraints: Vec<SharedConstraint>,
    pub conflicts: Vec<FactorConflict>,
    pub skipped: Vec<SkippedGroup>,
}

impl SharedConstraints {
    pub fn for_group(&self, group: usize, target: &str) -> Option<&SharedConstraint> {
        self.constraints
            .iter()
            .find(|c| c.group == group && c.target == target)
    }
}

/// Compute the shared layout of every group at every target all its members
/// place data in.
///
/// Intraline factors are the rank-wise maximum over members (Outputs ranks
/// renamed to their input equivalents). Interline and authblock factors come
/// from the canonical member; disagreements are reported as conflicts.
pub fn shared_constraints(
    groups: &[DependencyGroup],
    layouts: &BTreeMap<LayerId, LayoutDescriptor>,
    workloads: &BTreeMap<LayerId, Workload>,
    config: &AnalysisConfig,
) -> SharedConstraints {
    let eq = &config.equivalence;
    let mut out = SharedConstraints::default();

    for (g, group) in groups.iter().enumerate() {
        let views: Vec<(Dataspace, LayoutDescriptor)> = group
            .members
            .iter()
            .filter_map(|&ds| dataspace_layout(ds, layouts, workloads, config).map(|l| (ds, l)))
            .collect();
        if views.len() != group.members.len() || views.is_empty() {
            debug!(group = g, "group has members without a layout, no shared constraint");
            continue;
        }

        let (canonical, first) = &views[0];
        let targets: Vec<String> = first
            .targets()
            .into_iter()
            .filter(|t| views.iter().all(|(_, l)| l.has_target(t)))
            .map(str::to_string)
            .collect();

        'target: for target in targets {
            for (ds, view) in &views {
                let missing = LayoutKind::ALL
                    .into_iter()
                    .find(|k| view.nest(&target, *k).is_none());
                if let Some(kind) = missing {
                    warn!(
                        group = g,
                        memory = %target,
                        member = %ds,
                        %kind,
                        "skipping shared constraint, member lacks nest"
                    );
                    out.skipped.push(SkippedGroup {
                        group: g,
                        target: target.clone(),
                        member: *ds,
                        missing: kind,
                    });
                    continue 'target;
                }
            }

            let mapped = |ds: &Dataspace, view: &LayoutDescriptor, kind: LayoutKind| -> FactorMap {
                view.factors(&target, kind)
                    .map(|f| to_input_names(f, ds.role, eq))
                    .unwrap_or_default()
            };

            let mut intraline = FactorMap::new();
            for (ds, view) in &views {
                for (r, f) in mapped(ds, view, LayoutKind::Intraline).iter() {
                    let cur = intraline.explicit(r).unwrap_or(0);
                    intraline.insert(r, cur.max(f));
                }
            }

            let interline = mapped(canonical, first, LayoutKind::Interline);
            let authblock = mapped(canonical, first, LayoutKind::AuthblockLines);
            for (ds, view) in views.iter().skip(1) {
                for (kind, expected) in [
                    (LayoutKind::Interline, &interline),
                    (LayoutKind::AuthblockLines, &authblock),
                ] {
                    let actual = mapped(ds, view, kind);
                    let agrees = expected
                        .ranks()
                        .chain(actual.ranks())
                        .all(|r| expected.get(r) == actual.get(r));
                    if !agrees {
                        warn!(
                            group = g, memory = %target, %kind,
                            canonical = %canonical, member = %ds,
                            expected = %expected, actual = %actual,
                            "shared constraint factor conflict, keeping canonical member's factors"
                        );
                        out.conflicts.push(FactorConflict {
                            group: g,
                            target: target.clone(),
                            kind,
                            canonical: *canonical,
                            member: *ds,
                            canonical_factors: expected.clone(),
                            member_factors: actual,
                        });
                    }
                }
            }

            let permutation = first
                .nest(&target, LayoutKind::Intraline)
                .map(|n| n.permutation.clone())
                .unwrap_or_default();
            out.constraints.push(SharedConstraint {
                group: g,
                target,
                interline,
                intraline,
                authblock,
                permutation,
            });
        }
    }
    out
}

// Reorganization - Moving a tensor between two groups' layouts

/// One output-to-input group transition at the shared target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reorganization {
    pub from_group: usize,
    pub to_group: usize,
    pub from_layer: LayerId,
    pub to_layer: LayerId,
    pub lines_read: u64,
    pub lines_written: u64,
    pub cycles: Cycles,
}

/// Price the layout reorganizations between consecutive layers.
///
/// For each group holding some layer's Outputs, every other group holding a
/// dataspace of the next layer in `layers` is a transition, charged
/// `(lines(from) + lines(to)) / memory_ports`. Lines are the product of the
/// group's shared interline factors. Both groups need a shared constraint at
/// the shared target. Transitions come out in group order.
pub fn reorganizations(
    layers: &[LayerId],
    groups: &[DependencyGroup],
    shared: &SharedConstraints,
    config: &AnalysisConfig,
) -> Vec<Reorganization> {
    let target = config.shared_target.as_str();
    let ports = config.memory_ports.max(1);
    let next_layer = |layer: LayerId| {
        let at = layers.iter().position(|&l| l == layer)?;
        layers.get(at + 1).copied()
    };

    let mut out = Vec::new();
    for (g, group) in groups.iter().enumerate() {
        let Some(from) = shared.for_group(g, target) else {
            continue;
        };
        for ds in group.members.iter().filter(|ds| ds.role == Role::Outputs) {
            let Some(next) = next_layer(ds.layer) else {
                continue;
            };
            for (h, other) in groups.iter().enumerate() {
                if h == g || !other.members.iter().any(|m| m.layer == next) {
                    continue;
                }
                let Some(to) = shared.for_group(h, target) else {
                    continue;
                };
                let lines_read = from.interline.product();
                let lines_written = to.interline.product();
                let cycles = lines_read.saturating_add(lines_written) / ports;
                debug!(
                    from_group = g,
                    to_group = h,
                    from_layer = ds.layer,
                    to_layer = next,
                    cycles,
                    "reorganization"
                );
                out.push(Reorganization {
                    from_group: g,
                    to_group: h,
                    from_layer: ds.layer,
                    to_layer: next,
                    lines_read,
                    lines_written,
                    cycles,
                });
            }
        }
    }
    out
}
