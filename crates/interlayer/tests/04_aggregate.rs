use std::collections::BTreeMap;

use interlayer::{
    AnalysisConfig, Cycles, Dataspace, DependencyGraph, LayerId, LayoutDescriptor, LayoutKind,
    Reorganization, Role, dataspace_layout, dependency_groups, parse_dependencies, parse_layout,
    parse_workload, reorganizations, shared_constraints,
};
use pretty_assertions::assert_eq;

fn full_layout(inter: &str, intra: &str, auth: &str) -> LayoutDescriptor {
    let yaml = format!(
        "\
layout:
  - {{target: MainMemory, type: interline, factors: '{inter}'}}
  - {{target: MainMemory, type: intraline, factors: '{intra}', permutation: NHWPQ}}
  - {{target: MainMemory, type: authblock_lines, factors: '{auth}'}}
"
    );
    parse_layout(&yaml, "fixture").unwrap()
}

#[test]
fn test_groups_follow_discovery_order() {
    let graph = parse_dependencies("1: null\n2: [1]\n3: [2]\n", "inline").unwrap();
    let groups = dependency_groups(&graph);
    let members: Vec<Vec<Dataspace>> = groups.iter().map(|g| g.members.clone()).collect();
    assert_eq!(
        members,
        vec![
            vec![Dataspace::inputs(2), Dataspace::outputs(1)],
            vec![Dataspace::inputs(3), Dataspace::outputs(2)],
            vec![Dataspace::inputs(1)],
            vec![Dataspace::outputs(3)],
        ]
    );
    assert_eq!(groups[0].canonical(), Some(Dataspace::inputs(2)));
}

#[test]
fn test_fan_out_and_fan_in_merge_groups() {
    // 1 feeds 2 and 3; 4 joins 2 and 3.
    let graph: DependencyGraph = [(1, 2), (1, 3), (2, 4), (3, 4)].into_iter().collect();
    let groups = dependency_groups(&graph);

    let group_of = |ds: Dataspace| groups.iter().position(|g| g.contains(ds)).unwrap();
    assert_eq!(group_of(Dataspace::inputs(2)), group_of(Dataspace::inputs(3)));
    assert_eq!(group_of(Dataspace::outputs(1)), group_of(Dataspace::inputs(3)));
    assert_eq!(group_of(Dataspace::outputs(2)), group_of(Dataspace::outputs(3)));
    assert_eq!(group_of(Dataspace::outputs(2)), group_of(Dataspace::inputs(4)));
    assert_ne!(group_of(Dataspace::inputs(2)), group_of(Dataspace::inputs(4)));

    // Every Inputs/Outputs dataspace lands in exactly one group.
    let total: usize = groups.iter().map(|g| g.members.len()).sum();
    assert_eq!(total, 8);
}

#[test]
fn test_shared_intraline_is_rank_wise_max() {
    let config = AnalysisConfig::default();
    let graph: DependencyGraph = [(1, 2), (1, 3)].into_iter().collect();
    let groups = dependency_groups(&graph);
    let layouts: BTreeMap<LayerId, LayoutDescriptor> = [
        (1, full_layout("N=1 H=8 W=8 P=2 Q=2", "N=1 H=1 W=1 P=4 Q=2", "N=1 H=1 W=1 P=1 Q=1")),
        (2, full_layout("N=1 H=2 W=2 P=4 Q=4", "N=1 H=2 W=8 P=1 Q=1", "N=1 H=1 W=1 P=1 Q=1")),
        (3, full_layout("N=1 H=2 W=2 P=4 Q=4", "N=2 H=1 W=2 P=1 Q=1", "N=1 H=1 W=1 P=1 Q=1")),
    ]
    .into_iter()
    .collect();

    let shared = shared_constraints(&groups, &layouts, &BTreeMap::new(), &config);
    let g = groups.iter().position(|g| g.contains(Dataspace::outputs(1))).unwrap();
    let c = shared.for_group(g, "MainMemory").unwrap();
    assert_eq!(c.intraline.to_string(), "H=4 N=2 W=8");
    assert_eq!(c.interline.to_string(), "H=2 N=1 W=2");
    assert!(shared.conflicts.is_empty());
}

#[test]
fn test_factor_conflict_keeps_canonical_member() {
    let config = AnalysisConfig::default();
    let graph: DependencyGraph = [(1, 2)].into_iter().collect();
    let groups = dependency_groups(&graph);
    let layouts: BTreeMap<LayerId, LayoutDescriptor> = [
        (1, full_layout("N=1 P=4 Q=2", "N=1 P=1 Q=1", "N=1 P=2 Q=1")),
        (2, full_layout("N=1 H=2 W=2", "N=1 H=1 W=1", "N=1 H=1 W=1")),
    ]
    .into_iter()
    .collect();

    let shared = shared_constraints(&groups, &layouts, &BTreeMap::new(), &config);
    // Inputs of 2 is discovered first and is canonical.
    let c = shared.for_group(0, "MainMemory").unwrap();
    assert_eq!(c.interline.to_string(), "H=2 N=1 W=2");
    assert_eq!(c.authblock.to_string(), "H=1 N=1 W=1");

    let kinds: Vec<LayoutKind> = shared.conflicts.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![LayoutKind::Interline, LayoutKind::AuthblockLines]);
    assert_eq!(shared.conflicts[0].canonical, Dataspace::inputs(2));
    assert_eq!(shared.conflicts[0].member, Dataspace::outputs(1));
    // Producer factors are reported under input-side names.
    assert_eq!(shared.conflicts[0].member_factors.to_string(), "H=4 N=1 W=2");
}

#[test]
fn test_group_without_all_kinds_is_skipped() {
    let config = AnalysisConfig::default();
    let graph: DependencyGraph = [(1, 2)].into_iter().collect();
    let groups = dependency_groups(&graph);
    let yaml = "\
layout:
  - {target: MainMemory, type: interline, factors: 'N=1 P=2 Q=2'}
  - {target: MainMemory, type: intraline, factors: 'N=1 P=2 Q=2'}
";
    let partial = parse_layout(yaml, "fixture").unwrap();
    let layouts: BTreeMap<LayerId, LayoutDescriptor> = [
        (1, partial),
        (2, full_layout("N=1 H=2 W=2", "N=1 H=2 W=2", "N=1 H=1 W=1")),
    ]
    .into_iter()
    .collect();

    let shared = shared_constraints(&groups, &layouts, &BTreeMap::new(), &config);
    assert!(shared.for_group(0, "MainMemory").is_none());
    let skipped = shared.skipped.iter().find(|s| s.group == 0).unwrap();
    assert_eq!(skipped.member, Dataspace::outputs(1));
    assert_eq!(skipped.missing, LayoutKind::AuthblockLines);
}

#[test]
fn test_reorganization_follows_output_to_next_layer() {
    let config = AnalysisConfig::default();
    let graph: DependencyGraph = [(1, 2), (2, 3)].into_iter().collect();
    let groups = dependency_groups(&graph);
    let layout = full_layout(
        "N=1 H=4 W=2 P=2 Q=3",
        "N=1 H=1 W=1 P=1 Q=1",
        "N=1 H=1 W=1 P=1 Q=1",
    );
    let layouts: BTreeMap<LayerId, LayoutDescriptor> =
        (1..=3).map(|l| (l, layout.clone())).collect();
    let shared = shared_constraints(&groups, &layouts, &BTreeMap::new(), &config);

    // Group 0 holds 1's Outputs (8 lines) and leads into 2's Outputs group (8 lines).
    // Group 1 holds 2's Outputs and leads into 3's Outputs group (P=2 Q=3, 6 lines).
    let transitions = reorganizations(&[1, 2, 3], &groups, &shared, &config);
    let summary: Vec<(usize, usize, LayerId, LayerId, Cycles)> = transitions
        .iter()
        .map(|r| (r.from_group, r.to_group, r.from_layer, r.to_layer, r.cycles))
        .collect();
    assert_eq!(summary, vec![(0, 1, 1, 2, 8), (1, 3, 2, 3, 7)]);

    let single_port = AnalysisConfig {
        memory_ports: 1,
        ..AnalysisConfig::default()
    };
    let total: Cycles = reorganizations(&[1, 2, 3], &groups, &shared, &single_port)
        .iter()
        .map(|r| r.cycles)
        .sum();
    assert_eq!(total, 30);

    // Group 0 loses its shared constraint once layer 1 has no layout.
    let mut without_first = layouts.clone();
    without_first.remove(&1);
    let shared = shared_constraints(&groups, &without_first, &BTreeMap::new(), &config);
    let transitions = reorganizations(&[1, 2, 3], &groups, &shared, &config);
    assert_eq!(transitions.len(), 1);
    assert_eq!((transitions[0].from_layer, transitions[0].cycles), (2, 7));
}

#[test]
fn test_two_layers_reorganize_once() {
    let config = AnalysisConfig::default();
    let graph: DependencyGraph = [(1, 2)].into_iter().collect();
    let groups = dependency_groups(&graph);
    let auth = "N=1 H=1 W=1 P=1 Q=1";
    let layouts: BTreeMap<LayerId, LayoutDescriptor> = [
        (1, full_layout("N=1 H=2 W=2 P=4 Q=4", "N=1 H=1 W=1 P=1 Q=1", auth)),
        (2, full_layout("N=1 H=4 W=4 P=2 Q=2", "N=1 H=1 W=1 P=1 Q=1", auth)),
    ]
    .into_iter()
    .collect();
    let shared = shared_constraints(&groups, &layouts, &BTreeMap::new(), &config);
    assert!(shared.conflicts.is_empty());

    // Layer 1's Inputs are never read back from a previous layer.
    let transitions = reorganizations(&[1, 2], &groups, &shared, &config);
    assert_eq!(
        transitions,
        vec![Reorganization {
            from_group: 0,
            to_group: 2,
            from_layer: 1,
            to_layer: 2,
            lines_read: 16,
            lines_written: 4,
            cycles: 10,
        }]
    );
}

#[test]
fn test_workload_ranks_select_the_dataspace() {
    let config = AnalysisConfig::default();
    let yaml = "\
problem:
  shape:
    data-spaces:
      - {name: Inputs, ranks: [N, C, H, W]}
      - {name: Outputs, ranks: [N, K, P, Q]}
";
    let workload = parse_workload(yaml, "inline").unwrap();
    let layout = full_layout(
        "N=1 C=2 K=4 H=2 W=2 P=2 Q=2",
        "N=1 C=8 K=16 H=1 W=1 P=1 Q=1",
        "N=1 H=1 W=1 P=1 Q=1",
    );
    let layouts: BTreeMap<LayerId, LayoutDescriptor> = [(1, layout)].into_iter().collect();
    let workloads = [(1, workload)].into_iter().collect();

    let outputs =
        dataspace_layout(Dataspace::new(1, Role::Outputs), &layouts, &workloads, &config).unwrap();
    let intra = outputs.factors("MainMemory", LayoutKind::Intraline).unwrap();
    assert_eq!(intra.to_string(), "K=16 N=1 P=1 Q=1");
}
