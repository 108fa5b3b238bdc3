use interlayer::{
    AnalysisConfig, Compatibility, FactorMap, LayoutDescriptor, LayoutKind, LayoutNest, Side,
    check_compatibility, factors, ranks,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn layout(inter: FactorMap, intra: FactorMap) -> LayoutDescriptor {
    LayoutDescriptor::new(vec![
        LayoutNest::new("MainMemory", LayoutKind::Interline, inter, ""),
        LayoutNest::new("MainMemory", LayoutKind::Intraline, intra, ""),
    ])
    .unwrap()
}

fn producer() -> LayoutDescriptor {
    layout(factors!('N' => 1, 'P' => 2, 'Q' => 2), factors!('N' => 1, 'P' => 4, 'Q' => 4))
}

fn consumer() -> LayoutDescriptor {
    layout(factors!('N' => 1, 'H' => 2, 'W' => 2), factors!('N' => 1, 'H' => 4, 'W' => 4))
}

#[test]
fn test_equivalenced_ranks_match() {
    let config = AnalysisConfig::default();
    let result =
        check_compatibility(&producer(), &consumer(), &ranks("NKPQ"), &ranks("NCHW"), &config);
    assert_eq!(result, Compatibility::Compatible);
}

#[test]
fn test_mismatch_is_reported_per_rank() {
    let config = AnalysisConfig::default();
    let consumer = layout(
        factors!('N' => 1, 'H' => 2, 'W' => 2),
        factors!('N' => 1, 'H' => 2, 'W' => 4),
    );
    let result = check_compatibility(&producer(), &consumer, &[], &[], &config);
    let Compatibility::Incompatible(mismatches) = result else {
        panic!("expected a mismatch, got {:?}", result);
    };
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].kind, LayoutKind::Intraline);
    assert_eq!(mismatches[0].output_rank.name(), 'P');
    assert_eq!(mismatches[0].input_rank.name(), 'H');
    assert_eq!((mismatches[0].producer, mismatches[0].consumer), (4, 2));
}

#[rstest]
#[case::interline_p(
    factors!('N' => 1, 'H' => 4, 'W' => 2),
    factors!('N' => 1, 'H' => 4, 'W' => 4)
)]
#[case::interline_batch(
    factors!('N' => 2, 'H' => 2, 'W' => 2),
    factors!('N' => 1, 'H' => 4, 'W' => 4)
)]
#[case::intraline_w(
    factors!('N' => 1, 'H' => 2, 'W' => 2),
    factors!('N' => 1, 'H' => 4, 'W' => 1)
)]
#[case::absent_rank_is_one(
    factors!('N' => 1, 'H' => 2, 'W' => 2),
    factors!('N' => 1, 'H' => 4, 'W' => 4, 'V' => 3)
)]
fn test_any_single_difference_breaks_compatibility(
    #[case] inter: FactorMap,
    #[case] intra: FactorMap,
) {
    let config = AnalysisConfig::default();
    let result = check_compatibility(&producer(), &layout(inter, intra), &[], &[], &config);
    assert!(!result.is_compatible(), "{:?}", result);
}

#[test]
fn test_ranks_outside_the_dataspace_are_ignored() {
    let config = AnalysisConfig::default();
    // V=3 on the consumer only matters when V is among its ranks.
    let consumer = layout(
        factors!('N' => 1, 'H' => 2, 'W' => 2),
        factors!('N' => 1, 'H' => 4, 'W' => 4, 'V' => 3),
    );
    let narrow = check_compatibility(&producer(), &consumer, &ranks("NPQ"), &ranks("NHW"), &config);
    assert!(narrow.is_compatible());
    let full = check_compatibility(&producer(), &consumer, &ranks("NLPQ"), &ranks("NVHW"), &config);
    assert!(!full.is_compatible());
}

#[test]
fn test_missing_nest_fails_closed() {
    let config = AnalysisConfig::default();
    let no_intra = LayoutDescriptor::new(vec![LayoutNest::new(
        "MainMemory",
        LayoutKind::Interline,
        factors!('N' => 1, 'H' => 2, 'W' => 2),
        "",
    )])
    .unwrap();
    let result = check_compatibility(&producer(), &no_intra, &[], &[], &config);
    match result {
        Compatibility::Unresolved(missing) => {
            assert_eq!(missing.side, Side::Consumer);
            assert_eq!(missing.kind, LayoutKind::Intraline);
        }
        other => panic!("expected Unresolved, got {:?}", other),
    }
}

#[test]
fn test_other_target_is_not_shared() {
    let config = AnalysisConfig::default().with_shared_target("DRAM");
    let result = check_compatibility(&producer(), &consumer(), &[], &[], &config);
    assert!(matches!(
        result,
        Compatibility::Unresolved(ref m) if m.side == Side::Producer && m.target == "DRAM"
    ));
}
