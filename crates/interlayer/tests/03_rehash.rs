use interlayer::{
    AnalysisConfig, FactorMap, LayoutDescriptor, LayoutKind, LayoutNest, RehashCostParameters,
    SidePrice, estimate_rehash, factors,
};
use pretty_assertions::assert_eq;

fn layout(inter: FactorMap, intra: FactorMap, auth: Option<FactorMap>) -> LayoutDescriptor {
    let mut nests = vec![
        LayoutNest::new("MainMemory", LayoutKind::Interline, inter, ""),
        LayoutNest::new("MainMemory", LayoutKind::Intraline, intra, ""),
    ];
    if let Some(auth) = auth {
        nests.push(LayoutNest::new("MainMemory", LayoutKind::AuthblockLines, auth, ""));
    }
    LayoutDescriptor::new(nests).unwrap()
}

fn priced(side: &SidePrice) -> interlayer::AuthBlockCost {
    match side {
        SidePrice::Priced(cost) => *cost,
        SidePrice::Unpriced(missing) => panic!("side not priced: {:?}", missing),
    }
}

#[test]
fn test_aligned_pair_is_one_block_per_side() {
    let config = AnalysisConfig::default();
    let producer = layout(
        factors!('N' => 1, 'P' => 4, 'Q' => 2),
        factors!('N' => 1, 'P' => 2, 'Q' => 2),
        Some(factors!('N' => 1, 'P' => 4, 'Q' => 2)),
    );
    let consumer = layout(
        factors!('N' => 1, 'H' => 4, 'W' => 2),
        factors!('N' => 1, 'H' => 2, 'W' => 2),
        Some(factors!('N' => 1, 'H' => 4, 'W' => 2)),
    );
    let est = estimate_rehash(&producer, &consumer, &config);
    assert!(est.is_complete());
    let (p, c) = (priced(&est.producer), priced(&est.consumer));
    assert_eq!(p.num_blocks, 1);
    assert_eq!(c.num_blocks, 1);
    // 8 lines of 4 elements in the single block
    assert_eq!(p.block_size, 32);
    // ceil(32 * 16 / 1) * 1 + 1
    assert_eq!(p.latency, 513);
    assert_eq!(est.total, 1026);
}

#[test]
fn test_zero_authblock_factor_acts_as_one() {
    let config = AnalysisConfig::default();
    let inter = factors!('N' => 1, 'P' => 3, 'Q' => 2);
    let intra = factors!('N' => 1, 'P' => 2, 'Q' => 2);
    let zero = layout(inter.clone(), intra.clone(), Some(factors!('N' => 0, 'P' => 0, 'Q' => 1)));
    let one = layout(inter, intra, Some(factors!('N' => 1, 'P' => 1, 'Q' => 1)));
    let consumer = layout(factors!('H' => 2), factors!('H' => 2), None);

    let a = estimate_rehash(&zero, &consumer, &config);
    let b = estimate_rehash(&one, &consumer, &config);
    assert_eq!(a, b);
    assert_eq!(priced(&a.producer).num_blocks, 6);
}

#[test]
fn test_missing_authblock_counts_every_line() {
    let config = AnalysisConfig::default();
    let with = layout(
        factors!('P' => 2, 'Q' => 2),
        factors!('P' => 4),
        Some(factors!('P' => 1, 'Q' => 1)),
    );
    let without = layout(factors!('P' => 2, 'Q' => 2), factors!('P' => 4), None);
    let consumer = layout(factors!('H' => 1), factors!('H' => 1), None);
    assert_eq!(
        estimate_rehash(&with, &consumer, &config).total,
        estimate_rehash(&without, &consumer, &config).total
    );
}

#[test]
fn test_unpriced_side_is_distinct_from_free() {
    let config = AnalysisConfig::default();
    let producer = layout(factors!('P' => 2), factors!('P' => 2), None);
    let bare = LayoutDescriptor::new(vec![LayoutNest::new(
        "MainMemory",
        LayoutKind::Interline,
        factors!('H' => 2),
        "",
    )])
    .unwrap();
    let est = estimate_rehash(&producer, &bare, &config);
    assert!(!est.is_complete());
    assert!(matches!(est.consumer, SidePrice::Unpriced(ref m) if m.kind == LayoutKind::Intraline));
    assert_eq!(est.consumer.latency(), 0);
    assert_eq!(est.total, est.producer.latency());
}

#[test]
fn test_wider_datapath_and_slower_engine() {
    let params = RehashCostParameters {
        datapath: 128,
        word_bits: 16,
        auth_cycles_per_datapath: 2,
        enc_cycles_per_datapath: 5,
        overhead_per_block: 3,
    };
    let config = AnalysisConfig::default().with_rehash(params);
    // 8 blocks of 4*4 elements: ceil(256/128) = 2 steps * 5 + 3 = 13 per block
    let producer = layout(
        factors!('P' => 4, 'Q' => 2),
        factors!('P' => 4, 'Q' => 4),
        Some(factors!('P' => 1, 'Q' => 1)),
    );
    let consumer = layout(factors!('H' => 1), factors!('H' => 1), None);
    let est = estimate_rehash(&producer, &consumer, &config);
    let p = priced(&est.producer);
    assert_eq!(p.num_blocks, 8);
    assert_eq!(p.latency_per_block, 13);
}

// Crypto descriptor
#[test]
fn test_crypto_descriptor() {
    let yaml = "\
crypto:
  name: AES-GCM
  datapath: 128
  auth-cycle-per-datapath: 2
  enc-cycle-per-datapath: 4
  auth-additional-cycle-per-block: 7
";
    let p = RehashCostParameters::from_yaml_str(yaml);
    assert_eq!(
        p,
        RehashCostParameters {
            datapath: 128,
            word_bits: 16,
            auth_cycles_per_datapath: 2,
            enc_cycles_per_datapath: 4,
            overhead_per_block: 7,
        }
    );
}

#[test]
fn test_crypto_descriptor_falls_back_per_field() {
    let p = RehashCostParameters::from_yaml_str(
        "crypto:\n  datapath: wide\n  enc-cycle-per-datapath: 9\n",
    );
    assert_eq!(p.datapath, 1);
    assert_eq!(p.enc_cycles_per_datapath, 9);
    assert_eq!(p.auth_cycles_per_datapath, 1);
    assert_eq!(p.overhead_per_block, 1);

    let defaults = RehashCostParameters::default();
    assert_eq!(RehashCostParameters::from_yaml_str("[unterminated"), defaults);
    assert_eq!(RehashCostParameters::from_yaml_str("other: 1"), defaults);
    assert_eq!(
        RehashCostParameters::load("/nonexistent/crypto.yaml"),
        RehashCostParameters::default()
    );
}

#[test]
fn test_analysis_config_reads_kebab_case_rehash_keys() {
    let yaml = "\
shared-target: DRAM
rehash:
  datapath: 128
  word-bits: 8
  auth-cycle-per-datapath: 3
  enc-cycles-per-datapath: 2
  auth-additional-cycle-per-block: 5
memory-ports: 4
";
    let config = AnalysisConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.shared_target, "DRAM");
    assert_eq!(config.memory_ports, 4);
    assert_eq!(
        config.rehash,
        RehashCostParameters {
            datapath: 128,
            word_bits: 8,
            auth_cycles_per_datapath: 3,
            enc_cycles_per_datapath: 2,
            overhead_per_block: 5,
        }
    );

    // Missing rehash keys keep the default cost model.
    let partial = AnalysisConfig::from_yaml_str("rehash:\n  overhead-per-block: 9\n").unwrap();
    assert_eq!(partial.rehash.overhead_per_block, 9);
    assert_eq!(partial.rehash.word_bits, 16);
    assert_eq!(partial.memory_ports, 2);
}
