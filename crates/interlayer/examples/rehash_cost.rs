use interlayer::{
    AnalysisConfig, Compatibility, FactorMap, LayoutDescriptor, LayoutKind, LayoutNest,
    RehashCostParameters, check_compatibility, estimate_rehash, factors,
};

// Price the rehash between two mismatched layouts under a few crypto engines.

fn main() {
    let nest = |kind, factors: FactorMap, order: &str| {
        LayoutNest::new("MainMemory", kind, factors, order)
    };
    let producer = LayoutDescriptor::new(vec![
        nest(LayoutKind::Interline, factors!('N' => 1, 'P' => 7, 'Q' => 7), "NPQ"),
        nest(LayoutKind::Intraline, factors!('N' => 1, 'P' => 8, 'Q' => 8), "NPQ"),
        nest(LayoutKind::AuthblockLines, factors!('N' => 1, 'P' => 1, 'Q' => 7), "NPQ"),
    ])
    .unwrap();
    let consumer = LayoutDescriptor::new(vec![
        nest(LayoutKind::Interline, factors!('N' => 1, 'H' => 14, 'W' => 7), "NHW"),
        nest(LayoutKind::Intraline, factors!('N' => 1, 'H' => 4, 'W' => 8), "NHW"),
    ])
    .unwrap();

    let config = AnalysisConfig::default();
    match check_compatibility(&producer, &consumer, &[], &[], &config) {
        Compatibility::Incompatible(mismatches) => {
            for m in &mismatches {
                println!(
                    "{} {}={} vs {}={}",
                    m.kind, m.output_rank, m.producer, m.input_rank, m.consumer
                );
            }
        }
        other => println!("{:?}", other),
    }

    for (name, datapath, cycles) in [("narrow", 32, 4), ("aes-gcm", 128, 11), ("wide", 512, 11)] {
        let params = RehashCostParameters {
            datapath,
            auth_cycles_per_datapath: cycles,
            enc_cycles_per_datapath: cycles,
            ..Default::default()
        };
        let estimate = estimate_rehash(&producer, &consumer, &config.clone().with_rehash(params));
        println!("{:>8}: {:>8} cycles", name, estimate.total);
        println!("{}", serde_json::to_string(&estimate).unwrap());
    }
}
