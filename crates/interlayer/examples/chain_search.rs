use interlayer::{
    AnalysisConfig, CachedOracle, Cycles, DependencyGraph, LayerId, LayoutDescriptor, LayoutKind,
    Network, OracleError, Rank, analyze_network, parse_layout,
};

// A three-layer chain of convolutions priced by a toy oracle.
// Run with RUST_LOG=interlayer=debug to watch each edge get resolved.

fn conv(input: u64, output: u64) -> LayoutDescriptor {
    let intra = format!("N=1 H={input} W={input} P={output} Q={output}");
    let yaml = format!(
        "\
layout:
  - {{target: MainMemory, type: interline, factors: 'N=1 H=2 W=2 P=2 Q=2'}}
  - {{target: MainMemory, type: intraline, factors: '{intra}', permutation: NHWPQ}}
  - {{target: MainMemory, type: authblock_lines, factors: 'N=1 H=1 W=1 P=1 Q=1'}}
"
    );
    parse_layout(&yaml, "demo").unwrap()
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let dependent: DependencyGraph = [(1, 2), (2, 3)].into_iter().collect();
    let network = Network::new(dependent)
        .with_layout(1, conv(8, 4))
        .with_layout(2, conv(2, 4))
        .with_layout(3, conv(4, 2));

    // Wider intraline rows cost the layer a little more, mismatched ones a lot.
    let toy = |layer: LayerId, layout: &LayoutDescriptor| -> Result<Cycles, OracleError> {
        let intra = layout
            .factors("MainMemory", LayoutKind::Intraline)
            .ok_or(OracleError::Other(format!("layer {} has no intraline nest", layer)))?;
        let (h, p) = (intra.get(Rank::new('H')), intra.get(Rank::new('P')));
        Ok(100 * Cycles::from(layer) + 10 * h + if h == p { 0 } else { 25 })
    };
    let mut oracle = CachedOracle::new(toy);

    let config = AnalysisConfig::default();
    let report = analyze_network(&network, &mut oracle, &config).unwrap();

    for chain in &report.chains {
        let b = &chain.breakdown;
        println!(
            "chain {:?}: {:?} sweep, {} processing + {} interlayer = {} cycles",
            chain.layers, chain.order, b.processing, b.interlayer_memory, b.total
        );
        for d in &chain.decisions {
            println!("  {} -> {}: {}", d.producer, d.consumer, d.action);
        }
    }
    for (layer, layout) in report.layouts() {
        println!("layer {}: {}", layer, layout);
    }
    println!("oracle calls: {} ({} distinct)", oracle.calls(), oracle.cached());
    println!("{}", serde_json::to_string_pretty(&report.breakdown).unwrap());
}
