use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::layout::{LayoutDescriptor, LayoutKind};
use crate::rank::Rank;

/// Which side of an edge a layout belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Producer,
    Consumer,
}

/// One equivalenced rank pair whose factors differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankMismatch {
    pub kind: LayoutKind,
    pub output_rank: Rank,
    pub input_rank: Rank,
    pub producer: u64,
    pub consumer: u64,
}

/// A nest the check needed but did not find.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingNest {
    pub side: Side,
    pub target: String,
    pub kind: LayoutKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    Compatible,
    Incompatible(Vec<RankMismatch>),
    /// A required nest is absent. Fails closed: never compatible.
    Unresolved(MissingNest),
}

impl Compatibility {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Compatibility::Compatible)
    }
}

/// Check whether a producer's Outputs layout and a consumer's Inputs layout can
/// share the configured target without a rehash.
///
/// For every equivalence pair `(o, i)` with `o` among `producer_ranks` and `i`
/// among `consumer_ranks` (an empty list does not filter), the interline and
/// intraline factors of `o` in `producer` must equal those of `i` in
/// `consumer`. Absent ranks count as factor 1.
pub fn check_compatibility(
    producer: &LayoutDescriptor,
    consumer: &LayoutDescriptor,
    producer_ranks: &[Rank],
    consumer_ranks: &[Rank],
    config: &AnalysisConfig,
) -> Compatibility {
    let target = config.shared_target.as_str();
    let pairs = config.equivalence.pairs_for(producer_ranks, consumer_ranks);
    let mut mismatches = Vec::new();

    for kind in [LayoutKind::Interline, LayoutKind::Intraline] {
        let (p, c) = match (producer.factors(target, kind), consumer.factors(target, kind)) {
            (Some(p), Some(c)) => (p, c),
            (None, _) => return missing(Side::Producer, target, kind),
            (_, None) => return missing(Side::Consumer, target, kind),
        };
        for &(o, i) in &pairs {
            if p.get(o) != c.get(i) {
                mismatches.push(RankMismatch {
                    kind,
                    output_rank: o,
                    input_rank: i,
                    producer: p.get(o),
                    consumer: c.get(i),
                });
            }
        }
    }

    if mismatches.is_empty() {
        Compatibility::Compatible
    } else {
        Compatibility::Incompatible(mismatches)
    }
}

fn missing(side: Side, target: &str, kind: LayoutKind) -> Compatibility {
    Compatibility::Unresolved(MissingNest {
        side,
        target: target.to_string(),
        kind,
    })
}
