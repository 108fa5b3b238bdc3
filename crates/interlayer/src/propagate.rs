use std::fmt::{self, Display};

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::layout::{LayoutDescriptor, LayoutKind};
use crate::rank::Rank;

/// Which side of an edge donates its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Producer wins: the consumer's Inputs adopt the producer's Outputs factors.
    Forward,
    /// Consumer wins: the producer's Outputs adopt the consumer's Inputs factors.
    Backward,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Forward, Direction::Backward];
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// A pair of layouts that agree on intraline and authblock factors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub direction: Direction,
    pub producer: LayoutDescriptor,
    pub consumer: LayoutDescriptor,
}

/// Copy the donor's intraline and authblock_lines factors onto the other side
/// for every equivalenced rank at the shared target. Interline factors are not
/// touched, and an adopted authblock factor never exceeds the receiver's
/// interline factor for that rank. Missing authblock nests are synthesized on
/// both sides first.
///
/// Returns `None` when either side has no intraline nest at the target.
pub fn propagate(
    producer: &LayoutDescriptor,
    consumer: &LayoutDescriptor,
    direction: Direction,
    config: &AnalysisConfig,
) -> Option<Proposal> {
    let target = config.shared_target.as_str();
    let producer = producer.with_default_authblock(target);
    let consumer = consumer.with_default_authblock(target);

    let mut p_out = producer.clone();
    let mut c_out = consumer.clone();
    for kind in [LayoutKind::Intraline, LayoutKind::AuthblockLines] {
        let p = producer.factors(target, kind)?;
        let c = consumer.factors(target, kind)?;
        match direction {
            Direction::Forward => {
                let limit = authblock_limit(&consumer, target, kind);
                let mut adopted = c.clone();
                for &(o, i) in config.equivalence.pairs() {
                    adopted.insert(i, limit(i, p.get(o)));
                }
                c_out = c_out.with_factors(target, kind, adopted);
            }
            Direction::Backward => {
                let limit = authblock_limit(&producer, target, kind);
                let mut adopted = p.clone();
                for &(o, i) in config.equivalence.pairs() {
                    adopted.insert(o, limit(o, c.get(i)));
                }
                p_out = p_out.with_factors(target, kind, adopted);
            }
        }
    }

    Some(Proposal {
        direction,
        producer: p_out,
        consumer: c_out,
    })
}

/// Caps an adopted authblock_lines factor at the receiver's interline factor
/// for the same rank. Other kinds pass through.
fn authblock_limit<'a>(
    receiver: &'a LayoutDescriptor,
    target: &str,
    kind: LayoutKind,
) -> impl Fn(Rank, u64) -> u64 + 'a {
    let interline = match kind {
        LayoutKind::AuthblockLines => receiver.factors(target, LayoutKind::Interline),
        _ => None,
    };
    move |rank, factor| interline.map_or(factor, |f| factor.min(f.get(rank)))
}

/// Forward then backward proposals for an edge; empty when the layouts cannot
/// be propagated.
pub fn proposals(
    producer: &LayoutDescriptor,
    consumer: &LayoutDescriptor,
    config: &AnalysisConfig,
) -> Vec<Proposal> {
    Direction::BOTH
        .into_iter()
        .filter_map(|d| propagate(producer, consumer, d, config))
        .collect()
}
