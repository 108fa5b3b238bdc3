use serde::Serialize;
use tracing::warn;

use crate::Cycles;
use crate::compat::{MissingNest, Side};
use crate::config::{AnalysisConfig, RehashCostParameters};
use crate::layout::{LayoutDescriptor, LayoutKind};
use crate::rank::Rank;

// AuthBlockCost - Streaming cost of one side of an edge

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthBlockCost {
    /// Elements per authentication block.
    pub block_size: u64,
    /// Blocks needed to cover the tensor.
    pub num_blocks: u64,
    pub latency_per_block: Cycles,
    pub latency: Cycles,
}

impl AuthBlockCost {
    /// Closed-form cost for one tensor, given its per-rank factors.
    ///
    /// ```text
    /// block_size        = Π max(1, auth[r]) * max(1, intra[r])
    /// num_blocks        = Π ceil(inter[r] / max(1, auth[r]))
    /// latency_per_block = ceil(block_size * word_bits / datapath) * max(enc, auth) + overhead
    /// latency           = num_blocks * latency_per_block
    /// ```
    pub fn compute(
        ranks: &[Rank],
        interline: impl Fn(Rank) -> u64,
        intraline: impl Fn(Rank) -> u64,
        authblock: impl Fn(Rank) -> u64,
        params: &RehashCostParameters,
    ) -> Self {
        let mut block_size: u64 = 1;
        let mut num_blocks: u64 = 1;
        for &r in ranks {
            let auth = authblock(r).max(1);
            block_size = block_size.saturating_mul(auth.saturating_mul(intraline(r).max(1)));
            num_blocks = num_blocks.saturating_mul(interline(r).div_ceil(auth));
        }
        let bits = block_size.saturating_mul(params.word_bits);
        let latency_per_block = bits
            .div_ceil(params.datapath.max(1))
            .saturating_mul(params.cycles_per_datapath())
            .saturating_add(params.overhead_per_block);
        AuthBlockCost {
            block_size,
            num_blocks,
            latency_per_block,
            latency: num_blocks.saturating_mul(latency_per_block),
        }
    }
}

/// Price of one side. `Unpriced` means the layout lacked a required nest; it
/// contributes 0 cycles but is not the same as a free rehash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SidePrice {
    Priced(AuthBlockCost),
    Unpriced(MissingNest),
}

impl SidePrice {
    pub fn latency(&self) -> Cycles {
        match self {
            SidePrice::Priced(cost) => cost.latency,
            SidePrice::Unpriced(_) => 0,
        }
    }

    pub fn is_priced(&self) -> bool {
        matches!(self, SidePrice::Priced(_))
    }
}

// RehashEstimate - Both re-chunking passes of one edge

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RehashEstimate {
    pub producer: SidePrice,
    pub consumer: SidePrice,
    pub total: Cycles,
}

impl RehashEstimate {
    /// True when both sides were priced.
    pub fn is_complete(&self) -> bool {
        self.producer.is_priced() && self.consumer.is_priced()
    }
}

/// Rehash cost of one tensor stored with `layout` at the shared target,
/// over `ranks`. A missing authblock nest is treated as all factors 1.
pub fn estimate_side(
    layout: &LayoutDescriptor,
    ranks: &[Rank],
    side: Side,
    config: &AnalysisConfig,
) -> SidePrice {
    let target = config.shared_target.as_str();
    let inter = layout.factors(target, LayoutKind::Interline);
    let intra = layout.factors(target, LayoutKind::Intraline);
    let (inter, intra) = match (inter, intra) {
        (Some(inter), Some(intra)) => (inter, intra),
        (None, _) | (_, None) => {
            let kind = if inter.is_none() {
                LayoutKind::Interline
            } else {
                LayoutKind::Intraline
            };
            warn!(?side, memory = target, %kind, "layout cannot be priced for rehash");
            return SidePrice::Unpriced(MissingNest {
                side,
                target: target.to_string(),
                kind,
            });
        }
    };
    let auth = layout.factors(target, LayoutKind::AuthblockLines);
    SidePrice::Priced(AuthBlockCost::compute(
        ranks,
        |r| inter.get(r),
        |r| intra.get(r),
        |r| auth.map_or(1, |a| a.get(r)),
        &config.rehash,
    ))
}

/// Rehash cost of an edge: the producer re-chunks its Outputs over the output
/// ranks and the consumer re-chunks its Inputs over the input ranks.
pub fn estimate_rehash(
    producer: &LayoutDescriptor,
    consumer: &LayoutDescriptor,
    config: &AnalysisConfig,
) -> RehashEstimate {
    let eq = &config.equivalence;
    let producer = estimate_side(producer, &eq.output_ranks(), Side::Producer, config);
    let consumer = estimate_side(consumer, &eq.input_ranks(), Side::Consumer, config);
    let total = producer.latency().saturating_add(consumer.latency());
    RehashEstimate {
        producer,
        consumer,
        total,
    }
}
