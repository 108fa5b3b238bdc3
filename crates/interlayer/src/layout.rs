use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;
use crate::rank::{FactorMap, Permutation, Rank, ranks};

/// Rank string used for a synthesized authblock nest.
pub const DEFAULT_AUTHBLOCK_RANKS: &str = "CKRSNVHWLQP";

/// Rank string used for a synthesized authblock nest of a depthwise layer (no `K`).
pub const DEPTHWISE_AUTHBLOCK_RANKS: &str = "CRSNVHWLQP";

// LayoutKind - Which nest of a target a LayoutNest describes

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// Lines needed per rank to hold the tensor's extent.
    Interline,
    /// Elements per rank packed into one line.
    Intraline,
    /// Lines per rank grouped into one authentication block.
    AuthblockLines,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 3] = [
        LayoutKind::Interline,
        LayoutKind::Intraline,
        LayoutKind::AuthblockLines,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutKind::Interline => "interline",
            LayoutKind::Intraline => "intraline",
            LayoutKind::AuthblockLines => "authblock_lines",
        }
    }

    pub fn parse(s: &str) -> Option<LayoutKind> {
        LayoutKind::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// LayoutNest - Factors and order of one (target, kind)

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LayoutNest {
    pub target: String,
    pub kind: LayoutKind,
    pub factors: FactorMap,
    pub permutation: Permutation,
}

impl LayoutNest {
    pub fn new(
        target: impl Into<String>,
        kind: LayoutKind,
        factors: FactorMap,
        permutation: impl Into<Permutation>,
    ) -> Self {
        LayoutNest {
            target: target.into(),
            kind,
            factors,
            permutation: permutation.into(),
        }
    }
}

impl Display for LayoutNest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}[{}]:{}", self.target, self.kind, self.factors, self.permutation)
    }
}

// LayoutDescriptor - A tensor's placement across memory levels

/// Ordered nests, at most one per (target, kind). Treated as an immutable value:
/// every `with_*` method returns a new descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LayoutDescriptor {
    nests: Vec<LayoutNest>,
}

impl LayoutDescriptor {
    /// Build a descriptor, rejecting a repeated (target, kind).
    pub fn new(nests: Vec<LayoutNest>) -> Result<Self, DescriptorError> {
        for (i, nest) in nests.iter().enumerate() {
            if nests[..i].iter().any(|n| n.target == nest.target && n.kind == nest.kind) {
                return Err(DescriptorError::DuplicateNest {
                    target: nest.target.clone(),
                    kind: nest.kind,
                });
            }
        }
        Ok(LayoutDescriptor { nests })
    }

    pub fn nests(&self) -> &[LayoutNest] {
        &self.nests
    }

    pub fn is_empty(&self) -> bool {
        self.nests.is_empty()
    }

    pub fn nest(&self, target: &str, kind: LayoutKind) -> Option<&LayoutNest> {
        self.nests.iter().find(|n| n.target == target && n.kind == kind)
    }

    pub fn factors(&self, target: &str, kind: LayoutKind) -> Option<&FactorMap> {
        self.nest(target, kind).map(|n| &n.factors)
    }

    pub fn has_target(&self, target: &str) -> bool {
        self.nests.iter().any(|n| n.target == target)
    }

    /// Unique targets in first-appearance order.
    pub fn targets(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for nest in &self.nests {
            if !out.contains(&nest.target.as_str()) {
                out.push(&nest.target);
            }
        }
        out
    }

    /// True when all three kinds are present at `target`.
    pub fn is_complete_at(&self, target: &str) -> bool {
        LayoutKind::ALL.into_iter().all(|k| self.nest(target, k).is_some())
    }

    /// Replace (or append) the nest for `nest.target`/`nest.kind`.
    pub fn with_nest(&self, nest: LayoutNest) -> LayoutDescriptor {
        let mut nests = self.nests.clone();
        match nests.iter_mut().find(|n| n.target == nest.target && n.kind == nest.kind) {
            Some(slot) => *slot = nest,
            None => nests.push(nest),
        }
        LayoutDescriptor { nests }
    }

    /// Replace the factors of an existing nest, or append a nest with an
    /// empty permutation when none exists.
    pub fn with_factors(
        &self,
        target: &str,
        kind: LayoutKind,
        factors: FactorMap,
    ) -> LayoutDescriptor {
        let permutation = self
            .nest(target, kind)
            .map(|n| n.permutation.clone())
            .unwrap_or_default();
        self.with_nest(LayoutNest {
            target: target.to_string(),
            kind,
            factors,
            permutation,
        })
    }

    /// Ranks whose authblock_lines factor at `target` exceeds the interline
    /// factor. Empty when either nest is missing.
    pub fn oversized_authblock(&self, target: &str) -> Vec<Rank> {
        let (Some(inter), Some(auth)) = (
            self.factors(target, LayoutKind::Interline),
            self.factors(target, LayoutKind::AuthblockLines),
        ) else {
            return Vec::new();
        };
        auth.iter()
            .filter(|&(r, f)| f > inter.get(r))
            .map(|(r, _)| r)
            .collect()
    }

    /// Add an authblock_lines nest with every factor 1 at `target` if the
    /// descriptor has none. Depthwise layouts (intraline without `K`) use the
    /// rank string without `K`.
    pub fn with_default_authblock(&self, target: &str) -> LayoutDescriptor {
        if self.nest(target, LayoutKind::AuthblockLines).is_some() {
            return self.clone();
        }
        let depthwise = self
            .factors(target, LayoutKind::Intraline)
            .is_some_and(|f| !f.contains(Rank::new('K')));
        let order = if depthwise {
            DEPTHWISE_AUTHBLOCK_RANKS
        } else {
            DEFAULT_AUTHBLOCK_RANKS
        };
        let factors = ranks(order).into_iter().map(|r| (r, 1)).collect();
        self.with_nest(LayoutNest::new(target, LayoutKind::AuthblockLines, factors, order))
    }

    /// View of this layout restricted to one dataspace's ranks. Nests left
    /// without factors are dropped.
    pub fn restrict(&self, keep: &[Rank]) -> LayoutDescriptor {
        let nests = self
            .nests
            .iter()
            .filter_map(|n| {
                let factors = n.factors.restrict(keep);
                (!factors.is_empty()).then(|| LayoutNest {
                    target: n.target.clone(),
                    kind: n.kind,
                    factors,
                    permutation: n.permutation.restrict(keep),
                })
            })
            .collect();
        LayoutDescriptor { nests }
    }
}

impl Display for LayoutDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<")?;
        for (i, n) in self.nests.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", n)?;
        }
        write!(f, ">")
    }
}
