use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DescriptorError;

// Rank - A named tensor axis

/// One tensor axis, named by a single letter as in workload descriptors
/// (`N` batch, `C`/`K` channels, `H`/`W` input rows/cols, `P`/`Q` output rows/cols, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rank(char);

impl Rank {
    pub const fn new(name: char) -> Self {
        Rank(name)
    }

    pub fn name(self) -> char {
        self.0
    }
}

impl Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<char> for Rank {
    fn from(c: char) -> Self {
        Rank(c)
    }
}

impl FromStr for Rank {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Ok(Rank(c)),
            _ => Err(DescriptorError::InvalidRank(s.to_string())),
        }
    }
}

impl Serialize for Rank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rank {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a list of rank letters, e.g. `"NVHW"`. Whitespace is ignored.
pub fn ranks(letters: &str) -> Vec<Rank> {
    letters.chars().filter(|c| !c.is_whitespace()).map(Rank).collect()
}

// FactorMap - Per-rank factors; an absent rank has factor 1

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FactorMap(BTreeMap<Rank, u64>);

impl FactorMap {
    pub fn new() -> Self {
        FactorMap(BTreeMap::new())
    }

    /// Factor for `rank`, 1 when the rank is absent.
    pub fn get(&self, rank: Rank) -> u64 {
        self.0.get(&rank).copied().unwrap_or(1)
    }

    /// Stored factor for `rank`, if any.
    pub fn explicit(&self, rank: Rank) -> Option<u64> {
        self.0.get(&rank).copied()
    }

    pub fn contains(&self, rank: Rank) -> bool {
        self.0.contains_key(&rank)
    }

    pub fn insert(&mut self, rank: Rank, factor: u64) {
        self.0.insert(rank, factor);
    }

    pub fn with(mut self, rank: Rank, factor: u64) -> Self {
        self.insert(rank, factor);
        self
    }

    pub fn ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Rank, u64)> + '_ {
        self.0.iter().map(|(r, f)| (*r, *f))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Product of all factors (number of lines for an interline nest).
    pub fn product(&self) -> u64 {
        self.0.values().fold(1u64, |acc, f| acc.saturating_mul(*f))
    }

    /// Keep only the given ranks.
    pub fn restrict(&self, keep: &[Rank]) -> FactorMap {
        FactorMap(
            self.0
                .iter()
                .filter(|(r, _)| keep.contains(r))
                .map(|(r, f)| (*r, *f))
                .collect(),
        )
    }
}

impl FromIterator<(Rank, u64)> for FactorMap {
    fn from_iter<I: IntoIterator<Item = (Rank, u64)>>(iter: I) -> Self {
        FactorMap(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(char, u64); N]> for FactorMap {
    fn from(arr: [(char, u64); N]) -> Self {
        arr.into_iter().map(|(r, f)| (Rank(r), f)).collect()
    }
}

/// Serialized as space-separated `Rank=value` tokens, ranks in sorted order.
impl Display for FactorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (rank, factor)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}={}", rank, factor)?;
        }
        Ok(())
    }
}

impl FromStr for FactorMap {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut map = FactorMap::new();
        for token in s.split_whitespace() {
            let (rank, value) = token
                .split_once('=')
                .ok_or_else(|| DescriptorError::InvalidFactor { token: token.to_string() })?;
            let rank: Rank = rank.parse()?;
            let value: u64 = value
                .trim()
                .parse()
                .map_err(|_| DescriptorError::InvalidFactor { token: token.to_string() })?;
            map.insert(rank, value);
        }
        Ok(map)
    }
}

impl Serialize for FactorMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Construct a FactorMap. Use: `factors!('N' => 1, 'P' => 4)`.
#[macro_export]
macro_rules! factors {
    () => { $crate::FactorMap::new() };
    ($($rank:expr => $factor:expr),+ $(,)?) => {
        $crate::FactorMap::from([$(($rank, $factor)),+])
    };
}

// Permutation - Rank priority order of a nest

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Permutation(Vec<Rank>);

impl Permutation {
    pub fn new(order: Vec<Rank>) -> Self {
        Permutation(order)
    }

    pub fn ranks(&self) -> &[Rank] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keep only the given ranks, preserving order.
    pub fn restrict(&self, keep: &[Rank]) -> Permutation {
        Permutation(self.0.iter().copied().filter(|r| keep.contains(r)).collect())
    }
}

impl Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in &self.0 {
            write!(f, "{}", rank)?;
        }
        Ok(())
    }
}

impl Serialize for Permutation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<&str> for Permutation {
    fn from(s: &str) -> Self {
        Permutation(ranks(s))
    }
}

// RankEquivalence - Output-side rank to input-side rank

/// Maps a producer's Outputs rank to the consumer's Inputs rank naming the same
/// physical axis. The canonical correspondence is `N↔N`, `L↔V`, `P↔H`, `Q↔W`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct RankEquivalence {
    pairs: Vec<(Rank, Rank)>,
}

impl RankEquivalence {
    pub fn new(pairs: Vec<(Rank, Rank)>) -> Self {
        RankEquivalence { pairs }
    }

    /// Equivalent input-side rank for an output-side rank.
    pub fn input_for(&self, output: Rank) -> Option<Rank> {
        self.pairs.iter().find(|(o, _)| *o == output).map(|(_, i)| *i)
    }

    /// Equivalent output-side rank for an input-side rank.
    pub fn output_for(&self, input: Rank) -> Option<Rank> {
        self.pairs.iter().find(|(_, i)| *i == input).map(|(o, _)| *o)
    }

    pub fn pairs(&self) -> &[(Rank, Rank)] {
        &self.pairs
    }

    /// Output-side ranks in mapping order.
    pub fn output_ranks(&self) -> Vec<Rank> {
        self.pairs.iter().map(|(o, _)| *o).collect()
    }

    /// Input-side ranks in mapping order.
    pub fn input_ranks(&self) -> Vec<Rank> {
        self.pairs.iter().map(|(_, i)| *i).collect()
    }

    /// Pairs whose output rank is in `output_ranks` and whose input rank is in
    /// `input_ranks`. An empty list does not filter its side.
    pub fn pairs_for(&self, output_ranks: &[Rank], input_ranks: &[Rank]) -> Vec<(Rank, Rank)> {
        self.pairs
            .iter()
            .copied()
            .filter(|(o, i)| {
                (output_ranks.is_empty() || output_ranks.contains(o))
                    && (input_ranks.is_empty() || input_ranks.contains(i))
            })
            .collect()
    }
}

impl Default for RankEquivalence {
    fn default() -> Self {
        RankEquivalence::new(vec![
            (Rank('N'), Rank('N')),
            (Rank('L'), Rank('V')),
            (Rank('P'), Rank('H')),
            (Rank('Q'), Rank('W')),
        ])
    }
}

impl TryFrom<BTreeMap<String, String>> for RankEquivalence {
    type Error = DescriptorError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let pairs = map
            .iter()
            .map(|(o, i)| Ok((o.parse()?, i.parse()?)))
            .collect::<Result<Vec<_>, DescriptorError>>()?;
        Ok(RankEquivalence { pairs })
    }
}

impl From<RankEquivalence> for BTreeMap<String, String> {
    fn from(eq: RankEquivalence) -> Self {
        eq.pairs.iter().map(|(o, i)| (o.to_string(), i.to_string())).collect()
    }
}
