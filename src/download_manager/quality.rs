//! Quality tiers and the descending fallback ladder.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tiers the resolution API is known to serve, best first.
pub const SUPPORTED_TIERS: [u8; 9] = [14, 13, 12, 11, 10, 9, 8, 7, 4];

/// Lowest and highest tier codes the resolution API accepts at all.
pub const MIN_TIER: u8 = 1;
pub const MAX_TIER: u8 = 14;

/// Tier requested when a job does not name one.
pub const DEFAULT_TIER: u8 = 11;

/// An audio quality code understood by the upstream resolver.
///
/// Higher is better. Construction validates the range, so a `QualityTier`
/// held anywhere in the pipeline is always a code the resolver accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct QualityTier(u8);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("quality tier {0} is outside 1..=14")]
pub struct InvalidQualityTier(pub i64);

impl QualityTier {
    pub fn new(value: i64) -> Result<Self, InvalidQualityTier> {
        if (MIN_TIER as i64..=MAX_TIER as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(InvalidQualityTier(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Whether this tier is one of the [`SUPPORTED_TIERS`].
    pub fn is_supported(&self) -> bool {
        SUPPORTED_TIERS.contains(&self.0)
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        Self(DEFAULT_TIER)
    }
}

impl TryFrom<i64> for QualityTier {
    type Error = InvalidQualityTier;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QualityTier> for i64 {
    fn from(tier: QualityTier) -> Self {
        tier.0 as i64
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered, strictly descending list of tiers to try for one song.
///
/// Never empty: a requested tier that is not one of the supported tiers
/// produces a single-rung ladder containing just that tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityLadder {
    tiers: Vec<QualityTier>,
}

impl QualityLadder {
    pub fn from_requested(requested: QualityTier) -> Self {
        if !requested.is_supported() {
            return Self {
                tiers: vec![requested],
            };
        }

        let tiers = SUPPORTED_TIERS
            .iter()
            .copied()
            .filter(|tier| *tier <= requested.value())
            .map(QualityTier)
            .collect();
        Self { tiers }
    }

    /// A ladder with only the requested tier, used when fallback is disabled.
    pub fn single(requested: QualityTier) -> Self {
        Self {
            tiers: vec![requested],
        }
    }

    pub fn tiers(&self) -> &[QualityTier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = QualityTier> + '_ {
        self.tiers.iter().copied()
    }
}
