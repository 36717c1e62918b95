use std::fmt;

use crate::pass::{OwnerType, PriorityLevel};

/// Half-open priority range `[min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriorityBand {
    /// Inclusive lower bound
    pub min: u32,
    /// Exclusive upper bound
    pub max: u32,
}

impl PriorityBand {
    /// Create a band
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Check if a value lies in the band
    pub fn contains(&self, value: u32) -> bool {
        (self.min..self.max).contains(&value)
    }

    /// Convert a parsed value, returning `None` when it is outside the band
    pub fn checked(&self, value: i64) -> Option<u32> {
        u32::try_from(value).ok().filter(|v| self.contains(*v))
    }

    /// All values of the band in ascending order
    pub fn values(&self) -> std::ops::Range<u32> {
        self.min..self.max
    }
}

impl fmt::Display for PriorityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.min, self.max)
    }
}

const BANDS: [(OwnerType, PriorityLevel, PriorityBand); 10] = [
    (OwnerType::Custom, PriorityLevel::Top, PriorityBand::new(0, 1000)),
    (OwnerType::Custom, PriorityLevel::Main, PriorityBand::new(1000, 2000)),
    (OwnerType::Custom, PriorityLevel::Down, PriorityBand::new(2000, 3000)),
    (OwnerType::BuiltIn, PriorityLevel::Top, PriorityBand::new(3000, 4000)),
    (OwnerType::BuiltIn, PriorityLevel::Main, PriorityBand::new(4000, 5000)),
    (OwnerType::BuiltIn, PriorityLevel::Down, PriorityBand::new(5000, 6000)),
    (OwnerType::Custom, PriorityLevel::Pass, PriorityBand::new(6000, 7000)),
    (OwnerType::Custom, PriorityLevel::Rule, PriorityBand::new(7000, 8000)),
    (OwnerType::BuiltIn, PriorityLevel::Pass, PriorityBand::new(8000, 9000)),
    (OwnerType::BuiltIn, PriorityLevel::Rule, PriorityBand::new(9000, 10000)),
];

/// Band of an `(owner, level)` pair
pub fn band_of(owner: OwnerType, level: PriorityLevel) -> PriorityBand {
    match (owner, level) {
        (OwnerType::Custom, PriorityLevel::Top) => BANDS[0].2,
        (OwnerType::Custom, PriorityLevel::Main) => BANDS[1].2,
        (OwnerType::Custom, PriorityLevel::Down) => BANDS[2].2,
        (OwnerType::BuiltIn, PriorityLevel::Top) => BANDS[3].2,
        (OwnerType::BuiltIn, PriorityLevel::Main) => BANDS[4].2,
        (OwnerType::BuiltIn, PriorityLevel::Down) => BANDS[5].2,
        (OwnerType::Custom, PriorityLevel::Pass) => BANDS[6].2,
        (OwnerType::Custom, PriorityLevel::Rule) => BANDS[7].2,
        (OwnerType::BuiltIn, PriorityLevel::Pass) => BANDS[8].2,
        (OwnerType::BuiltIn, PriorityLevel::Rule) => BANDS[9].2,
    }
}

/// Every band in ascending order
pub fn bands() -> impl Iterator<Item = (OwnerType, PriorityLevel, PriorityBand)> {
    BANDS.into_iter()
}
