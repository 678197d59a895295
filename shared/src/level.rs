use serde::{Deserialize, Serialize};

/// Upper bound for the level search. Requirements explode long before this,
/// but a degenerate curve must not spin the probe loop forever.
const LEVEL_SEARCH_CEILING: u32 = 1 << 20;

/// Parameters of the infinite-level requirement curve:
/// `floor(B * n^p * log2(n + 1) * (1 + alpha)^max(0, n - t))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCurve {
    /// Base scale `B`.
    pub base: f64,
    /// Exponent `p`.
    pub exponent: f64,
    /// Acceleration threshold `t`: levels past it grow geometrically.
    pub soft_cap: u32,
    /// Acceleration rate `alpha`.
    pub acceleration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelProgress {
    pub level: u32,
    /// Metric earned past the current level's requirement.
    pub progress: u64,
    /// Metric still missing for the next level.
    pub remaining: u64,
}

impl LevelCurve {
    pub const fn new(base: f64, exponent: f64, soft_cap: u32, acceleration: f64) -> Self {
        Self {
            base,
            exponent,
            soft_cap,
            acceleration,
        }
    }

    /// Metric value required to hold `level`. Level 0 is free.
    pub fn requirement_for_level(&self, level: u32) -> u64 {
        if level == 0 {
            return 0;
        }
        let n = level as f64;
        let over_cap = (n - self.soft_cap as f64).max(0.0);
        let raw = self.base
            * n.powf(self.exponent)
            * (n + 1.0).log2()
            * (1.0 + self.acceleration).powf(over_cap);
        if raw >= u64::MAX as f64 {
            u64::MAX
        } else {
            raw.floor() as u64
        }
    }

    /// Largest `n` with `requirement_for_level(n) <= value`. The curve has
    /// no algebraic inverse (the log term), so this probes an upper bound
    /// by doubling and then bisects.
    pub fn level_for_value(&self, value: u64) -> u32 {
        let mut hi = 1u32;
        while self.requirement_for_level(hi) <= value {
            if hi >= LEVEL_SEARCH_CEILING {
                return hi;
            }
            hi = hi.saturating_mul(2);
        }
        let mut lo = 0u32;
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.requirement_for_level(mid) <= value {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn next_level_requirement(&self, value: u64) -> u64 {
        self.requirement_for_level(self.level_for_value(value) + 1)
    }

    pub fn progress(&self, value: u64) -> LevelProgress {
        let level = self.level_for_value(value);
        let floor = self.requirement_for_level(level);
        let next = self.requirement_for_level(level + 1);
        LevelProgress {
            level,
            progress: value.saturating_sub(floor),
            remaining: next.saturating_sub(value),
        }
    }
}

/// Point cost of advancing from `level - 1` to `level` on the power-level
/// curve.
pub const fn power_level_cost(level: u32) -> u64 {
    let n = level as u64;
    100 + 20 * n + 3 * n * n
}

/// Total points needed to reach `level` from zero.
pub fn power_level_total_cost(level: u32) -> u64 {
    (1..=level).map(power_level_cost).sum()
}

/// Inverts the cumulative power-level cost by walking the monotonic sum.
pub fn power_level_from_points(points: u64) -> u32 {
    let mut level = 0u32;
    let mut spent = 0u64;
    loop {
        let Some(total) = spent.checked_add(power_level_cost(level + 1)) else {
            return level;
        };
        if total > points {
            return level;
        }
        spent = total;
        level += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Legendary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Tier {
    pub const fn from_level(level: u32) -> Self {
        match level {
            0..=4 => Tier::Bronze,
            5..=9 => Tier::Silver,
            10..=19 => Tier::Gold,
            20..=29 => Tier::Platinum,
            30..=49 => Tier::Diamond,
            _ => Tier::Legendary,
        }
    }

    pub const fn rarity(&self) -> Rarity {
        match self {
            Tier::Bronze => Rarity::Common,
            Tier::Silver => Rarity::Rare,
            Tier::Gold | Tier::Platinum => Rarity::Epic,
            Tier::Diamond | Tier::Legendary => Rarity::Legendary,
        }
    }

    pub const fn points_multiplier(&self) -> u32 {
        match self {
            Tier::Bronze => 1,
            Tier::Silver => 2,
            Tier::Gold => 3,
            Tier::Platinum => 5,
            Tier::Diamond => 7,
            Tier::Legendary => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STARS: LevelCurve = LevelCurve::new(10.0, 1.6, 22, 0.08);

    #[test]
    fn zero_value_is_level_zero() {
        assert_eq!(STARS.level_for_value(0), 0);
        assert_eq!(STARS.requirement_for_level(0), 0);
    }

    #[test]
    fn requirements_are_strictly_increasing() {
        let mut previous = 0;
        for level in 1..=300 {
            let requirement = STARS.requirement_for_level(level);
            assert!(
                requirement > previous,
                "requirement({level}) = {requirement} did not grow past {previous}"
            );
            previous = requirement;
        }
    }

    #[test]
    fn absurd_levels_saturate_instead_of_overflowing() {
        assert_eq!(STARS.requirement_for_level(5_000), u64::MAX);
        // Still monotonic (non-strictly) across the saturation point.
        assert!(STARS.requirement_for_level(5_000) >= STARS.requirement_for_level(300));
    }

    #[test]
    fn levels_are_monotonic_in_value() {
        let mut previous = 0;
        for value in (0..500_000).step_by(997) {
            let level = STARS.level_for_value(value);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn level_and_requirement_are_inverse_consistent() {
        for value in [0, 1, 9, 10, 11, 57, 1_000, 12_345, 800_000] {
            let level = STARS.level_for_value(value);
            assert!(STARS.requirement_for_level(level) <= value);
            assert!(STARS.requirement_for_level(level + 1) > value);
        }
    }

    #[test]
    fn exact_requirement_reaches_the_level() {
        let requirement = STARS.requirement_for_level(5);
        assert!(STARS.level_for_value(requirement) >= 5);
        assert!(STARS.level_for_value(requirement - 1) < 5);
    }

    #[test]
    fn progress_splits_value_between_floor_and_next_requirement() {
        let value = STARS.requirement_for_level(3) + 4;
        let progress = STARS.progress(value);
        assert_eq!(progress.level, 3);
        assert_eq!(progress.progress, 4);
        assert_eq!(
            value + progress.remaining,
            STARS.requirement_for_level(4)
        );
    }

    #[test]
    fn deep_levels_stay_cheap_to_compute() {
        // Binary search, not a linear scan: a huge value terminates fast
        // and still lands on a consistent level.
        let level = STARS.level_for_value(u64::MAX / 2);
        assert!(STARS.requirement_for_level(level) <= u64::MAX / 2);
        assert!(STARS.requirement_for_level(level + 1) > u64::MAX / 2);
    }

    #[test]
    fn power_level_cost_matches_the_quadratic() {
        assert_eq!(power_level_cost(1), 123);
        assert_eq!(power_level_cost(2), 152);
        assert_eq!(power_level_total_cost(1), 123);
        assert_eq!(power_level_total_cost(2), 275);
    }

    #[test]
    fn power_level_inversion_at_the_boundary() {
        assert_eq!(power_level_from_points(122), 0);
        assert_eq!(power_level_from_points(123), 1);
        assert_eq!(power_level_from_points(274), 1);
        assert_eq!(power_level_from_points(275), 2);
    }

    #[test]
    fn power_level_matches_total_cost_for_all_small_levels() {
        for level in 0..200 {
            let total = power_level_total_cost(level);
            assert_eq!(power_level_from_points(total), level);
            if level > 0 {
                assert_eq!(power_level_from_points(total - 1), level - 1);
            }
        }
    }

    #[test]
    fn tier_step_function() {
        assert_eq!(Tier::from_level(0), Tier::Bronze);
        assert_eq!(Tier::from_level(4), Tier::Bronze);
        assert_eq!(Tier::from_level(5), Tier::Silver);
        assert_eq!(Tier::from_level(10), Tier::Gold);
        assert_eq!(Tier::from_level(20), Tier::Platinum);
        assert_eq!(Tier::from_level(30), Tier::Diamond);
        assert_eq!(Tier::from_level(50), Tier::Legendary);
        assert_eq!(Tier::from_level(999), Tier::Legendary);
    }

    #[test]
    fn tier_rarity_and_multiplier_mapping() {
        assert_eq!(Tier::Bronze.rarity(), Rarity::Common);
        assert_eq!(Tier::Bronze.points_multiplier(), 1);
        assert_eq!(Tier::Silver.rarity(), Rarity::Rare);
        assert_eq!(Tier::Silver.points_multiplier(), 2);
        assert_eq!(Tier::Gold.rarity(), Rarity::Epic);
        assert_eq!(Tier::Gold.points_multiplier(), 3);
        assert_eq!(Tier::Platinum.rarity(), Rarity::Epic);
        assert_eq!(Tier::Platinum.points_multiplier(), 5);
        assert_eq!(Tier::Diamond.rarity(), Rarity::Legendary);
        assert_eq!(Tier::Diamond.points_multiplier(), 7);
        assert_eq!(Tier::Legendary.rarity(), Rarity::Legendary);
        assert_eq!(Tier::Legendary.points_multiplier(), 10);
    }
}
