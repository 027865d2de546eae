//! Difficulty with lossless 256-bit target backing.
//!
//! Difficulty and target have an inverse relationship against the fixed
//! difficulty-1 baseline (`Target::MAX`, the 0x00000000ffff0000... constant):
//!
//! ```text
//! difficulty = diff1 / target
//! target     = diff1 / difficulty
//! ```
//!
//! The value is stored as its target so nothing is lost to floating point;
//! conversion to `f64` happens only at the display/reporting step.

use std::cmp::Ordering;
use std::fmt;

use bitcoin::pow::Target;
use ruint::aliases::U256;

/// Mining difficulty, stored as the corresponding 256-bit target.
#[derive(Debug, Clone, Copy)]
pub struct Difficulty(Target);

impl Difficulty {
    /// Maximum difficulty (target of zero, unsatisfiable).
    pub const MAX: Self = Self(Target::ZERO);

    /// Create difficulty from a target (lossless).
    pub fn from_target(target: Target) -> Self {
        Self(target)
    }

    /// The underlying target (lossless); use this for share validation.
    pub fn to_target(self) -> Target {
        self.0
    }

    /// diff1 / target as a float.
    ///
    /// Computed as the 256-bit integer quotient plus the scaled remainder, so
    /// precision is lost only in this final conversion. A zero target maps to
    /// infinity.
    pub fn as_f64(self) -> f64 {
        let target = u256(self.0);
        if target == U256::ZERO {
            return f64::INFINITY;
        }
        let diff1 = u256(Target::MAX);
        let quotient = diff1 / target;
        let remainder = diff1 % target;
        u256_to_f64(quotient) + u256_to_f64(remainder) / u256_to_f64(target)
    }

    /// Convert to u64, saturating at the bounds.
    pub fn as_u64(self) -> u64 {
        let f = self.as_f64();
        if f >= u64::MAX as f64 {
            u64::MAX
        } else if f <= 0.0 {
            0
        } else {
            f as u64
        }
    }
}

impl From<u64> for Difficulty {
    fn from(diff: u64) -> Self {
        if diff == 0 {
            return Self(Target::MAX);
        }
        let target = u256(Target::MAX) / U256::from(diff);
        Self(Target::from_be_bytes(target.to_be_bytes()))
    }
}

impl PartialEq for Difficulty {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Difficulty {}

impl PartialOrd for Difficulty {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Difficulty {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smaller target = higher difficulty.
        other.0.cmp(&self.0)
    }
}

/// SI-suffixed rendering for log lines: "1.12T", "500G", "113".
impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.as_f64();

        if value < 1.0 {
            let s = format!("{:.6}", value);
            let trimmed = s.trim_end_matches('0').trim_end_matches('.');
            return write!(f, "{}", trimmed);
        }

        let (scaled, suffix) = if value >= 1e15 {
            (value / 1e15, "P")
        } else if value >= 1e12 {
            (value / 1e12, "T")
        } else if value >= 1e9 {
            (value / 1e9, "G")
        } else if value >= 1e6 {
            (value / 1e6, "M")
        } else if value >= 1e3 {
            (value / 1e3, "K")
        } else {
            (value, "")
        };

        if scaled >= 100.0 || scaled.fract() == 0.0 {
            write!(f, "{:.0}{}", scaled, suffix)
        } else if scaled >= 10.0 {
            write!(f, "{:.1}{}", scaled, suffix)
        } else {
            write!(f, "{:.2}{}", scaled, suffix)
        }
    }
}

fn u256(target: Target) -> U256 {
    U256::from_be_bytes(target.to_be_bytes())
}

fn u256_to_f64(v: U256) -> f64 {
    const LIMB_BASE: f64 = 18446744073709551616.0; // 2^64
    v.as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * LIMB_BASE + limb as f64)
}
