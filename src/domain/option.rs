use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionKind {
    #[default]
    Call,
    Put,
}

impl OptionKind {
    /// Payoff of exercising at `spot`
    #[inline]
    pub fn intrinsic(self, spot: f64, strike: f64) -> f64 {
        match self {
            OptionKind::Call => (spot - strike).max(0.0),
            OptionKind::Put => (strike - spot).max(0.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptionKind::Call => "CALL",
            OptionKind::Put => "PUT",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" | "C" => Ok(OptionKind::Call),
            "PUT" | "P" => Ok(OptionKind::Put),
            other => bail!("unknown option type '{}', expected CALL or PUT", other),
        }
    }
}

/// Everything a single-underlying pricer needs
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Contract {
    pub spot: f64,
    pub strike: f64,
    /// Years to expiry
    pub tenor: f64,
    pub rate: f64,
    pub sigma: f64,
    pub dividend_yield: f64,
    pub kind: OptionKind,
}

impl Contract {
    /// `e^{-rT}`
    #[inline]
    pub fn discount(&self) -> f64 {
        (-self.rate * self.tenor).exp()
    }

    #[inline]
    pub fn intrinsic(&self, spot: f64) -> f64 {
        self.kind.intrinsic(spot, self.strike)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BarrierDirection {
    Up,
    Down,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BarrierStyle {
    /// Pays the vanilla payoff unless the barrier was touched
    KnockOut,
    /// Pays the vanilla payoff only if the barrier was touched
    KnockIn,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BarrierKind {
    pub level: f64,
    pub direction: BarrierDirection,
    pub style: BarrierStyle,
}

impl BarrierKind {
    /// Parses "down-and-out", "up-and-in", ... (case-insensitive)
    pub fn parse(level: f64, barrier_type: &str) -> Result<Self> {
        let normalized = barrier_type.trim().to_ascii_lowercase().replace('_', "-");
        let (direction, style) = match normalized.as_str() {
            "down-and-out" => (BarrierDirection::Down, BarrierStyle::KnockOut),
            "up-and-out" => (BarrierDirection::Up, BarrierStyle::KnockOut),
            "down-and-in" => (BarrierDirection::Down, BarrierStyle::KnockIn),
            "up-and-in" => (BarrierDirection::Up, BarrierStyle::KnockIn),
            _ => bail!(
                "unknown barrier_type '{}', expected down-and-out, up-and-out, down-and-in or up-and-in",
                barrier_type
            ),
        };
        if !(level.is_finite() && level > 0.0) {
            bail!("barrier level must be positive, got {}", level);
        }
        Ok(Self {
            level,
            direction,
            style,
        })
    }

    /// Whether a path with the given running extremes touched the barrier
    #[inline]
    pub fn touched(&self, path_min: f64, path_max: f64) -> bool {
        match self.direction {
            BarrierDirection::Down => path_min <= self.level,
            BarrierDirection::Up => path_max >= self.level,
        }
    }

    pub fn label(&self) -> &'static str {
        match (self.direction, self.style) {
            (BarrierDirection::Down, BarrierStyle::KnockOut) => "down-and-out",
            (BarrierDirection::Up, BarrierStyle::KnockOut) => "up-and-out",
            (BarrierDirection::Down, BarrierStyle::KnockIn) => "down-and-in",
            (BarrierDirection::Up, BarrierStyle::KnockIn) => "up-and-in",
        }
    }
}
