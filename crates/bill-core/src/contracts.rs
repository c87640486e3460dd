use crate::error::{BillError, Result};
use std::fmt;
use std::str::FromStr;

// ── Contract families ─────────────────────────────────────────────────────────

/// Low-voltage power contract family.
pub const LOW_VOLTAGE_ALPHA: &str = "低圧電力α";

/// Seasonal time-of-use lighting contract family.
pub const SEASONAL_TIME_OF_USE: &str = "灯季時別";

/// Contract families whose same-period bills are merged in the combined view.
pub const MERGEABLE_CONTRACTS: [&str; 2] = [LOW_VOLTAGE_ALPHA, SEASONAL_TIME_OF_USE];

/// `true` when `contract_type` belongs to one of the mergeable families.
pub fn is_mergeable_contract(contract_type: &str) -> bool {
    MERGEABLE_CONTRACTS
        .iter()
        .any(|token| contract_type.contains(token))
}

// ── ViewMode ──────────────────────────────────────────────────────────────────

/// How the bill list is filtered or merged before display and export.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Every record, unfiltered.
    #[default]
    AllRecords,
    /// Records whose contract type contains the token (case-sensitive).
    FilterByContractSubstring(String),
    /// Mergeable contracts summed per billing period.
    CombinedByPeriod,
}

impl ViewMode {
    /// The preset modes offered on the command line and cycled in the UI.
    pub fn presets() -> Vec<ViewMode> {
        vec![
            ViewMode::AllRecords,
            ViewMode::FilterByContractSubstring(LOW_VOLTAGE_ALPHA.to_string()),
            ViewMode::FilterByContractSubstring(SEASONAL_TIME_OF_USE.to_string()),
            ViewMode::CombinedByPeriod,
        ]
    }

    /// Human-readable label shown in headers and status lines.
    pub fn label(&self) -> String {
        match self {
            ViewMode::AllRecords => "全ての記録".to_string(),
            ViewMode::FilterByContractSubstring(token) => token.clone(),
            ViewMode::CombinedByPeriod => {
                format!("{} / {} 合算", LOW_VOLTAGE_ALPHA, SEASONAL_TIME_OF_USE)
            }
        }
    }

    /// The next preset, wrapping around. Custom filters restart the cycle.
    pub fn next(&self) -> ViewMode {
        let presets = Self::presets();
        let idx = presets.iter().position(|m| m == self);
        match idx {
            Some(i) => presets[(i + 1) % presets.len()].clone(),
            None => ViewMode::AllRecords,
        }
    }
}

impl FromStr for ViewMode {
    type Err = BillError;

    /// Parse a preset name: `all`, `alpha`, `toukijibetsu` or `combined`.
    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "all" => Ok(ViewMode::AllRecords),
            "alpha" => Ok(ViewMode::FilterByContractSubstring(
                LOW_VOLTAGE_ALPHA.to_string(),
            )),
            "toukijibetsu" => Ok(ViewMode::FilterByContractSubstring(
                SEASONAL_TIME_OF_USE.to_string(),
            )),
            "combined" => Ok(ViewMode::CombinedByPeriod),
            other => Err(BillError::Config(format!("unknown view mode: {other}"))),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
