use serde::Serialize;
use thiserror::Error;

pub const WEEKS_PER_YEAR: u32 = 52;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl SimulationError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub fn parameter(&self) -> &'static str {
        match self {
            Self::InvalidParameter { name, .. } => name,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::InvalidParameter { reason, .. } => reason,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PayoutFrequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

impl PayoutFrequency {
    pub const ALL: [PayoutFrequency; 4] = [
        PayoutFrequency::Weekly,
        PayoutFrequency::Biweekly,
        PayoutFrequency::Monthly,
        PayoutFrequency::Quarterly,
    ];

    pub fn interval_weeks(self) -> u32 {
        match self {
            PayoutFrequency::Weekly => 1,
            PayoutFrequency::Biweekly => 2,
            PayoutFrequency::Monthly => 4,
            PayoutFrequency::Quarterly => 13,
        }
    }

    pub fn from_interval(weeks: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.interval_weeks() == weeks)
    }

    pub fn label(self) -> &'static str {
        match self {
            PayoutFrequency::Weekly => "Weekly",
            PayoutFrequency::Biweekly => "Biweekly",
            PayoutFrequency::Monthly => "Monthly",
            PayoutFrequency::Quarterly => "Quarterly",
        }
    }
}

/// Inputs for one simulation run. Price and dividend stay fixed for the whole
/// horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    pub initial_investment: f64,
    pub share_price: f64,
    pub dividend_per_share: f64,
    pub payout_interval_weeks: u32,
    pub horizon_weeks: u32,
}

impl SimulationParameters {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !self.initial_investment.is_finite() || self.initial_investment < 0.0 {
            return Err(SimulationError::invalid(
                "initial_investment",
                format!("must be a finite value >= 0, got {}", self.initial_investment),
            ));
        }

        if !self.share_price.is_finite() || self.share_price <= 0.0 {
            return Err(SimulationError::invalid(
                "share_price",
                format!("must be a finite value > 0, got {}", self.share_price),
            ));
        }

        if !self.dividend_per_share.is_finite() || self.dividend_per_share < 0.0 {
            return Err(SimulationError::invalid(
                "dividend_per_share",
                format!("must be a finite value >= 0, got {}", self.dividend_per_share),
            ));
        }

        if self.payout_interval_weeks == 0 {
            return Err(SimulationError::invalid("payout_interval_weeks", "must be > 0"));
        }

        if self.horizon_weeks == 0 {
            return Err(SimulationError::invalid("horizon_weeks", "must be > 0"));
        }

        if !self.opening_shares().is_finite() {
            return Err(SimulationError::invalid(
                "initial_investment",
                format!(
                    "buys a non-finite share count at price {} (overflow)",
                    self.share_price
                ),
            ));
        }

        Ok(())
    }

    pub fn opening_shares(&self) -> f64 {
        self.initial_investment / self.share_price
    }
}

/// Holding state at the end of one simulated week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSnapshot {
    pub week: u32,
    pub year: u32,
    pub shares: f64,
    pub portfolio_value: f64,
    /// Cash paid out and reinvested this week; zero outside payout weeks.
    pub dividend_cash: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSnapshot {
    pub year: u32,
    pub last_week: u32,
    pub shares: f64,
    pub portfolio_value: f64,
    pub dividend_cash: f64,
}

impl YearSnapshot {
    /// The week row this yearly row was reduced from, carrying the year's
    /// dividend total.
    pub fn as_week_snapshot(&self) -> WeekSnapshot {
        WeekSnapshot {
            week: self.last_week,
            year: self.year,
            shares: self.shares,
            portfolio_value: self.portfolio_value,
            dividend_cash: self.dividend_cash,
        }
    }
}

pub fn year_of_week(week: u32) -> u32 {
    (week.saturating_sub(1) / WEEKS_PER_YEAR) + 1
}
