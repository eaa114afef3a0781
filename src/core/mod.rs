mod aggregate;
mod engine;
mod types;

pub use aggregate::to_yearly;
pub use engine::{Simulation, is_payout_week, simulate, weeks};
pub use types::{
    PayoutFrequency, SimulationError, SimulationParameters, WEEKS_PER_YEAR, WeekSnapshot,
    YearSnapshot, year_of_week,
};
