use std::iter::FusedIterator;

use tracing::debug;

use super::types::{SimulationError, SimulationParameters, WeekSnapshot, year_of_week};

#[derive(Debug, Clone, Copy)]
struct Holding {
    shares: f64,
}

impl Holding {
    fn open(params: &SimulationParameters) -> Self {
        Self {
            shares: params.opening_shares(),
        }
    }

    /// Pays the dividend on the current share count and buys fractional shares
    /// with all of it at the fixed price. Returns the cash reinvested.
    fn reinvest_dividend(&mut self, params: &SimulationParameters) -> f64 {
        let dividend_cash = self.shares * params.dividend_per_share;
        self.shares += dividend_cash / params.share_price;
        dividend_cash
    }

    fn value(self, share_price: f64) -> f64 {
        self.shares * share_price
    }
}

pub fn is_payout_week(week: u32, payout_interval_weeks: u32) -> bool {
    payout_interval_weeks != 0 && week % payout_interval_weeks == 0
}

/// Week-by-week reinvestment run, produced lazily.
#[derive(Debug, Clone)]
pub struct Simulation {
    params: SimulationParameters,
    holding: Holding,
    next_week: u64,
}

impl Simulation {
    pub fn new(params: SimulationParameters) -> Result<Self, SimulationError> {
        params.validate()?;
        Ok(Self {
            holding: Holding::open(&params),
            params,
            next_week: 1,
        })
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    fn step(&mut self, week: u32) -> WeekSnapshot {
        let dividend_cash = if is_payout_week(week, self.params.payout_interval_weeks) {
            self.holding.reinvest_dividend(&self.params)
        } else {
            0.0
        };

        WeekSnapshot {
            week,
            year: year_of_week(week),
            shares: self.holding.shares,
            portfolio_value: self.holding.value(self.params.share_price),
            dividend_cash,
        }
    }

    fn remaining(&self) -> usize {
        (u64::from(self.params.horizon_weeks) + 1).saturating_sub(self.next_week) as usize
    }
}

impl Iterator for Simulation {
    type Item = WeekSnapshot;

    fn next(&mut self) -> Option<WeekSnapshot> {
        let week = u32::try_from(self.next_week)
            .ok()
            .filter(|week| *week <= self.params.horizon_weeks)?;
        self.next_week += 1;
        Some(self.step(week))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Simulation {}

impl FusedIterator for Simulation {}

pub fn weeks(params: &SimulationParameters) -> Result<Simulation, SimulationError> {
    Simulation::new(*params)
}

pub fn simulate(params: &SimulationParameters) -> Result<Vec<WeekSnapshot>, SimulationError> {
    let simulation = weeks(params)?;
    debug!(
        horizon_weeks = params.horizon_weeks,
        payout_interval_weeks = params.payout_interval_weeks,
        "running dividend reinvestment simulation"
    );
    Ok(simulation.collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_params() -> SimulationParameters {
        SimulationParameters {
            initial_investment: 1_000.0,
            share_price: 10.0,
            dividend_per_share: 0.17,
            payout_interval_weeks: 13,
            horizon_weeks: 13,
        }
    }

    #[test]
    fn quarterly_payout_lands_on_week_thirteen() {
        let snapshots = simulate(&sample_params()).expect("valid params");
        assert_eq!(snapshots.len(), 13);

        for snap in &snapshots[..12] {
            assert_approx(snap.shares, 100.0);
            assert_approx(snap.portfolio_value, 1_000.0);
            assert_eq!(snap.dividend_cash, 0.0);
        }

        let last = snapshots[12];
        assert_eq!(last.week, 13);
        assert_approx(last.dividend_cash, 17.0);
        assert_approx(last.shares, 101.7);
        assert_approx(last.portfolio_value, 1_017.0);
    }

    #[test]
    fn single_week_before_first_payout_keeps_opening_shares() {
        let mut params = sample_params();
        params.horizon_weeks = 1;
        params.payout_interval_weeks = 4;

        let snapshots = simulate(&params).expect("valid params");
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].week, 1);
        assert_eq!(snapshots[0].year, 1);
        assert_eq!(snapshots[0].shares, params.opening_shares());
        assert_eq!(snapshots[0].dividend_cash, 0.0);
    }

    #[test]
    fn weekly_payouts_compound() {
        let mut params = sample_params();
        params.dividend_per_share = 0.5;
        params.payout_interval_weeks = 1;
        params.horizon_weeks = 3;

        let snapshots = simulate(&params).expect("valid params");
        // Each payout grows the holding by 5%.
        assert_approx(snapshots[0].shares, 105.0);
        assert_approx(snapshots[1].shares, 110.25);
        assert_approx(snapshots[2].shares, 115.7625);
        assert_approx(snapshots[2].dividend_cash, 55.125);
    }

    #[test]
    fn interval_longer_than_horizon_never_pays() {
        let mut params = sample_params();
        params.payout_interval_weeks = 60;
        params.horizon_weeks = 59;

        let snapshots = simulate(&params).expect("valid params");
        assert!(snapshots.iter().all(|s| s.shares == 100.0));
    }

    #[test]
    fn zero_investment_stays_at_zero() {
        let mut params = sample_params();
        params.initial_investment = 0.0;
        params.payout_interval_weeks = 1;

        let snapshots = simulate(&params).expect("valid params");
        assert!(snapshots.iter().all(|s| s.shares == 0.0 && s.portfolio_value == 0.0));
    }

    #[test]
    fn year_boundaries_follow_52_week_blocks() {
        let mut params = sample_params();
        params.horizon_weeks = 105;

        let snapshots = simulate(&params).expect("valid params");
        assert_eq!(snapshots[51].year, 1);
        assert_eq!(snapshots[52].year, 2);
        assert_eq!(snapshots[103].year, 2);
        assert_eq!(snapshots[104].year, 3);
    }

    #[test]
    fn rejects_non_positive_share_price() {
        for price in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut params = sample_params();
            params.share_price = price;
            let err = simulate(&params).expect_err("must reject price");
            assert_eq!(err.parameter(), "share_price");
        }
    }

    #[test]
    fn rejects_opening_share_count_that_overflows() {
        let params = SimulationParameters {
            initial_investment: 1e308,
            share_price: 1e-10,
            dividend_per_share: 0.0,
            payout_interval_weeks: 1,
            horizon_weeks: 2,
        };
        let err = simulate(&params).expect_err("opening shares overflow to infinity");
        assert_eq!(err.parameter(), "initial_investment");
        assert!(weeks(&params).is_err());
    }

    #[test]
    fn rejects_zero_interval_and_horizon() {
        let mut params = sample_params();
        params.payout_interval_weeks = 0;
        assert_eq!(
            simulate(&params).expect_err("zero interval").parameter(),
            "payout_interval_weeks"
        );

        let mut params = sample_params();
        params.horizon_weeks = 0;
        assert_eq!(
            simulate(&params).expect_err("zero horizon").parameter(),
            "horizon_weeks"
        );
    }

    #[test]
    fn rejects_negative_investment_and_dividend() {
        let mut params = sample_params();
        params.initial_investment = -5.0;
        assert_eq!(
            simulate(&params).expect_err("negative investment").parameter(),
            "initial_investment"
        );

        let mut params = sample_params();
        params.dividend_per_share = -0.01;
        assert_eq!(
            simulate(&params).expect_err("negative dividend").parameter(),
            "dividend_per_share"
        );
    }

    #[test]
    fn lazy_iterator_matches_collected_run() {
        let mut params = sample_params();
        params.horizon_weeks = 40;
        params.payout_interval_weeks = 4;

        let mut lazy = weeks(&params).expect("valid params");
        assert_eq!(lazy.len(), 40);
        let first = lazy.next().expect("week 1");
        assert_eq!(first.week, 1);
        assert_eq!(lazy.len(), 39);

        let rest: Vec<_> = lazy.collect();
        let eager = simulate(&params).expect("valid params");
        assert_eq!(eager[0], first);
        assert_eq!(&eager[1..], rest.as_slice());
    }

    #[test]
    fn is_payout_week_uses_exact_multiples() {
        assert!(!is_payout_week(1, 4));
        assert!(is_payout_week(4, 4));
        assert!(is_payout_week(8, 4));
        assert!(is_payout_week(1, 1));
        assert!(!is_payout_week(3, 0));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_snapshots_cover_every_week_in_order(
            investment_cents in 0u32..10_000_000,
            price_cents in 1u32..100_000,
            dividend_cents in 0u32..500,
            interval in 1u32..60,
            horizon in 1u32..400
        ) {
            let params = SimulationParameters {
                initial_investment: investment_cents as f64 / 100.0,
                share_price: price_cents as f64 / 100.0,
                dividend_per_share: dividend_cents as f64 / 100.0,
                payout_interval_weeks: interval,
                horizon_weeks: horizon,
            };
            let snapshots = simulate(&params).expect("valid params");

            prop_assert_eq!(snapshots.len(), horizon as usize);
            let mut previous_shares = params.opening_shares();
            for (idx, snap) in snapshots.iter().enumerate() {
                let week = idx as u32 + 1;
                prop_assert_eq!(snap.week, week);
                prop_assert_eq!(snap.year, (week - 1) / 52 + 1);
                prop_assert!(snap.shares >= previous_shares);

                if week % interval == 0 {
                    let expected_cash = previous_shares * params.dividend_per_share;
                    let tolerance = 1e-9 * expected_cash.max(1.0);
                    prop_assert!((snap.dividend_cash - expected_cash).abs() <= tolerance);
                } else {
                    prop_assert_eq!(snap.shares, previous_shares);
                    prop_assert_eq!(snap.dividend_cash, 0.0);
                }

                let expected_value = snap.shares * params.share_price;
                let tolerance = 1e-9 * expected_value.max(1.0);
                prop_assert!((snap.portfolio_value - expected_value).abs() <= tolerance);
                previous_shares = snap.shares;
            }
        }

        #[test]
        fn prop_zero_dividend_keeps_shares_constant(
            investment_cents in 0u32..10_000_000,
            price_cents in 1u32..100_000,
            interval in 1u32..60,
            horizon in 1u32..300
        ) {
            let params = SimulationParameters {
                initial_investment: investment_cents as f64 / 100.0,
                share_price: price_cents as f64 / 100.0,
                dividend_per_share: 0.0,
                payout_interval_weeks: interval,
                horizon_weeks: horizon,
            };
            let opening = params.opening_shares();
            for snap in simulate(&params).expect("valid params") {
                prop_assert_eq!(snap.shares, opening);
            }
        }
    }
}
