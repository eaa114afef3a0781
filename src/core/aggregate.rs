use std::collections::BTreeMap;

use super::types::{WeekSnapshot, YearSnapshot};

/// Reduces weekly rows to one row per year, taken from the latest week seen
/// for that year. A partial final year reports the last simulated week.
pub fn to_yearly(weekly: &[WeekSnapshot]) -> Vec<YearSnapshot> {
    let mut years: BTreeMap<u32, YearSnapshot> = BTreeMap::new();

    for snap in weekly {
        years
            .entry(snap.year)
            .and_modify(|row| {
                row.dividend_cash += snap.dividend_cash;
                if snap.week >= row.last_week {
                    row.last_week = snap.week;
                    row.shares = snap.shares;
                    row.portfolio_value = snap.portfolio_value;
                }
            })
            .or_insert(YearSnapshot {
                year: snap.year,
                last_week: snap.week,
                shares: snap.shares,
                portfolio_value: snap.portfolio_value,
                dividend_cash: snap.dividend_cash,
            });
    }

    years.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SimulationParameters, simulate};

    fn weekly_params(horizon_weeks: u32) -> SimulationParameters {
        SimulationParameters {
            initial_investment: 1_000.0,
            share_price: 10.0,
            dividend_per_share: 0.01,
            payout_interval_weeks: 1,
            horizon_weeks,
        }
    }

    #[test]
    fn two_full_years_reduce_to_weeks_52_and_104() {
        let weekly = simulate(&weekly_params(104)).expect("valid params");
        let yearly = to_yearly(&weekly);

        assert_eq!(yearly.len(), 2);
        assert_eq!(yearly[0].year, 1);
        assert_eq!(yearly[0].last_week, 52);
        assert_eq!(yearly[0].shares, weekly[51].shares);
        assert_eq!(yearly[0].portfolio_value, weekly[51].portfolio_value);
        assert_eq!(yearly[1].year, 2);
        assert_eq!(yearly[1].last_week, 104);
        assert_eq!(yearly[1].shares, weekly[103].shares);
    }

    #[test]
    fn partial_final_year_reports_last_simulated_week() {
        let weekly = simulate(&weekly_params(60)).expect("valid params");
        let yearly = to_yearly(&weekly);

        assert_eq!(yearly.len(), 2);
        assert_eq!(yearly[1].last_week, 60);
        assert_eq!(yearly[1].portfolio_value, weekly[59].portfolio_value);
    }

    #[test]
    fn dividend_cash_is_summed_per_year() {
        let weekly = simulate(&weekly_params(104)).expect("valid params");
        let yearly = to_yearly(&weekly);

        let first_year: f64 = weekly[..52].iter().map(|s| s.dividend_cash).sum();
        let second_year: f64 = weekly[52..].iter().map(|s| s.dividend_cash).sum();
        assert!((yearly[0].dividend_cash - first_year).abs() <= 1e-9);
        assert!((yearly[1].dividend_cash - second_year).abs() <= 1e-9);
    }

    #[test]
    fn empty_sequence_yields_no_years() {
        assert!(to_yearly(&[]).is_empty());
    }

    #[test]
    fn unordered_input_still_keeps_latest_week() {
        let weekly = simulate(&weekly_params(53)).expect("valid params");
        let mut shuffled = weekly.clone();
        shuffled.reverse();

        let in_order = to_yearly(&weekly);
        let reversed = to_yearly(&shuffled);
        assert_eq!(reversed.len(), in_order.len());
        for (left, right) in reversed.iter().zip(&in_order) {
            assert_eq!(left.year, right.year);
            assert_eq!(left.last_week, right.last_week);
            assert_eq!(left.shares, right.shares);
            assert_eq!(left.portfolio_value, right.portfolio_value);
            // Summation order differs, so only the last bits may move.
            assert!((left.dividend_cash - right.dividend_cash).abs() <= 1e-9);
        }
    }

    #[test]
    fn reaggregating_yearly_rows_is_a_no_op() {
        let weekly = simulate(&weekly_params(150)).expect("valid params");
        let yearly = to_yearly(&weekly);
        let as_weeks: Vec<WeekSnapshot> = yearly
            .iter()
            .map(YearSnapshot::as_week_snapshot)
            .collect();

        assert_eq!(to_yearly(&as_weeks), yearly);
    }
}
