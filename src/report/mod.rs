//! Table and CSV renderings of a simulation run.
//!
//! Rounding happens here only; the engine hands over raw `f64` values.

use serde::Serialize;

use crate::core::{WeekSnapshot, YearSnapshot, to_yearly};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Weekly,
    Yearly,
}

impl ViewMode {
    pub fn period_label(self) -> &'static str {
        match self {
            ViewMode::Weekly => "Week",
            ViewMode::Yearly => "Year",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ViewMode::Weekly => "Weekly",
            ViewMode::Yearly => "Yearly",
        }
    }

    pub fn csv_file_name(self) -> String {
        format!("dividend_breakdown_{}.csv", self.title().to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRow {
    pub period: u32,
    pub shares: f64,
    pub portfolio_value: f64,
    pub dividend_cash: f64,
}

impl From<&WeekSnapshot> for BreakdownRow {
    fn from(snap: &WeekSnapshot) -> Self {
        Self {
            period: snap.week,
            shares: snap.shares,
            portfolio_value: snap.portfolio_value,
            dividend_cash: snap.dividend_cash,
        }
    }
}

impl From<&YearSnapshot> for BreakdownRow {
    fn from(snap: &YearSnapshot) -> Self {
        Self {
            period: snap.year,
            shares: snap.shares,
            portfolio_value: snap.portfolio_value,
            dividend_cash: snap.dividend_cash,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Breakdown {
    pub view: ViewMode,
    pub rows: Vec<BreakdownRow>,
}

impl Breakdown {
    pub fn from_weeks(view: ViewMode, weekly: &[WeekSnapshot]) -> Self {
        let rows = match view {
            ViewMode::Weekly => weekly.iter().map(BreakdownRow::from).collect(),
            ViewMode::Yearly => to_yearly(weekly).iter().map(BreakdownRow::from).collect(),
        };
        Self { view, rows }
    }

    pub fn csv_file_name(&self) -> String {
        self.view.csv_file_name()
    }

    pub fn to_csv(&self) -> String {
        let mut out = format!("{},Shares,Portfolio Value\n", self.view.period_label());
        for row in &self.rows {
            out.push_str(&format!(
                "{},{},{}\n",
                row.period, row.shares, row.portfolio_value
            ));
        }
        out
    }

    pub fn render_table(&self) -> String {
        let header = [
            self.view.period_label().to_string(),
            "Shares".to_string(),
            "Portfolio Value".to_string(),
        ];
        let body: Vec<[String; 3]> = self
            .rows
            .iter()
            .map(|row| {
                [
                    row.period.to_string(),
                    format_shares(row.shares),
                    format_currency(row.portfolio_value),
                ]
            })
            .collect();

        let mut widths = header.each_ref().map(|cell| cell.len());
        for cells in &body {
            for (width, cell) in widths.iter_mut().zip(cells) {
                *width = (*width).max(cell.len());
            }
        }

        let mut out = format!("{} Portfolio Breakdown\n", self.view.title());
        push_table_line(&mut out, &header, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("  "));
        out.push('\n');
        for cells in &body {
            push_table_line(&mut out, cells, &widths);
        }
        out
    }
}

fn push_table_line(out: &mut String, cells: &[String; 3], widths: &[usize; 3]) {
    let line = format!(
        "{:>w0$}  {:>w1$}  {:>w2$}",
        cells[0],
        cells[1],
        cells[2],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
    );
    out.push_str(line.trim_end());
    out.push('\n');
}

pub fn format_shares(shares: f64) -> String {
    format!("{shares:.4}")
}

/// Dollar amount with thousands separators and two decimals, e.g. `$1,234.50`.
pub fn format_currency(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, digit) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}
