use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Json, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum, error::ErrorKind};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    PayoutFrequency, SimulationError, SimulationParameters, WeekSnapshot, simulate,
};
use crate::market::{
    MarketDataError, Prefill, Quote, QuoteProvider, YahooQuotes, lookup_or_warn,
};
use crate::report::{Breakdown, BreakdownRow, ViewMode, format_currency};

/// Largest horizon the CLI and HTTP surfaces accept (1000 years).
pub const MAX_HORIZON_WEEKS: u32 = 52_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFrequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

impl From<CliFrequency> for PayoutFrequency {
    fn from(value: CliFrequency) -> Self {
        match value {
            CliFrequency::Weekly => PayoutFrequency::Weekly,
            CliFrequency::Biweekly => PayoutFrequency::Biweekly,
            CliFrequency::Monthly => PayoutFrequency::Monthly,
            CliFrequency::Quarterly => PayoutFrequency::Quarterly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliView {
    Weekly,
    Yearly,
}

impl From<CliView> for ViewMode {
    fn from(value: CliView) -> Self {
        match value {
            CliView::Weekly => ViewMode::Weekly,
            CliView::Yearly => ViewMode::Yearly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFormat {
    Table,
    Csv,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiFrequency {
    #[serde(alias = "Weekly")]
    Weekly,
    #[serde(alias = "Biweekly", alias = "bi-weekly", alias = "fortnightly")]
    Biweekly,
    #[serde(alias = "Monthly")]
    Monthly,
    #[serde(alias = "Quarterly")]
    Quarterly,
}

impl From<ApiFrequency> for CliFrequency {
    fn from(value: ApiFrequency) -> Self {
        match value {
            ApiFrequency::Weekly => CliFrequency::Weekly,
            ApiFrequency::Biweekly => CliFrequency::Biweekly,
            ApiFrequency::Monthly => CliFrequency::Monthly,
            ApiFrequency::Quarterly => CliFrequency::Quarterly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiView {
    #[serde(alias = "Weekly", alias = "week")]
    Weekly,
    #[serde(alias = "Yearly", alias = "year")]
    Yearly,
}

impl From<ApiView> for CliView {
    fn from(value: ApiView) -> Self {
        match value {
            ApiView::Weekly => CliView::Weekly,
            ApiView::Yearly => CliView::Yearly,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    initial_investment: Option<f64>,
    share_price: Option<f64>,
    dividend_per_share: Option<f64>,
    frequency: Option<ApiFrequency>,
    payout_interval_weeks: Option<u32>,
    weeks: Option<u32>,
    view: Option<ApiView>,
    ticker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteQuery {
    symbol: String,
}

#[derive(Parser, Debug)]
#[command(
    name = "drip",
    about = "Dividend reinvestment growth simulator (run `drip serve [port]` for the HTTP API)"
)]
struct Cli {
    #[arg(long, default_value_t = 1000.0, help = "Initial investment in dollars")]
    initial_investment: f64,
    #[arg(long, help = "Share price in dollars; defaults to the ticker quote or 10")]
    share_price: Option<f64>,
    #[arg(
        long,
        help = "Dividend per share per payout; defaults to the ticker estimate or 0.17"
    )]
    dividend_per_share: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliFrequency::Weekly)]
    frequency: CliFrequency,
    #[arg(long, help = "Weeks between payouts; overrides --frequency")]
    payout_interval_weeks: Option<u32>,
    #[arg(long, default_value_t = 104, help = "Simulation duration in weeks")]
    weeks: u32,
    #[arg(long, value_enum, default_value_t = CliView::Weekly)]
    view: CliView,
    #[arg(long, value_enum, default_value_t = CliFormat::Table)]
    format: CliFormat,
    #[arg(long, help = "Write the report to this file instead of stdout")]
    output: Option<PathBuf>,
    #[arg(long, help = "Pre-fill price and dividend from live market data")]
    ticker: Option<String>,
}

#[derive(Debug)]
struct RunRequest {
    params: SimulationParameters,
    view: ViewMode,
    quote: Option<Quote>,
    quote_warning: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    view: ViewMode,
    period_label: &'static str,
    frequency: Option<&'static str>,
    parameters: SimulationParameters,
    quote: Option<Quote>,
    quote_warning: Option<String>,
    final_shares: f64,
    final_portfolio_value: f64,
    total_dividends: f64,
    rows: Vec<BreakdownRow>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    quotes: Arc<YahooQuotes>,
}

fn build_params(cli: &Cli, prefill: Prefill) -> Result<SimulationParameters, String> {
    if cli.weeks > MAX_HORIZON_WEEKS {
        return Err(format!("--weeks must be <= {MAX_HORIZON_WEEKS}"));
    }

    let params = SimulationParameters {
        initial_investment: cli.initial_investment,
        share_price: cli.share_price.unwrap_or(prefill.share_price),
        dividend_per_share: cli.dividend_per_share.unwrap_or(prefill.dividend_per_share),
        payout_interval_weeks: cli
            .payout_interval_weeks
            .unwrap_or_else(|| PayoutFrequency::from(cli.frequency).interval_weeks()),
        horizon_weeks: cli.weeks,
    };
    params.validate().map_err(|e| flag_error(&e))?;
    Ok(params)
}

/// Rephrases a core validation error in terms of the flag that set the value.
fn flag_error(err: &SimulationError) -> String {
    let flag = match err.parameter() {
        "initial_investment" => "--initial-investment",
        "share_price" => "--share-price",
        "dividend_per_share" => "--dividend-per-share",
        "payout_interval_weeks" => "--payout-interval-weeks",
        "horizon_weeks" => "--weeks",
        _ => return err.to_string(),
    };
    format!("{flag} {}", err.reason())
}

async fn resolve_request<P: QuoteProvider>(cli: Cli, provider: &P) -> Result<RunRequest, String> {
    let ticker = cli
        .ticker
        .as_deref()
        .map(str::trim)
        .filter(|symbol| !symbol.is_empty());
    let (quote, quote_warning) = match ticker {
        Some(symbol) => lookup_or_warn(provider, symbol).await,
        None => (None, None),
    };

    let prefill = Prefill::default().overridden_by(quote.as_ref());
    let params = build_params(&cli, prefill)?;
    Ok(RunRequest {
        params,
        view: cli.view.into(),
        quote,
        quote_warning,
    })
}

fn run_request(request: &RunRequest) -> Result<Vec<WeekSnapshot>, String> {
    simulate(&request.params).map_err(|e| e.to_string())
}

fn build_simulate_response(request: &RunRequest, weekly: &[WeekSnapshot]) -> SimulateResponse {
    let breakdown = Breakdown::from_weeks(request.view, weekly);
    let last = weekly.last();
    SimulateResponse {
        view: request.view,
        period_label: request.view.period_label(),
        frequency: PayoutFrequency::from_interval(request.params.payout_interval_weeks)
            .map(PayoutFrequency::label),
        parameters: request.params,
        quote: request.quote.clone(),
        quote_warning: request.quote_warning.clone(),
        final_shares: last.map_or(request.params.opening_shares(), |s| s.shares),
        final_portfolio_value: last.map_or(request.params.initial_investment, |s| {
            s.portfolio_value
        }),
        total_dividends: weekly.iter().map(|s| s.dividend_cash).sum(),
        rows: breakdown.rows,
    }
}

fn render_cli_report(
    request: &RunRequest,
    weekly: &[WeekSnapshot],
    format: CliFormat,
) -> Result<String, String> {
    match format {
        CliFormat::Csv => Ok(Breakdown::from_weeks(request.view, weekly).to_csv()),
        CliFormat::Json => {
            let response = build_simulate_response(request, weekly);
            serde_json::to_string_pretty(&response)
                .map(|json| format!("{json}\n"))
                .map_err(|e| format!("failed to serialize report: {e}"))
        }
        CliFormat::Table => {
            let mut out = String::new();
            if let Some(quote) = &request.quote {
                out.push_str(&format!(
                    "Loaded: {} | Price: {} | Est. Dividend: {}\n\n",
                    quote.symbol,
                    format_currency(quote.share_price),
                    format_currency(quote.dividend_per_share)
                ));
            }
            if let Some(warning) = &request.quote_warning {
                out.push_str(&format!("Warning: {warning}\n\n"));
            }
            out.push_str(&Breakdown::from_weeks(request.view, weekly).render_table());
            Ok(out)
        }
    }
}

/// Runs a single simulation from command-line flags and prints or writes the
/// report.
pub async fn run_cli<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{err}");
            return Ok(());
        }
        Err(err) => {
            let rendered = err.to_string();
            return Err(rendered.trim_start_matches("error: ").trim_end().to_string());
        }
    };
    let format = cli.format;
    let output = cli.output.clone();

    let request = resolve_request(cli, &YahooQuotes::new()).await?;
    let weekly = run_request(&request)?;
    let report = render_cli_report(&request, &weekly, format)?;

    match output {
        Some(path) => {
            std::fs::write(&path, report)
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => print!("{report}"),
    }
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let state = AppState {
        quotes: Arc::new(YahooQuotes::new()),
    };
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/export.csv",
            get(export_get_handler).post(export_post_handler),
        )
        .route("/api/quote", get(quote_handler))
        .fallback(not_found_handler)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "dividend reinvestment API listening");
    info!("local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(
    State(state): State<AppState>,
    payload: Result<Query<SimulatePayload>, QueryRejection>,
) -> Response {
    match payload {
        Ok(Query(payload)) => simulate_handler_impl(state.quotes.as_ref(), payload).await,
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    }
}

async fn simulate_post_handler(
    State(state): State<AppState>,
    payload: Result<Json<SimulatePayload>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(payload)) => simulate_handler_impl(state.quotes.as_ref(), payload).await,
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    }
}

async fn export_get_handler(
    State(state): State<AppState>,
    payload: Result<Query<SimulatePayload>, QueryRejection>,
) -> Response {
    match payload {
        Ok(Query(payload)) => export_handler_impl(state.quotes.as_ref(), payload).await,
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    }
}

async fn export_post_handler(
    State(state): State<AppState>,
    payload: Result<Json<SimulatePayload>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(payload)) => export_handler_impl(state.quotes.as_ref(), payload).await,
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    }
}

async fn quote_handler(
    State(state): State<AppState>,
    query: Result<Query<QuoteQuery>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(query)) => quote_handler_impl(state.quotes.as_ref(), &query.symbol).await,
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    }
}

async fn quote_handler_impl<P: QuoteProvider>(provider: &P, symbol: &str) -> Response {
    match provider.lookup(symbol).await {
        Ok(quote) => json_response(StatusCode::OK, quote),
        Err(err @ MarketDataError::InvalidSymbol(_)) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(err @ MarketDataError::DataUnavailable { .. }) => {
            error_response(StatusCode::BAD_GATEWAY, &err.to_string())
        }
    }
}

async fn prepare_run<P: QuoteProvider>(
    provider: &P,
    payload: SimulatePayload,
) -> Result<(RunRequest, Vec<WeekSnapshot>), String> {
    let cli = cli_from_payload(payload);
    let request = resolve_request(cli, provider).await?;
    let weekly = run_request(&request)?;
    info!(
        weeks = request.params.horizon_weeks,
        interval = request.params.payout_interval_weeks,
        view = request.view.title(),
        "simulation served"
    );
    Ok((request, weekly))
}

async fn simulate_handler_impl<P: QuoteProvider>(
    provider: &P,
    payload: SimulatePayload,
) -> Response {
    match prepare_run(provider, payload).await {
        Ok((request, weekly)) => {
            json_response(StatusCode::OK, build_simulate_response(&request, &weekly))
        }
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn export_handler_impl<P: QuoteProvider>(
    provider: &P,
    payload: SimulatePayload,
) -> Response {
    match prepare_run(provider, payload).await {
        Ok((request, weekly)) => csv_response(&Breakdown::from_weeks(request.view, &weekly)),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn csv_response(breakdown: &Breakdown) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", breakdown.csv_file_name());
    with_cache_control((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        breakdown.to_csv(),
    ))
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn payload_from_json(json: &str) -> Result<SimulatePayload, String> {
    serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))
}

fn cli_from_payload(payload: SimulatePayload) -> Cli {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.initial_investment {
        cli.initial_investment = v;
    }
    if payload.share_price.is_some() {
        cli.share_price = payload.share_price;
    }
    if payload.dividend_per_share.is_some() {
        cli.dividend_per_share = payload.dividend_per_share;
    }
    if let Some(v) = payload.frequency {
        cli.frequency = v.into();
    }
    if payload.payout_interval_weeks.is_some() {
        cli.payout_interval_weeks = payload.payout_interval_weeks;
    }
    if let Some(v) = payload.weeks {
        cli.weeks = v;
    }
    if let Some(v) = payload.view {
        cli.view = v.into();
    }
    if payload.ticker.is_some() {
        cli.ticker = payload.ticker;
    }

    cli
}

fn default_cli_for_api() -> Cli {
    Cli {
        initial_investment: 1000.0,
        share_price: None,
        dividend_per_share: None,
        frequency: CliFrequency::Weekly,
        payout_interval_weeks: None,
        weeks: 104,
        view: CliView::Weekly,
        format: CliFormat::Json,
        output: None,
        ticker: None,
    }
}
