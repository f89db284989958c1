pub mod format;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    CancelToken, EngineError, HistogramBin, PaybackResult, Scenario, SimulationConfig,
    SimulationSummary, analyze_project, apply_variation, histogram, irr_sign_changes,
    run_simulation, summarize,
};
use format::{CurrencyFormat, format_percent};

pub const DEFAULT_PORT: u16 = 8080;
pub const MAX_SIMULATIONS: usize = 1_000_000;
pub const MAX_HISTOGRAM_BINS: usize = 500;

const TIMEOUT_ENV: &str = "VIABILITY_SIMULATION_TIMEOUT_SECS";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(
    name = "viability",
    about = "Capital project viability: NPV, payback, IRR and Monte Carlo NPV risk"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API
    Serve {
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Deterministic NPV, simple payback and IRR for one cash-flow vector
    Analyze(AnalyzeArgs),
    /// Monte Carlo NPV distribution from triangular yearly scenarios
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(
        long,
        allow_hyphen_values = true,
        default_value_t = -100_000.0,
        help = "Initial investment at year 0, normally negative"
    )]
    investment: f64,
    #[arg(long, default_value_t = 10.0, help = "Annual discount rate in percent, e.g. 10")]
    rate: f64,
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_values_t = [40_000.0, 50_000.0, 50_000.0],
        help = "Comma-separated yearly cash flows, year 1 first"
    )]
    cash_flows: Vec<f64>,
    #[arg(
        long,
        allow_hyphen_values = true,
        default_value_t = 0.0,
        help = "Percent applied to every cash flow, e.g. -10"
    )]
    variation: f64,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(long, allow_hyphen_values = true, default_value_t = -100_000.0)]
    investment: f64,
    #[arg(long, default_value_t = 10.0, help = "Annual discount rate in percent, e.g. 10")]
    rate: f64,
    #[arg(
        long = "scenario",
        value_parser = parse_scenario,
        allow_hyphen_values = true,
        help = "Yearly pessimistic,most-likely,optimistic cash flow; repeat once per year"
    )]
    scenarios: Vec<Scenario>,
    #[arg(long, default_value_t = 10_000)]
    simulations: usize,
    #[arg(long, default_value_t = crate::core::DEFAULT_SEED)]
    seed: u64,
    #[arg(long, default_value_t = 50, help = "Histogram bins in the output")]
    bins: usize,
}

#[derive(Debug, Clone)]
struct AnalyzeInputs {
    rate: f64,
    initial_investment: f64,
    variation: f64,
    cash_flows: Vec<f64>,
}

#[derive(Debug, Clone)]
struct SimulateInputs {
    config: SimulationConfig,
    bins: usize,
}

/// A list given either as JSON array or as delimited text in a query string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ListField<T> {
    List(Vec<T>),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AnalyzePayload {
    initial_investment: Option<f64>,
    rate: Option<f64>,
    cash_flows: Option<ListField<f64>>,
    variation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    initial_investment: Option<f64>,
    rate: Option<f64>,
    scenarios: Option<ListField<[f64; 3]>>,
    simulations: Option<usize>,
    seed: Option<u64>,
    bins: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    rate: f64,
    initial_investment: f64,
    variation: f64,
    cash_flows: Vec<f64>,
    npv: f64,
    npv_display: String,
    payback: PaybackResult,
    payback_display: String,
    irr: Option<f64>,
    irr_display: Option<String>,
    irr_sign_changes: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    rate: f64,
    initial_investment: f64,
    seed: u64,
    summary: SimulationSummary,
    mean_display: String,
    p5_display: String,
    p95_display: String,
    probability_positive_display: String,
    histogram: Vec<HistogramBin>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub simulation_timeout: Duration,
    pub currency: CurrencyFormat,
}

impl ServerConfig {
    pub fn from_env(port: u16) -> Self {
        let simulation_timeout = match std::env::var(TIMEOUT_ENV) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(value = %raw, var = TIMEOUT_ENV, "ignoring invalid simulation timeout");
                    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
                }
            },
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Self {
            port,
            simulation_timeout,
            currency: CurrencyFormat::default(),
        }
    }
}

fn parse_scenario(raw: &str) -> Result<Scenario, String> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid scenario '{raw}': {e}"))?;
    match parts.as_slice() {
        [low, mode, high] => Ok(Scenario::from((*low, *mode, *high))),
        _ => Err(format!(
            "invalid scenario '{raw}': expected pessimistic,most-likely,optimistic"
        )),
    }
}

fn parse_scenario_list(raw: &str) -> Result<Vec<Scenario>, String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_scenario)
        .collect()
}

fn parse_cash_flows(raw: &str) -> Result<Vec<f64>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| format!("invalid cash flow '{s}': {e}"))
        })
        .collect()
}

fn default_scenarios() -> Vec<Scenario> {
    vec![Scenario::from((30_000.0, 40_000.0, 50_000.0)); 3]
}

fn default_analyze_args() -> AnalyzeArgs {
    AnalyzeArgs {
        investment: -100_000.0,
        rate: 10.0,
        cash_flows: vec![40_000.0, 50_000.0, 50_000.0],
        variation: 0.0,
    }
}

fn default_simulate_args() -> SimulateArgs {
    SimulateArgs {
        investment: -100_000.0,
        rate: 10.0,
        scenarios: default_scenarios(),
        simulations: 10_000,
        seed: crate::core::DEFAULT_SEED,
        bins: 50,
    }
}

fn build_analyze_inputs(args: AnalyzeArgs) -> Result<AnalyzeInputs, String> {
    if !args.investment.is_finite() {
        return Err("--investment must be a finite number".to_string());
    }
    if !args.rate.is_finite() || args.rate <= -100.0 {
        return Err("--rate must be > -100".to_string());
    }
    if !args.variation.is_finite() || args.variation <= -100.0 {
        return Err("--variation must be > -100".to_string());
    }
    if args.cash_flows.is_empty() {
        return Err("--cash-flows must contain at least one year".to_string());
    }
    if args.cash_flows.iter().any(|v| !v.is_finite()) {
        return Err("--cash-flows must contain only finite numbers".to_string());
    }

    Ok(AnalyzeInputs {
        rate: args.rate / 100.0,
        initial_investment: args.investment,
        variation: args.variation,
        cash_flows: apply_variation(&args.cash_flows, args.variation),
    })
}

fn build_simulate_inputs(args: SimulateArgs) -> Result<SimulateInputs, String> {
    if !args.investment.is_finite() {
        return Err("--investment must be a finite number".to_string());
    }
    if !args.rate.is_finite() || args.rate <= -100.0 {
        return Err("--rate must be > -100".to_string());
    }
    if args.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }
    if args.simulations > MAX_SIMULATIONS {
        return Err(format!("--simulations must be <= {MAX_SIMULATIONS}"));
    }
    if args.bins == 0 || args.bins > MAX_HISTOGRAM_BINS {
        return Err(format!("--bins must be between 1 and {MAX_HISTOGRAM_BINS}"));
    }

    let scenarios = if args.scenarios.is_empty() {
        default_scenarios()
    } else {
        args.scenarios
    };
    for (idx, scenario) in scenarios.iter().enumerate() {
        scenario.validate(idx + 1).map_err(|_| {
            format!(
                "--scenario for year {} must satisfy pessimistic <= most-likely <= optimistic",
                idx + 1
            )
        })?;
    }

    let config = SimulationConfig::new(
        args.rate / 100.0,
        args.investment,
        scenarios,
        args.simulations,
    )
    .with_seed(args.seed);
    Ok(SimulateInputs {
        config,
        bins: args.bins,
    })
}

fn analyze_args_from_payload(payload: AnalyzePayload) -> Result<AnalyzeArgs, String> {
    let mut args = default_analyze_args();
    if let Some(v) = payload.initial_investment {
        args.investment = v;
    }
    if let Some(v) = payload.rate {
        args.rate = v;
    }
    if let Some(v) = payload.variation {
        args.variation = v;
    }
    match payload.cash_flows {
        Some(ListField::List(v)) => args.cash_flows = v,
        Some(ListField::Text(raw)) => args.cash_flows = parse_cash_flows(&raw)?,
        None => {}
    }
    Ok(args)
}

fn simulate_args_from_payload(payload: SimulatePayload) -> Result<SimulateArgs, String> {
    let mut args = default_simulate_args();
    if let Some(v) = payload.initial_investment {
        args.investment = v;
    }
    if let Some(v) = payload.rate {
        args.rate = v;
    }
    if let Some(v) = payload.simulations {
        args.simulations = v;
    }
    if let Some(v) = payload.seed {
        args.seed = v;
    }
    if let Some(v) = payload.bins {
        args.bins = v;
    }
    match payload.scenarios {
        Some(ListField::List(v)) => {
            args.scenarios = v.into_iter().map(|[l, m, h]| Scenario::from((l, m, h))).collect();
            if args.scenarios.is_empty() {
                return Err("scenarios must contain at least one year".to_string());
            }
        }
        Some(ListField::Text(raw)) => {
            args.scenarios = parse_scenario_list(&raw)?;
            if args.scenarios.is_empty() {
                return Err("scenarios must contain at least one year".to_string());
            }
        }
        None => {}
    }
    Ok(args)
}

fn build_analyze_response(
    inputs: &AnalyzeInputs,
    currency: &CurrencyFormat,
) -> Result<AnalyzeResponse, EngineError> {
    let analysis = analyze_project(inputs.rate, inputs.initial_investment, &inputs.cash_flows)?;
    Ok(AnalyzeResponse {
        rate: inputs.rate,
        initial_investment: inputs.initial_investment,
        variation: inputs.variation,
        cash_flows: inputs.cash_flows.clone(),
        npv: analysis.npv,
        npv_display: currency.format(analysis.npv),
        payback: analysis.payback,
        payback_display: analysis.payback.to_string(),
        irr: analysis.irr,
        irr_display: analysis.irr.map(format_percent),
        irr_sign_changes: irr_sign_changes(inputs.initial_investment, &inputs.cash_flows),
    })
}

fn build_simulate_response(
    inputs: &SimulateInputs,
    outcomes: &[f64],
    currency: &CurrencyFormat,
) -> Result<SimulateResponse, EngineError> {
    let summary = summarize(outcomes)?;
    Ok(SimulateResponse {
        rate: inputs.config.rate,
        initial_investment: inputs.config.initial_investment,
        seed: inputs.config.seed,
        mean_display: currency.format(summary.mean),
        p5_display: currency.format(summary.p5),
        p95_display: currency.format(summary.p95),
        probability_positive_display: format_percent(summary.probability_positive),
        histogram: histogram(outcomes, inputs.bins),
        summary,
    })
}

/// Runs `analyze` for the command line and returns pretty JSON.
pub fn run_analyze(args: AnalyzeArgs) -> Result<String, String> {
    let inputs = build_analyze_inputs(args)?;
    let response =
        build_analyze_response(&inputs, &CurrencyFormat::default()).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&response).map_err(|e| e.to_string())
}

/// Runs `simulate` for the command line and returns pretty JSON.
pub fn run_simulate(args: SimulateArgs) -> Result<String, String> {
    let inputs = build_simulate_inputs(args)?;
    let outcomes = run_simulation(&inputs.config, &CancelToken::new()).map_err(|e| e.to_string())?;
    let response = build_simulate_response(&inputs, &outcomes, &CurrencyFormat::default())
        .map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&response).map_err(|e| e.to_string())
}

pub async fn run_http_server(config: ServerConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let timeout_secs = config.simulation_timeout.as_secs();
    let app = Router::new()
        .route(
            "/api/analyze",
            get(analyze_get_handler).post(analyze_post_handler),
        )
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(config);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, timeout_secs, "viability HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn analyze_get_handler(
    State(config): State<ServerConfig>,
    Query(payload): Query<AnalyzePayload>,
) -> Response {
    analyze_handler_impl(&config, payload)
}

async fn analyze_post_handler(
    State(config): State<ServerConfig>,
    Json(payload): Json<AnalyzePayload>,
) -> Response {
    analyze_handler_impl(&config, payload)
}

fn analyze_handler_impl(config: &ServerConfig, payload: AnalyzePayload) -> Response {
    let inputs = match analyze_args_from_payload(payload).and_then(build_analyze_inputs) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match build_analyze_response(&inputs, &config.currency) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => engine_error_response(&err),
    }
}

async fn simulate_get_handler(
    State(config): State<ServerConfig>,
    Query(payload): Query<SimulatePayload>,
) -> Response {
    simulate_handler_impl(config, payload).await
}

async fn simulate_post_handler(
    State(config): State<ServerConfig>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    simulate_handler_impl(config, payload).await
}

/// Cancels the wrapped token when the request future is dropped, so an
/// abandoned request stops its blocking simulation.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn simulate_handler_impl(config: ServerConfig, payload: SimulatePayload) -> Response {
    let inputs = match simulate_args_from_payload(payload).and_then(build_simulate_inputs) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let cancel = CancelToken::with_timeout(config.simulation_timeout);
    let guard = CancelOnDrop(cancel.clone());
    let sim_config = inputs.config.clone();
    let joined =
        tokio::task::spawn_blocking(move || run_simulation(&sim_config, &cancel)).await;
    drop(guard);

    let outcomes = match joined {
        Ok(Ok(outcomes)) => outcomes,
        Ok(Err(err)) => return engine_error_response(&err),
        Err(err) => {
            warn!(error = %err, "simulation task failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "simulation task failed");
        }
    };

    match build_simulate_response(&inputs, &outcomes, &config.currency) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => engine_error_response(&err),
    }
}

fn engine_error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Cancelled | EngineError::DeadlineExceeded => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn engine_error_response(err: &EngineError) -> Response {
    error_response(engine_error_status(err), &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
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
fn simulate_args_from_json(json: &str) -> Result<SimulateArgs, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    simulate_args_from_payload(payload)
}

#[cfg(test)]
fn analyze_args_from_json(json: &str) -> Result<AnalyzeArgs, String> {
    let payload = serde_json::from_str::<AnalyzePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    analyze_args_from_payload(payload)
}
