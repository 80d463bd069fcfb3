use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::normalize::{
    AccountRecord, DEFAULT_CURRENT_AGE, DEFAULT_ITERATIONS, DEFAULT_JURISDICTION,
    DEFAULT_LIFE_EXPECTANCY, DEFAULT_PENSION_START_AGE, DEFAULT_SEED, MAX_ITERATIONS,
    DEFAULT_SOCIAL_SECURITY_CLAIM_AGE, LtcRecord, PolicyRecord, SpouseRecord,
};
use crate::core::{
    CashflowYearResult, FinancialRecord, GoalSolveConfig, GoalSolveResult, GoalType, Progress,
    SimulationError, SimulationParameters, SimulationResult, normalize,
    run_simulation_with_progress, run_yearly_cashflow_trace, solve_goal,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFilingStatus {
    Single,
    MarriedJoint,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliLtcStrategy {
    Disabled,
    PerYearWalk,
    SingleEvent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliGender {
    Female,
    Male,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliHealth {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliGoalType {
    MaxExpense,
    RequiredSavings,
}

impl From<CliGoalType> for GoalType {
    fn from(value: CliGoalType) -> Self {
        match value {
            CliGoalType::MaxExpense => GoalType::MaxExpense,
            CliGoalType::RequiredSavings => GoalType::RequiredSavings,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Monte Carlo retirement estimator (US taxes, RMDs, long-term care risk)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one simulation and print the result as JSON
    Run(RunArgs),
    /// Search for the largest sustainable expense or the savings needed to hit a success target
    Solve(SolveArgs),
    /// Serve the JSON API
    Serve {
        #[arg(default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
struct HouseholdArgs {
    #[arg(long, default_value_t = DEFAULT_CURRENT_AGE)]
    age: u32,
    #[arg(long, help = "Defaults to 65, or the current age if already past it")]
    retirement_age: Option<u32>,
    #[arg(long, default_value_t = DEFAULT_LIFE_EXPECTANCY)]
    life_expectancy: u32,
    #[arg(long, default_value_t = 0.0)]
    taxable: f64,
    #[arg(long, default_value_t = 0.0, help = "401(k) and traditional IRA balances")]
    tax_deferred: f64,
    #[arg(long, default_value_t = 0.0, help = "Roth balances")]
    tax_free: f64,
    #[arg(long, default_value_t = 0.0)]
    hsa: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Annual savings, split 35% employer plan, 35% IRA, 30% brokerage"
    )]
    annual_savings: f64,
    #[arg(long, default_value_t = 0.0)]
    household_income: f64,
    #[arg(long, help = "Annual retirement expense in today's dollars")]
    annual_expense: Option<f64>,
    #[arg(long, default_value_t = 0.0)]
    social_security: f64,
    #[arg(long, default_value_t = DEFAULT_SOCIAL_SECURITY_CLAIM_AGE)]
    social_security_claim_age: u32,
    #[arg(long, default_value_t = 0.0, help = "Nominal annual pension, not inflation-adjusted")]
    pension: f64,
    #[arg(long, default_value_t = DEFAULT_PENSION_START_AGE)]
    pension_start_age: u32,
    #[arg(long, default_value_t = 0.0)]
    part_time_income: f64,
    #[arg(long)]
    spouse_age: Option<u32>,
    #[arg(long)]
    spouse_life_expectancy: Option<u32>,
    #[arg(long, default_value_t = 0.0)]
    spouse_social_security: f64,
    #[arg(long, value_enum, default_value_t = CliFilingStatus::Single)]
    filing_status: CliFilingStatus,
    #[arg(long, default_value_t = DEFAULT_JURISDICTION.to_string(), help = "Two-letter state code")]
    state: String,
    #[arg(long, default_value_t = 7.0, help = "Expected nominal annual return in percent")]
    expected_return: f64,
    #[arg(long, default_value_t = 12.0, help = "Annual return volatility in percent")]
    volatility: f64,
    #[arg(long, default_value_t = 2.5, help = "Expected annual inflation in percent")]
    inflation: f64,
    #[arg(long, default_value_t = 1.0, help = "Annual inflation volatility in percent")]
    inflation_volatility: f64,
    #[arg(long, help = "Shift the return to a safer mix as retirement approaches")]
    glide_path: bool,
    #[arg(long, value_enum, default_value_t = CliLtcStrategy::PerYearWalk)]
    ltc_strategy: CliLtcStrategy,
    #[arg(long, value_enum, default_value_t = CliGender::Female)]
    gender: CliGender,
    #[arg(long, value_enum, default_value_t = CliHealth::Good)]
    health: CliHealth,
    #[arg(long, help = "Force the lifetime chance of needing care, in percent")]
    ltc_probability: Option<f64>,
    #[arg(long)]
    private_room: bool,
    #[arg(long, help = "Daily benefit of an LTC policy; omit for no policy")]
    ltc_daily_benefit: Option<f64>,
    #[arg(long, default_value_t = 90)]
    ltc_elimination_days: u32,
    #[arg(long, default_value_t = 3.0)]
    ltc_benefit_years: f64,
    #[arg(long, default_value_t = 0.0)]
    ltc_annual_premium: f64,
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: u32,
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    #[arg(long, help = "Run iterations on one thread")]
    serial: bool,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    household: HouseholdArgs,
    #[arg(long, help = "Include every iteration's year-by-year ledger")]
    keep_ledgers: bool,
    #[arg(long, help = "Include per-age medians of cash flows")]
    trace: bool,
}

#[derive(Args, Debug, Clone)]
struct SolveArgs {
    #[command(flatten)]
    household: HouseholdArgs,
    #[arg(long, value_enum, default_value_t = CliGoalType::MaxExpense)]
    goal: CliGoalType,
    #[arg(long, default_value_t = 90.0, help = "Target success probability in percent")]
    target_success: f64,
    #[arg(long, default_value_t = 0.0)]
    search_min: f64,
    #[arg(long, default_value_t = 500_000.0)]
    search_max: f64,
    #[arg(long, default_value_t = 100.0, help = "Stop once the bracket is this narrow, in dollars")]
    tolerance: f64,
    #[arg(long, default_value_t = 24)]
    max_iterations: u32,
    #[arg(long, default_value_t = 500)]
    simulations_per_iteration: u32,
    #[arg(long, default_value_t = 2_000)]
    final_simulations: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulateOptions {
    trace: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GoalPayload {
    goal_type: Option<GoalType>,
    target_success: Option<f64>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    simulations_per_iteration: Option<u32>,
    final_simulations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolveRequest {
    household: FinancialRecord,
    goal: GoalPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    result: SimulationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    cashflow_years: Option<Vec<CashflowYearResult>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

fn number(value: f64) -> Option<Value> {
    Some(Value::from(value))
}

// Percent-valued flags travel as "7%" so the normalizer never guesses the unit.
fn percent(value: f64) -> Option<Value> {
    Some(Value::String(format!("{value}%")))
}

fn enum_name<T: ValueEnum>(value: T) -> Option<String> {
    value.to_possible_value().map(|v| v.get_name().to_string())
}

fn account(kind: &str, balance: f64) -> AccountRecord {
    AccountRecord {
        account_type: Some(kind.to_string()),
        balance: number(balance),
    }
}

fn household_record(args: &HouseholdArgs) -> FinancialRecord {
    let spouse = args.spouse_age.map(|age| SpouseRecord {
        age: number(age as f64),
        life_expectancy: args.spouse_life_expectancy.and_then(|v| number(v as f64)),
        social_security: number(args.spouse_social_security),
        ..SpouseRecord::default()
    });
    let policy = args.ltc_daily_benefit.map(|daily| PolicyRecord {
        daily_benefit: number(daily),
        elimination_days: number(args.ltc_elimination_days as f64),
        benefit_period_years: number(args.ltc_benefit_years),
        annual_premium: number(args.ltc_annual_premium),
        ..PolicyRecord::default()
    });

    FinancialRecord {
        age: number(args.age as f64),
        retirement_age: args.retirement_age.and_then(|v| number(v as f64)),
        life_expectancy: number(args.life_expectancy as f64),
        annual_expense: args.annual_expense.and_then(number),
        filing_status: enum_name(args.filing_status),
        state: Some(args.state.clone()),
        accounts: vec![
            account("brokerage", args.taxable),
            account("401k", args.tax_deferred),
            account("roth ira", args.tax_free),
            account("hsa", args.hsa),
        ],
        social_security: number(args.social_security),
        social_security_claim_age: number(args.social_security_claim_age as f64),
        pension: number(args.pension),
        pension_start_age: number(args.pension_start_age as f64),
        part_time_income: number(args.part_time_income),
        annual_savings: number(args.annual_savings),
        household_income: number(args.household_income),
        return_mode: Some(if args.glide_path { "glide-path" } else { "fixed" }.to_string()),
        expected_return: percent(args.expected_return),
        volatility: percent(args.volatility),
        inflation: percent(args.inflation),
        inflation_volatility: percent(args.inflation_volatility),
        spouse,
        ltc: Some(LtcRecord {
            strategy: enum_name(args.ltc_strategy),
            gender: enum_name(args.gender),
            health: enum_name(args.health),
            lifetime_probability: args.ltc_probability.and_then(percent),
            private_room: Some(args.private_room),
            policy,
        }),
        iterations: number(args.iterations as f64),
        seed: Some(Value::from(args.seed)),
        parallel: Some(!args.serial),
        ..FinancialRecord::default()
    }
}

fn build_params(args: &HouseholdArgs) -> Result<SimulationParameters, String> {
    if let Some(p) = args.ltc_probability {
        if !(0.0..=100.0).contains(&p) {
            return Err("--ltc-probability must be between 0 and 100".to_string());
        }
    }
    if args.volatility < 0.0 || args.inflation_volatility < 0.0 {
        return Err("--volatility and --inflation-volatility must be >= 0".to_string());
    }
    if args.iterations == 0 || args.iterations > MAX_ITERATIONS {
        return Err(format!("--iterations must be between 1 and {MAX_ITERATIONS}"));
    }
    if args.ltc_daily_benefit.is_some_and(|d| d <= 0.0) {
        return Err("--ltc-daily-benefit must be > 0".to_string());
    }

    normalize(&household_record(args)).map_err(|e| e.to_string())
}

fn goal_config(args: &SolveArgs) -> Result<GoalSolveConfig, String> {
    if !(0.0..=100.0).contains(&args.target_success) {
        return Err("--target-success must be between 0 and 100".to_string());
    }
    Ok(GoalSolveConfig {
        goal_type: args.goal.into(),
        target_success_threshold: args.target_success / 100.0,
        search_min: args.search_min,
        search_max: args.search_max,
        tolerance: args.tolerance,
        max_iterations: args.max_iterations,
        simulations_per_iteration: args.simulations_per_iteration,
        final_simulations: args.final_simulations,
    })
}

fn goal_config_from_payload(goal: &GoalPayload) -> GoalSolveConfig {
    GoalSolveConfig {
        goal_type: goal.goal_type.unwrap_or(GoalType::MaxExpense),
        target_success_threshold: goal.target_success.unwrap_or(0.9),
        search_min: goal.search_min.unwrap_or(0.0),
        search_max: goal.search_max.unwrap_or(500_000.0),
        tolerance: goal.tolerance.unwrap_or(100.0),
        max_iterations: goal.max_iterations.unwrap_or(24),
        simulations_per_iteration: goal.simulations_per_iteration.unwrap_or(500),
        final_simulations: goal.final_simulations.unwrap_or(2_000),
    }
}

fn simulate(
    params: &SimulationParameters,
    with_trace: bool,
    progress: Option<Progress<'_>>,
) -> Result<SimulateResponse, SimulationError> {
    let result = run_simulation_with_progress(params, progress)?;
    let cashflow_years = if with_trace {
        Some(run_yearly_cashflow_trace(params)?)
    } else {
        None
    };
    Ok(SimulateResponse {
        result,
        cashflow_years,
    })
}

fn to_json<T: Serialize>(body: &T) -> Result<String, String> {
    serde_json::to_string_pretty(body).map_err(|e| format!("failed to encode JSON: {e}"))
}

pub async fn run_cli() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            let mut params = build_params(&args.household)?;
            params.keep_ledgers = args.keep_ledgers;
            let report = |done: u32, total: u32| {
                if done % (total / 10).max(1) == 0 || done == total {
                    log::info!("{done}/{total} iterations");
                }
            };
            let response = simulate(&params, args.trace, Some(&report)).map_err(|e| e.to_string())?;
            println!("{}", to_json(&response)?);
        }
        Command::Solve(args) => {
            let params = build_params(&args.household)?;
            let config = goal_config(&args)?;
            let result = solve_goal(&params, config).map_err(|e| e.to_string())?;
            println!("{}", to_json(&result)?);
        }
        Command::Serve { port } => {
            run_http_server(port)
                .await
                .map_err(|e| format!("server error: {e}"))?;
        }
    }
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    println!("nestegg HTTP API listening on http://{addr}");
    log::info!("serving on {addr}");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/solve", post(solve_handler))
        .fallback(not_found_handler)
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(
    Query(options): Query<SimulateOptions>,
    Json(record): Json<FinancialRecord>,
) -> Response {
    let params = match normalize(&record) {
        Ok(params) => params,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let with_trace = options.trace.unwrap_or(true);

    // Simulation is CPU-bound; keep it off the async workers.
    let outcome =
        tokio::task::spawn_blocking(move || simulate(&params, with_trace, None)).await;
    match outcome {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => {
            log::error!("simulation task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "simulation failed")
        }
    }
}

async fn solve_handler(Json(request): Json<SolveRequest>) -> Response {
    let params = match normalize(&request.household) {
        Ok(params) => params,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let config = goal_config_from_payload(&request.goal);

    let outcome: Result<Result<GoalSolveResult, SimulationError>, _> =
        tokio::task::spawn_blocking(move || solve_goal(&params, config)).await;
    match outcome {
        Ok(Ok(result)) => json_response(StatusCode::OK, result),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => {
            log::error!("solver task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "solver failed")
        }
    }
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
mod tests {
    use super::*;
    use crate::core::types::{FilingStatus, LtcStrategy, ReturnMode};
    use clap::CommandFactory;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn household(extra: &[&str]) -> HouseholdArgs {
        let mut argv = vec!["nestegg", "run"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).expect("valid flags").command {
            Command::Run(args) => args.household,
            other => panic!("expected run, got {other:?}"),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_params_converts_percent_flags() {
        let args = household(&[
            "--age",
            "45",
            "--expected-return",
            "6",
            "--volatility",
            "0.5",
            "--inflation",
            "3",
            "--tax-deferred",
            "300000",
            "--tax-free",
            "100000",
            "--taxable",
            "100000",
        ]);
        let params = build_params(&args).expect("valid params");

        assert_eq!(params.subject.current_age, 45);
        assert_eq!(params.subject.retirement_age, 65);
        assert_approx(params.market.expected_return, 0.06);
        // 0.5 would read as a fraction without the percent marker.
        assert_approx(params.market.volatility, 0.005);
        assert_approx(params.market.inflation_mean, 0.03);
        assert_approx(params.balances.tax_deferred, 300_000.0);
        assert_approx(params.balances.tax_free, 100_000.0);
        assert_approx(params.balances.taxable, 100_000.0);
        assert_eq!(params.market.mode, ReturnMode::Fixed);
        assert!(params.parallel);
    }

    #[test]
    fn build_params_maps_enums_spouse_and_policy() {
        let args = household(&[
            "--filing-status",
            "married-joint",
            "--spouse-age",
            "60",
            "--ltc-strategy",
            "single-event",
            "--ltc-daily-benefit",
            "200",
            "--ltc-probability",
            "100",
            "--glide-path",
            "--serial",
        ]);
        let params = build_params(&args).expect("valid params");

        assert_eq!(params.filing_status, FilingStatus::MarriedJoint);
        assert_eq!(params.spouse.as_ref().map(|s| s.current_age), Some(60));
        assert_eq!(params.ltc.strategy, LtcStrategy::SingleEvent);
        assert_eq!(params.ltc.lifetime_probability_override, Some(1.0));
        let policy = params.ltc.policy.expect("policy present");
        assert_approx(policy.daily_benefit, 200.0);
        assert_eq!(policy.elimination_days, 90);
        assert_eq!(params.market.mode, ReturnMode::GlidePath);
        assert!(!params.parallel);
    }

    #[test]
    fn build_params_rejects_out_of_range_flags() {
        let err = build_params(&household(&["--ltc-probability", "150"])).expect_err("rejects");
        assert!(err.contains("--ltc-probability"));

        let err = build_params(&household(&["--iterations", "0"])).expect_err("rejects");
        assert!(err.contains("--iterations"));
        let err = build_params(&household(&["--iterations", "5000000"])).expect_err("rejects");
        assert!(err.contains("--iterations"));

        let err =
            build_params(&household(&["--age", "70", "--retirement-age", "60"])).expect_err("rejects");
        assert!(err.contains("retirementAge"));
    }

    #[test]
    fn solve_args_convert_target_percent() {
        let cli = Cli::try_parse_from([
            "nestegg",
            "solve",
            "--goal",
            "required-savings",
            "--target-success",
            "85",
        ])
        .expect("valid flags");
        let Command::Solve(args) = cli.command else {
            panic!("expected solve");
        };
        let config = goal_config(&args).expect("valid config");
        assert_eq!(config.goal_type, GoalType::RequiredSavings);
        assert_approx(config.target_success_threshold, 0.85);
    }

    #[test]
    fn solve_request_fills_goal_defaults() {
        let json = r#"{
          "household": { "age": 50, "annualExpense": "$60,000" },
          "goal": { "goalType": "required-savings", "targetSuccess": 0.8 }
        }"#;
        let request: SolveRequest = serde_json::from_str(json).expect("json should parse");
        let config = goal_config_from_payload(&request.goal);
        assert_eq!(config.goal_type, GoalType::RequiredSavings);
        assert_approx(config.target_success_threshold, 0.8);
        assert_eq!(config.max_iterations, 24);

        let params = normalize(&request.household).expect("valid household");
        assert_eq!(params.subject.current_age, 50);
        assert_approx(params.annual_expense, 60_000.0);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = health_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn simulate_returns_result_and_trace() {
        let record: FinancialRecord = serde_json::from_str(
            r#"{
              "age": 60, "retirementAge": 62, "lifeExpectancy": 66,
              "annualExpense": 20000,
              "accounts": [{ "type": "brokerage", "balance": 200000 }],
              "iterations": 8, "ltc": { "strategy": "disabled" }
            }"#,
        )
        .expect("json should parse");
        let response = simulate_handler(Query(SimulateOptions::default()), Json(record)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["result"]["iterationsRequested"], 8);
        assert!(body["result"]["successProbability"].is_number());
        assert!(body["result"]["endingBalancePercentiles"]["p90"].is_number());
        assert_eq!(body["cashflowYears"].as_array().map(Vec::len), Some(6));
    }

    #[tokio::test]
    async fn simulate_rejects_impossible_ages() {
        let record: FinancialRecord =
            serde_json::from_str(r#"{ "age": 70, "retirementAge": 60 }"#).expect("parses");
        let response = simulate_handler(Query(SimulateOptions::default()), Json(record)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().is_some_and(|e| e.contains("retirementAge")));
    }

    #[tokio::test]
    async fn simulate_rejects_runaway_iteration_counts() {
        let record: FinancialRecord =
            serde_json::from_str(r#"{ "iterations": 4000000000000 }"#).expect("parses");
        let response = simulate_handler(Query(SimulateOptions::default()), Json(record)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().is_some_and(|e| e.contains("iterations")));
    }

    #[tokio::test]
    async fn solve_rejects_inverted_bounds() {
        let request: SolveRequest = serde_json::from_str(
            r#"{ "household": { "age": 60 }, "goal": { "searchMin": 10, "searchMax": 5 } }"#,
        )
        .expect("parses");
        let response = solve_handler(Json(request)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404() {
        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not found");
    }
}
