use serde::{Deserialize, Serialize};

use super::engine::run_simulation;
use super::error::{Result, SimulationError};
use super::normalize::{MAX_ITERATIONS, validate};
use super::stats::binomial_ci_half_width;
use super::types::{SavingsPlan, SimulationParameters};

/// Slack on the success comparison so a rate that equals the target counts as meeting it.
const RATE_EPSILON: f64 = 1e-12;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalType {
    MaxExpense,
    RequiredSavings,
}

#[derive(Debug, Clone, Copy)]
pub struct GoalSolveConfig {
    pub goal_type: GoalType,
    pub target_success_threshold: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub simulations_per_iteration: u32,
    pub final_simulations: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub success_rate: f64,
    pub success_ci_half_width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsAllocation {
    pub employer_plan: f64,
    pub traditional_ira: f64,
    pub roth_ira: f64,
    pub brokerage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub target_success_threshold: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub simulations_per_iteration: u32,
    pub final_simulations: u32,
    pub solved_value: Option<f64>,
    pub solved_savings: Option<SavingsAllocation>,
    pub achieved_success_rate: Option<f64>,
    pub achieved_success_ci_half_width: Option<f64>,
    pub iterations: Vec<GoalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct SavingsMix {
    employer_plan: f64,
    traditional_ira: f64,
    roth_ira: f64,
    brokerage: f64,
    total: f64,
}

impl SavingsMix {
    fn from_plan(plan: &SavingsPlan) -> Self {
        let employer_plan = plan.employer_plan.max(0.0);
        let traditional_ira = plan.traditional_ira.max(0.0);
        let roth_ira = plan.roth_ira.max(0.0);
        let brokerage = plan.brokerage.max(0.0);
        Self {
            employer_plan,
            traditional_ira,
            roth_ira,
            brokerage,
            total: employer_plan + traditional_ira + roth_ira + brokerage,
        }
    }

    fn allocation_for_total(self, total: f64) -> SavingsAllocation {
        let total = total.max(0.0);
        if self.total <= 1e-12 {
            // No existing mix: brokerage has no annual limit to overflow.
            return SavingsAllocation {
                employer_plan: 0.0,
                traditional_ira: 0.0,
                roth_ira: 0.0,
                brokerage: total,
            };
        }

        let scale = total / self.total;
        SavingsAllocation {
            employer_plan: self.employer_plan * scale,
            traditional_ira: self.traditional_ira * scale,
            roth_ira: self.roth_ira * scale,
            brokerage: self.brokerage * scale,
        }
    }
}

/// Bisects on a goal value using the monotonicity of success in expense and savings.
pub fn solve_goal(params: &SimulationParameters, config: GoalSolveConfig) -> Result<GoalSolveResult> {
    validate(params)?;
    validate_config(params, config)?;

    let mix = SavingsMix::from_plan(&params.savings);

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval = evaluate_candidate(params, config, config.search_min, mix)?;
    let high_eval = evaluate_candidate(params, config, config.search_max, mix)?;
    let target = config.target_success_threshold;

    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    // Success rises with savings and falls with expense; `meets_moves_high`
    // says which bound a passing candidate replaces.
    let meets_moves_high = match config.goal_type {
        GoalType::RequiredSavings => true,
        GoalType::MaxExpense => false,
    };
    let low_meets = low_eval.success_rate + RATE_EPSILON >= target;
    let high_meets = high_eval.success_rate + RATE_EPSILON >= target;

    match config.goal_type {
        GoalType::RequiredSavings if low_meets => {
            solved_value = Some(config.search_min);
            converged = true;
            feasible = true;
            message = "Already meets target at the lower savings bound.".to_string();
        }
        GoalType::RequiredSavings if !high_meets => {
            feasible = false;
            message = "No feasible savings level found within the search bounds.".to_string();
        }
        GoalType::MaxExpense if !low_meets => {
            feasible = false;
            message = "No feasible expense found within the search bounds.".to_string();
        }
        GoalType::MaxExpense if high_meets => {
            solved_value = Some(config.search_max);
            converged = true;
            feasible = true;
            message =
                "Upper expense bound is still feasible; raise search max to look higher.".to_string();
        }
        _ => {
            let mut lo = config.search_min;
            let mut hi = config.search_max;
            let mut it = 0;
            while it < config.max_iterations {
                it += 1;
                let mid = (lo + hi) * 0.5;
                let eval = evaluate_candidate(params, config, mid, mix)?;
                iterations.push(GoalSolveIteration {
                    iteration: it,
                    lower_bound: lo,
                    upper_bound: hi,
                    candidate_value: mid,
                    success_rate: eval.success_rate,
                    success_ci_half_width: eval.success_ci_half_width,
                });

                let meets = eval.success_rate + RATE_EPSILON >= target;
                if meets == meets_moves_high {
                    hi = mid;
                } else {
                    lo = mid;
                }

                if (hi - lo).abs() <= config.tolerance {
                    converged = true;
                    break;
                }
            }
            // The passing side of the bracket is the answer either way.
            solved_value = Some(if meets_moves_high { hi } else { lo });
            feasible = true;
            message = match (converged, config.goal_type) {
                (true, GoalType::RequiredSavings) => "Solved required annual savings.".to_string(),
                (true, GoalType::MaxExpense) => "Solved maximum sustainable expense.".to_string(),
                (false, _) => {
                    "Reached max iterations before tolerance was met; returning best estimate."
                        .to_string()
                }
            };
        }
    }

    let mut achieved_success_rate = None;
    let mut achieved_success_ci_half_width = None;
    let mut solved_savings = None;
    if let Some(value) = solved_value {
        let final_eval = evaluate_candidate(
            params,
            GoalSolveConfig {
                simulations_per_iteration: config.final_simulations,
                ..config
            },
            value,
            mix,
        )?;
        achieved_success_rate = Some(final_eval.success_rate);
        achieved_success_ci_half_width = Some(final_eval.success_ci_half_width);
        if config.goal_type == GoalType::RequiredSavings {
            solved_savings = Some(mix.allocation_for_total(value));
        }
    }

    log::info!(
        "goal solve {:?}: value={:?} feasible={} converged={} after {} steps",
        config.goal_type,
        solved_value,
        feasible,
        converged,
        iterations.len()
    );

    Ok(GoalSolveResult {
        goal_type: config.goal_type,
        target_success_threshold: config.target_success_threshold,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        simulations_per_iteration: config.simulations_per_iteration,
        final_simulations: config.final_simulations,
        solved_value,
        solved_savings,
        achieved_success_rate,
        achieved_success_ci_half_width,
        iterations,
        converged,
        feasible,
        message,
    })
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    success_rate: f64,
    success_ci_half_width: f64,
}

fn evaluate_candidate(
    base: &SimulationParameters,
    config: GoalSolveConfig,
    candidate_value: f64,
    mix: SavingsMix,
) -> Result<CandidateEval> {
    let mut params = base.clone();
    params.iterations = config.simulations_per_iteration.max(1);
    params.keep_ledgers = false;

    match config.goal_type {
        GoalType::RequiredSavings => {
            let allocation = mix.allocation_for_total(candidate_value);
            params.savings.employer_plan = allocation.employer_plan;
            params.savings.traditional_ira = allocation.traditional_ira;
            params.savings.roth_ira = allocation.roth_ira;
            params.savings.brokerage = allocation.brokerage;
        }
        GoalType::MaxExpense => {
            params.annual_expense = candidate_value.max(0.0);
        }
    }

    let result = run_simulation(&params)?;
    log::debug!(
        "goal candidate {candidate_value:.2}: success {:.4}",
        result.success_probability
    );
    Ok(CandidateEval {
        success_rate: result.success_probability,
        success_ci_half_width: binomial_ci_half_width(
            result.success_probability,
            result.iterations_completed,
        ),
    })
}

fn validate_config(params: &SimulationParameters, config: GoalSolveConfig) -> Result<()> {
    let fail = |msg: &str| Err(SimulationError::Solver(msg.to_string()));

    if config.goal_type == GoalType::RequiredSavings
        && params.subject.retirement_age <= params.subject.current_age
    {
        return fail("required savings needs at least one working year before retirement");
    }
    if !(0.0..=1.0).contains(&config.target_success_threshold) {
        return fail("target_success_threshold must be between 0 and 1");
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return fail("search bounds must be finite");
    }
    if config.search_min < 0.0 {
        return fail("search_min must be >= 0");
    }
    if config.search_max <= config.search_min {
        return fail("search_max must be greater than search_min");
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return fail("tolerance must be > 0");
    }
    if config.max_iterations == 0 {
        return fail("max_iterations must be > 0");
    }
    if config.simulations_per_iteration == 0 {
        return fail("simulations_per_iteration must be > 0");
    }
    if config.final_simulations == 0 {
        return fail("final_simulations must be > 0");
    }
    if config.simulations_per_iteration.max(config.final_simulations) > MAX_ITERATIONS {
        return Err(SimulationError::Solver(format!(
            "simulations per candidate must be at most {MAX_ITERATIONS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        BucketAmounts, FilingStatus, Gender, HealthStatus, IncomeStreams, LtcInputs, LtcStrategy,
        MarketAssumptions, Person, ReturnMode,
    };

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    // Zero real return, no volatility, taxable only: brokerage sales net 92.5%.
    fn deterministic_params() -> SimulationParameters {
        SimulationParameters {
            subject: Person {
                current_age: 65,
                retirement_age: 65,
                life_expectancy: 90,
                income: IncomeStreams {
                    social_security_annual: 0.0,
                    social_security_claim_age: 67,
                    pension_annual: 0.0,
                    pension_start_age: 65,
                    part_time_annual: 0.0,
                    annuities: Vec::new(),
                },
            },
            spouse: None,
            filing_status: FilingStatus::Single,
            jurisdiction: "US".to_string(),
            balances: BucketAmounts {
                taxable: 1_000_000.0,
                ..BucketAmounts::default()
            },
            savings: SavingsPlan {
                employer_plan: 0.0,
                traditional_ira: 0.0,
                roth_ira: 0.0,
                brokerage: 0.0,
                household_income: 0.0,
                working_expense: 0.0,
                earners: 1,
            },
            annual_expense: 10_000.0,
            market: MarketAssumptions {
                mode: ReturnMode::Fixed,
                expected_return: 0.025,
                volatility: 0.0,
                inflation_mean: 0.025,
                inflation_volatility: 0.0,
            },
            ltc: LtcInputs {
                strategy: LtcStrategy::Disabled,
                gender: Gender::Female,
                health: HealthStatus::Good,
                policy: None,
                lifetime_probability_override: None,
                prefer_private_room: false,
            },
            iterations: 1,
            seed: 7,
            keep_ledgers: false,
            parallel: false,
        }
    }

    fn config(goal_type: GoalType, search_max: f64) -> GoalSolveConfig {
        GoalSolveConfig {
            goal_type,
            target_success_threshold: 1.0,
            search_min: 0.0,
            search_max,
            tolerance: 5.0,
            max_iterations: 32,
            simulations_per_iteration: 1,
            final_simulations: 1,
        }
    }

    #[test]
    fn max_expense_solver_finds_deterministic_solution() {
        // 25 years of 40,000 gross sales, each netting 37,000.
        let params = deterministic_params();
        let config = config(GoalType::MaxExpense, 100_000.0);

        let result = solve_goal(&params, config).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(
            result.solved_value.expect("value expected"),
            37_000.0,
            config.tolerance + 1.0,
        );
        assert_close(result.achieved_success_rate.expect("rate expected"), 1.0, 1e-9);
        assert!(result.solved_savings.is_none());
    }

    #[test]
    fn required_savings_solver_finds_deterministic_solution() {
        // One working year, then one retired year needing 18,500 net.
        let mut params = deterministic_params();
        params.subject.current_age = 64;
        params.subject.life_expectancy = 66;
        params.balances = BucketAmounts::default();
        params.annual_expense = 18_500.0;
        let config = config(GoalType::RequiredSavings, 100_000.0);

        let result = solve_goal(&params, config).expect("must solve");
        assert!(result.feasible);
        let value = result.solved_value.expect("value expected");
        assert_close(value, 20_000.0, config.tolerance + 2.0);
        let savings = result.solved_savings.expect("allocation expected");
        assert_close(savings.brokerage, value, 1e-9);
        assert_eq!(savings.roth_ira, 0.0);
    }

    #[test]
    fn required_savings_solver_reports_infeasible_when_bounds_too_low() {
        let mut params = deterministic_params();
        params.subject.current_age = 64;
        params.subject.life_expectancy = 66;
        params.balances = BucketAmounts::default();
        params.annual_expense = 18_500.0;
        let config = config(GoalType::RequiredSavings, 5_000.0);

        let result = solve_goal(&params, config).expect("must return result");
        assert!(!result.feasible);
        assert!(result.solved_value.is_none());
        assert!(result.achieved_success_rate.is_none());
    }

    #[test]
    fn max_expense_reports_upper_bound_when_still_feasible() {
        let params = deterministic_params();
        let result = solve_goal(&params, config(GoalType::MaxExpense, 20_000.0)).expect("solves");
        assert!(result.feasible);
        assert_eq!(result.solved_value, Some(20_000.0));
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn savings_mix_keeps_proportions() {
        let mix = SavingsMix::from_plan(&SavingsPlan {
            employer_plan: 10_000.0,
            traditional_ira: 0.0,
            roth_ira: 5_000.0,
            brokerage: 5_000.0,
            household_income: 0.0,
            working_expense: 0.0,
            earners: 1,
        });
        let allocation = mix.allocation_for_total(40_000.0);
        assert_close(allocation.employer_plan, 20_000.0, 1e-9);
        assert_close(allocation.roth_ira, 10_000.0, 1e-9);
        assert_close(allocation.brokerage, 10_000.0, 1e-9);
        assert_eq!(allocation.traditional_ira, 0.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let params = deterministic_params();
        let mut bad = config(GoalType::MaxExpense, 100.0);
        bad.search_max = 0.0;
        assert!(matches!(solve_goal(&params, bad), Err(SimulationError::Solver(_))));

        // Already retired: nothing to save toward.
        let err = solve_goal(&params, config(GoalType::RequiredSavings, 100.0));
        assert!(matches!(err, Err(SimulationError::Solver(_))));

        let mut bad = config(GoalType::MaxExpense, 100.0);
        bad.target_success_threshold = 1.5;
        assert!(matches!(solve_goal(&params, bad), Err(SimulationError::Solver(_))));

        let mut bad = config(GoalType::MaxExpense, 100.0);
        bad.final_simulations = MAX_ITERATIONS + 1;
        assert!(matches!(solve_goal(&params, bad), Err(SimulationError::Solver(_))));
    }
}
