use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use super::error::{Result, SimulationError};
use super::jurisdiction::lookup;
use super::ltc::LtcProcess;
use super::market::{CapitalMarketModel, SeedStream, stream_rng};
use super::normalize::validate;
use super::stats::{mean, median, percentile, percentile_bands};
use super::tax::{TaxContext, YearTaxProfile, effective_tax_rate, guaranteed_income, seniors};
use super::types::{
    BucketAmounts, CashflowYearResult, IterationLedger, LtcStrategy, SimulationParameters,
    SimulationResult, YearRecord,
};
use super::withdrawal::{DrawRequest, Portfolio, allocate_contributions, settle_retirement_year};

pub type Progress<'a> = &'a (dyn Fn(u32, u32) + Sync);

#[derive(Debug)]
struct IterationOutcome {
    iteration: u32,
    success: bool,
    ending_balance: f64,
    depletion_age: Option<u32>,
    had_ltc_episode: bool,
    lifetime_ltc_cost: f64,
    years: Vec<YearRecord>,
}

pub fn run_simulation(params: &SimulationParameters) -> Result<SimulationResult> {
    run_simulation_with_progress(params, None)
}

pub fn run_simulation_with_progress(
    params: &SimulationParameters,
    progress: Option<Progress<'_>>,
) -> Result<SimulationResult> {
    validate(params)?;
    log::info!(
        "running {} iterations over {} years (seed {}, {})",
        params.iterations,
        params.horizon_years(),
        params.seed,
        if params.parallel { "parallel" } else { "serial" }
    );

    let outcomes = run_iterations(params, params.keep_ledgers, progress);
    let result = aggregate(params, outcomes);
    log::info!(
        "finished: success {:.1}% over {} iterations ({} excluded)",
        result.success_probability * 100.0,
        result.iterations_completed,
        result.iterations_excluded
    );
    Ok(result)
}

fn run_iterations(
    params: &SimulationParameters,
    keep_years: bool,
    progress: Option<Progress<'_>>,
) -> Vec<Result<IterationOutcome>> {
    let total = params.iterations;
    let completed = AtomicU32::new(0);
    let run_one = |iteration: u32| {
        let outcome = simulate_iteration(params, iteration, keep_years);
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(report) = progress {
            report(done, total);
        }
        outcome
    };

    if params.parallel {
        (0..total).into_par_iter().map(&run_one).collect()
    } else {
        (0..total).map(&run_one).collect()
    }
}

/// One iteration from the current age to the household horizon. A pure function of
/// the parameters and the iteration index.
fn simulate_iteration(
    params: &SimulationParameters,
    iteration: u32,
    keep_years: bool,
) -> Result<IterationOutcome> {
    let jurisdiction = lookup(&params.jurisdiction);
    let subject = &params.subject;
    let horizon = params.horizon_years();
    let last_age = subject.age_after(horizon - 1);

    let mut market_rng = stream_rng(params.seed, iteration, SeedStream::Market);
    let mut path_rng = stream_rng(params.seed, iteration, SeedStream::LtcPath);
    let mut cost_rng = stream_rng(params.seed, iteration, SeedStream::LtcCost);

    let market = CapitalMarketModel::new(&params.market);
    let mut ltc = LtcProcess::new(
        &params.ltc,
        jurisdiction,
        subject.current_age,
        last_age,
        &mut path_rng,
        &mut cost_rng,
    );
    let mut portfolio = Portfolio::from_balances(&params.balances);

    let mut price_index = 1.0;
    let mut depletion_age = None;
    let mut lifetime_ltc_cost = 0.0;
    let mut years = Vec::with_capacity(if keep_years { horizon as usize } else { 0 });

    for year in 0..horizon {
        let age = subject.age_after(year);
        let spouse_age = params.spouse.as_ref().map(|s| s.age_after(year));
        let retired = age >= subject.retirement_age;

        let draw = market.draw(
            subject.retirement_age as i64 - age as i64,
            &mut market_rng,
        );
        let care = ltc.step(age, year, price_index, &mut path_rng);
        lifetime_ltc_cost += care.cost;

        let mut income = guaranteed_income(subject, age, price_index);
        if let (Some(spouse), Some(spouse_age)) = (params.spouse.as_ref(), spouse_age) {
            income = income.combine(guaranteed_income(spouse, spouse_age, price_index));
        }

        let mut household_ages = vec![age];
        household_ages.extend(spouse_age);
        let ctx = TaxContext {
            filing_status: params.filing_status,
            jurisdiction,
            seniors: seniors(&household_ages),
        };
        let profile = YearTaxProfile {
            ordinary_income: income.ordinary() + care.taxable_benefit,
            social_security: income.social_security,
            deductions: care.deductible_premium,
        };
        let income_tax = profile.total_tax(&ctx, 0.0);

        let expense = if retired { params.annual_expense } else { 0.0 };
        let need = expense + care.out_of_pocket() + income_tax - income.total();

        let mut contributions = if retired {
            BucketAmounts::default()
        } else {
            allocate_contributions(&params.savings, age, year, price_index)
        };
        portfolio.deposit(&contributions);

        let settlement = settle_retirement_year(
            &mut portfolio,
            &DrawRequest {
                ctx,
                profile,
                age,
                net_need: need.max(0.0),
                annual_expense: params.annual_expense,
            },
        );
        if need < 0.0 {
            portfolio.taxable.deposit(-need);
            contributions.taxable += -need;
        }
        if settlement.depleted() && depletion_age.is_none() {
            depletion_age = Some(age);
            log::trace!("iteration {iteration} depleted at age {age}");
        }

        let ordinary_taxable = (profile.ordinary_income + settlement.withdrawals.tax_deferred
            - profile.deductions)
            .max(0.0);

        portfolio.grow(draw.real_return);
        let ending = portfolio.balances();
        if !ending.all_finite() || !price_index.is_finite() {
            return Err(SimulationError::degenerate(format!(
                "iteration {iteration}, age {age}"
            )));
        }

        if keep_years {
            years.push(YearRecord {
                year,
                age,
                spouse_age,
                retired,
                real_return: draw.real_return,
                nominal_return: draw.nominal_return,
                inflation: draw.inflation,
                social_security: income.social_security,
                pension: income.pension,
                part_time: income.part_time,
                annuity: income.annuity,
                expense,
                ltc_state: (params.ltc.strategy != LtcStrategy::Disabled)
                    .then(|| care.state.label().to_string()),
                ltc_cost: care.cost,
                ltc_benefit: care.benefit,
                ltc_premium: care.premium,
                rmd: settlement.rmd,
                contributions,
                withdrawals: settlement.withdrawals,
                tax_paid: income_tax + settlement.tax_paid,
                effective_tax_rate: effective_tax_rate(&ctx, ordinary_taxable),
                shortfall: settlement.shortfall,
                ending,
            });
        }

        price_index *= 1.0 + draw.inflation;
    }

    Ok(IterationOutcome {
        iteration,
        success: depletion_age.is_none(),
        ending_balance: portfolio.total(),
        depletion_age,
        had_ltc_episode: ltc.had_episode(),
        lifetime_ltc_cost,
        years,
    })
}

fn aggregate(
    params: &SimulationParameters,
    outcomes: Vec<Result<IterationOutcome>>,
) -> SimulationResult {
    let mut completed = Vec::with_capacity(outcomes.len());
    let mut excluded = 0;
    for outcome in outcomes {
        match outcome {
            Ok(outcome) => completed.push(outcome),
            Err(e) => {
                excluded += 1;
                log::debug!("excluding iteration: {e}");
            }
        }
    }
    if completed.is_empty() {
        log::warn!("every iteration was excluded; reporting an empty result");
    }

    let n = completed.len().max(1) as f64;
    let successes = completed.iter().filter(|o| o.success).count();
    let mut endings: Vec<f64> = completed.iter().map(|o| o.ending_balance).collect();
    let mut depletion_ages: Vec<f64> = completed
        .iter()
        .filter_map(|o| o.depletion_age.map(f64::from))
        .collect();
    let ltc_costs: Vec<f64> = completed.iter().map(|o| o.lifetime_ltc_cost).collect();
    let episodes = completed.iter().filter(|o| o.had_ltc_episode).count();

    let ledgers = params.keep_ledgers.then(|| {
        completed
            .iter_mut()
            .map(|o| IterationLedger {
                iteration: o.iteration,
                success: o.success,
                years: std::mem::take(&mut o.years),
            })
            .collect()
    });

    SimulationResult {
        iterations_requested: params.iterations,
        iterations_completed: completed.len() as u32,
        iterations_excluded: excluded,
        success_probability: successes as f64 / n,
        mean_ending_balance: mean(&endings),
        median_ending_balance: median(&mut endings),
        ending_balance_percentiles: percentile_bands(&mut endings),
        ltc_episode_rate: episodes as f64 / n,
        mean_lifetime_ltc_cost: mean(&ltc_costs),
        median_depletion_age: (!depletion_ages.is_empty()).then(|| median(&mut depletion_ages)),
        ledgers,
    }
}

struct YearlyAccumulator {
    ages: Vec<u32>,
    guaranteed_income: Vec<Vec<f64>>,
    contribution_total: Vec<Vec<f64>>,
    withdrawal_total: Vec<Vec<f64>>,
    rmd: Vec<Vec<f64>>,
    ltc_cost: Vec<Vec<f64>>,
    tax_paid: Vec<Vec<f64>>,
    end_taxable: Vec<Vec<f64>>,
    end_tax_deferred: Vec<Vec<f64>>,
    end_tax_free: Vec<Vec<f64>>,
    end_hsa: Vec<Vec<f64>>,
    end_total: Vec<Vec<f64>>,
}

impl YearlyAccumulator {
    fn new(ages: Vec<u32>, expected_samples: usize) -> Self {
        let year_count = ages.len();
        let make = || {
            (0..year_count)
                .map(|_| Vec::with_capacity(expected_samples))
                .collect::<Vec<_>>()
        };

        Self {
            ages,
            guaranteed_income: make(),
            contribution_total: make(),
            withdrawal_total: make(),
            rmd: make(),
            ltc_cost: make(),
            tax_paid: make(),
            end_taxable: make(),
            end_tax_deferred: make(),
            end_tax_free: make(),
            end_hsa: make(),
            end_total: make(),
        }
    }

    fn push(&mut self, index: usize, row: &YearRecord) {
        self.guaranteed_income[index]
            .push(row.social_security + row.pension + row.part_time + row.annuity);
        self.contribution_total[index].push(row.contributions.total());
        self.withdrawal_total[index].push(row.withdrawals.total());
        self.rmd[index].push(row.rmd);
        self.ltc_cost[index].push(row.ltc_cost);
        self.tax_paid[index].push(row.tax_paid);
        self.end_taxable[index].push(row.ending.taxable);
        self.end_tax_deferred[index].push(row.ending.tax_deferred);
        self.end_tax_free[index].push(row.ending.tax_free);
        self.end_hsa[index].push(row.ending.hsa);
        self.end_total[index].push(row.ending.total());
    }

    fn into_results(mut self) -> Vec<CashflowYearResult> {
        let mut results = Vec::with_capacity(self.ages.len());
        for idx in 0..self.ages.len() {
            results.push(CashflowYearResult {
                age: self.ages[idx],
                median_guaranteed_income: percentile(&mut self.guaranteed_income[idx], 50.0),
                median_contribution_total: percentile(&mut self.contribution_total[idx], 50.0),
                median_withdrawal_total: percentile(&mut self.withdrawal_total[idx], 50.0),
                median_rmd: percentile(&mut self.rmd[idx], 50.0),
                median_ltc_cost: percentile(&mut self.ltc_cost[idx], 50.0),
                median_tax_paid: percentile(&mut self.tax_paid[idx], 50.0),
                median_end_taxable: percentile(&mut self.end_taxable[idx], 50.0),
                median_end_tax_deferred: percentile(&mut self.end_tax_deferred[idx], 50.0),
                median_end_tax_free: percentile(&mut self.end_tax_free[idx], 50.0),
                median_end_hsa: percentile(&mut self.end_hsa[idx], 50.0),
                median_end_total: percentile(&mut self.end_total[idx], 50.0),
            });
        }
        results
    }
}

pub fn run_yearly_cashflow_trace(params: &SimulationParameters) -> Result<Vec<CashflowYearResult>> {
    validate(params)?;
    let ages = (0..params.horizon_years())
        .map(|year| params.subject.age_after(year))
        .collect::<Vec<_>>();
    let mut acc = YearlyAccumulator::new(ages, params.iterations as usize);

    for outcome in run_iterations(params, true, None).into_iter().flatten() {
        for (idx, row) in outcome.years.iter().enumerate() {
            acc.push(idx, row);
        }
    }

    Ok(acc.into_results())
}
