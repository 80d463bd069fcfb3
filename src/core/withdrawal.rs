use super::tax::{
    TaxContext, YearTaxProfile, brokerage_gross_for_net, brokerage_sale_tax, gross_up_withdrawal,
    required_minimum_distribution,
};
use super::types::{AssetBucket, BucketAmounts, BucketKind, SavingsPlan};

pub const HSA_HEALTHCARE_SHARE: f64 = 0.15;
/// Unmet need below this is rounding, not depletion.
pub const DEPLETION_TOLERANCE: f64 = 1.0;
const SETTLED_EPSILON: f64 = 1e-6;

pub const WAGE_GROWTH: f64 = 0.04;
pub const LIMIT_GROWTH: f64 = 0.02;
pub const SURPLUS_SPLIT: (f64, f64, f64) = (0.35, 0.35, 0.30);
pub const EMPLOYER_PLAN_LIMIT: f64 = 23_000.0;
pub const EMPLOYER_PLAN_CATCH_UP: f64 = 7_500.0;
pub const IRA_LIMIT: f64 = 7_000.0;
pub const IRA_CATCH_UP: f64 = 1_000.0;
pub const CATCH_UP_AGE: u32 = 50;

#[derive(Clone, Debug, PartialEq)]
pub struct Portfolio {
    pub taxable: AssetBucket,
    pub tax_deferred: AssetBucket,
    pub tax_free: AssetBucket,
    pub hsa: AssetBucket,
}

impl Portfolio {
    pub fn from_balances(balances: &BucketAmounts) -> Self {
        let bucket = |kind| AssetBucket::new(kind, balances.get(kind));
        Self {
            taxable: bucket(BucketKind::Taxable),
            tax_deferred: bucket(BucketKind::TaxDeferred),
            tax_free: bucket(BucketKind::TaxFree),
            hsa: bucket(BucketKind::Hsa),
        }
    }

    pub fn balances(&self) -> BucketAmounts {
        BucketAmounts {
            taxable: self.taxable.balance(),
            tax_deferred: self.tax_deferred.balance(),
            tax_free: self.tax_free.balance(),
            hsa: self.hsa.balance(),
        }
    }

    pub fn total(&self) -> f64 {
        self.balances().total()
    }

    pub fn deposit(&mut self, amounts: &BucketAmounts) {
        self.taxable.deposit(amounts.taxable);
        self.tax_deferred.deposit(amounts.tax_deferred);
        self.tax_free.deposit(amounts.tax_free);
        self.hsa.deposit(amounts.hsa);
    }

    pub fn grow(&mut self, real_return: f64) {
        self.taxable.grow(real_return);
        self.tax_deferred.grow(real_return);
        self.tax_free.grow(real_return);
        self.hsa.grow(real_return);
    }
}

#[derive(Copy, Clone, Debug)]
pub struct DrawRequest<'a> {
    pub ctx: TaxContext<'a>,
    pub profile: YearTaxProfile,
    pub age: u32,
    pub net_need: f64,
    pub annual_expense: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Settlement {
    pub withdrawals: BucketAmounts,
    pub rmd: f64,
    pub reinvested: f64,
    /// Tax on portfolio withdrawals only.
    pub tax_paid: f64,
    pub shortfall: f64,
}

impl Settlement {
    pub fn depleted(&self) -> bool {
        self.shortfall > DEPLETION_TOLERANCE
    }
}

/// Settles one retirement year against the buckets in fixed order: HSA, RMD, taxable,
/// tax-deferred beyond the RMD, tax-free.
pub fn settle_retirement_year(portfolio: &mut Portfolio, request: &DrawRequest<'_>) -> Settlement {
    let mut out = Settlement::default();
    let mut need = request.net_need.max(0.0);

    let hsa_cap = (request.annual_expense * HSA_HEALTHCARE_SHARE).max(0.0);
    let from_hsa = portfolio.hsa.withdraw(need.min(hsa_cap));
    out.withdrawals.hsa = from_hsa;
    need -= from_hsa;

    let rmd_target = required_minimum_distribution(request.age, portfolio.tax_deferred.balance());
    let rmd = portfolio.tax_deferred.withdraw(rmd_target);
    let mut ordinary_withdrawn = rmd;
    if rmd > 0.0 {
        let rmd_tax = request.profile.incremental_tax(&request.ctx, 0.0, rmd);
        let net_rmd = (rmd - rmd_tax).max(0.0);
        let applied = net_rmd.min(need);
        need -= applied;
        out.reinvested = net_rmd - applied;
        portfolio.taxable.deposit(out.reinvested);
        out.rmd = rmd;
        out.tax_paid += rmd_tax;
        out.withdrawals.tax_deferred += rmd;
    }

    if need > SETTLED_EPSILON {
        let sold = portfolio.taxable.withdraw(brokerage_gross_for_net(need));
        let tax = brokerage_sale_tax(sold);
        out.withdrawals.taxable += sold;
        out.tax_paid += tax;
        need -= sold - tax;
    }

    // A second pass mops up what a non-converged gross-up left behind.
    for _ in 0..2 {
        if need <= SETTLED_EPSILON || portfolio.tax_deferred.balance() <= 0.0 {
            break;
        }
        let gross_up = gross_up_withdrawal(&request.ctx, &request.profile, ordinary_withdrawn, need);
        let taken = portfolio.tax_deferred.withdraw(gross_up.gross);
        let tax = request
            .profile
            .incremental_tax(&request.ctx, ordinary_withdrawn, taken);
        ordinary_withdrawn += taken;
        out.withdrawals.tax_deferred += taken;
        out.tax_paid += tax;
        need -= (taken - tax).max(0.0);
    }

    if need > SETTLED_EPSILON {
        let taken = portfolio.tax_free.withdraw(need);
        out.withdrawals.tax_free += taken;
        need -= taken;
    }

    out.shortfall = if need > SETTLED_EPSILON { need } else { 0.0 };
    out
}

/// Contributions for one working year, converted to today's dollars.
pub fn allocate_contributions(plan: &SavingsPlan, age: u32, years: u32, price_index: f64) -> BucketAmounts {
    let wage = (1.0 + WAGE_GROWTH).powi(years as i32);
    let limit_growth = (1.0 + LIMIT_GROWTH).powi(years as i32);
    let earners = plan.earners.max(1) as f64;
    let catch_up = age >= CATCH_UP_AGE;

    let base_total = plan.base_total() * wage;
    let surplus = (plan.household_income.max(0.0) * wage
        - plan.working_expense.max(0.0) * price_index
        - base_total)
        .max(0.0);
    let (to_employer, to_ira, to_brokerage) = SURPLUS_SPLIT;

    let employer_limit = (EMPLOYER_PLAN_LIMIT + if catch_up { EMPLOYER_PLAN_CATCH_UP } else { 0.0 })
        * limit_growth
        * earners;
    let ira_limit =
        (IRA_LIMIT + if catch_up { IRA_CATCH_UP } else { 0.0 }) * limit_growth * earners;

    let employer_requested = plan.employer_plan.max(0.0) * wage + surplus * to_employer;
    let roth_requested = plan.roth_ira.max(0.0) * wage;
    let traditional_requested = plan.traditional_ira.max(0.0) * wage + surplus * to_ira;

    let employer = employer_requested.min(employer_limit);
    let roth = roth_requested.min(ira_limit);
    let traditional = traditional_requested.min(ira_limit - roth);
    let overflow = (employer_requested - employer)
        + (roth_requested - roth)
        + (traditional_requested - traditional);
    let brokerage = plan.brokerage.max(0.0) * wage + surplus * to_brokerage + overflow;

    let deflator = price_index.max(1e-9);
    BucketAmounts {
        taxable: brokerage / deflator,
        tax_deferred: (employer + traditional) / deflator,
        tax_free: roth / deflator,
        hsa: 0.0,
    }
}
