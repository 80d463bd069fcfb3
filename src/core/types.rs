use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingStatus {
    Single,
    MarriedJoint,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Female,
    Male,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InflationRider {
    None,
    Compound3,
    Simple5,
    Cpi,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LtcStrategy {
    Disabled,
    PerYearWalk,
    SingleEvent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnMode {
    Fixed,
    GlidePath,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketKind {
    Taxable,
    TaxDeferred,
    TaxFree,
    Hsa,
}

/// A single tax-treatment bucket. Balances are carried in real (today's) dollars
/// and can never go negative.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AssetBucket {
    pub kind: BucketKind,
    balance: f64,
}

impl AssetBucket {
    pub fn new(kind: BucketKind, balance: f64) -> Self {
        Self {
            kind,
            balance: balance.max(0.0),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn deposit(&mut self, amount: f64) {
        if amount > 0.0 {
            self.balance += amount;
        }
    }

    pub fn withdraw(&mut self, amount: f64) -> f64 {
        if amount <= 0.0 || self.balance <= 0.0 {
            return 0.0;
        }
        let taken = amount.min(self.balance);
        self.balance = (self.balance - taken).max(0.0);
        taken
    }

    pub fn grow(&mut self, real_return: f64) {
        self.balance = (self.balance * (1.0 + real_return)).max(0.0);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketAmounts {
    pub taxable: f64,
    pub tax_deferred: f64,
    pub tax_free: f64,
    pub hsa: f64,
}

impl BucketAmounts {
    pub fn total(&self) -> f64 {
        self.taxable + self.tax_deferred + self.tax_free + self.hsa
    }

    pub fn get(&self, kind: BucketKind) -> f64 {
        match kind {
            BucketKind::Taxable => self.taxable,
            BucketKind::TaxDeferred => self.tax_deferred,
            BucketKind::TaxFree => self.tax_free,
            BucketKind::Hsa => self.hsa,
        }
    }

    pub fn add(&mut self, kind: BucketKind, amount: f64) {
        match kind {
            BucketKind::Taxable => self.taxable += amount,
            BucketKind::TaxDeferred => self.tax_deferred += amount,
            BucketKind::TaxFree => self.tax_free += amount,
            BucketKind::Hsa => self.hsa += amount,
        }
    }

    pub fn all_finite(&self) -> bool {
        [self.taxable, self.tax_deferred, self.tax_free, self.hsa]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annuity {
    pub annual_payout: f64,
    pub start_age: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStreams {
    /// Annual benefit in today's dollars (COLA-adjusted, so constant in real terms).
    pub social_security_annual: f64,
    pub social_security_claim_age: u32,
    /// Nominal annual pension; loses purchasing power with inflation.
    pub pension_annual: f64,
    pub pension_start_age: u32,
    pub part_time_annual: f64,
    pub annuities: Vec<Annuity>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub current_age: u32,
    pub retirement_age: u32,
    pub life_expectancy: u32,
    pub income: IncomeStreams,
}

impl Person {
    pub fn age_after(&self, years: u32) -> u32 {
        self.current_age + years
    }

    pub fn years_remaining(&self) -> u32 {
        self.life_expectancy.saturating_sub(self.current_age)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsPlan {
    pub employer_plan: f64,
    pub traditional_ira: f64,
    pub roth_ira: f64,
    pub brokerage: f64,
    pub household_income: f64,
    pub working_expense: f64,
    pub earners: u32,
}

impl SavingsPlan {
    pub fn base_total(&self) -> f64 {
        self.employer_plan.max(0.0)
            + self.traditional_ira.max(0.0)
            + self.roth_ira.max(0.0)
            + self.brokerage.max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAssumptions {
    pub mode: ReturnMode,
    pub expected_return: f64,
    pub volatility: f64,
    pub inflation_mean: f64,
    pub inflation_volatility: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsurancePolicy {
    pub daily_benefit: f64,
    pub elimination_days: u32,
    pub benefit_period_years: f64,
    pub inflation_rider: InflationRider,
    pub tax_qualified: bool,
    pub annual_premium: f64,
}

impl InsurancePolicy {
    pub fn lifetime_pool(&self) -> f64 {
        (self.daily_benefit * self.benefit_period_years * 365.0).max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtcInputs {
    pub strategy: LtcStrategy,
    pub gender: Gender,
    pub health: HealthStatus,
    pub policy: Option<InsurancePolicy>,
    pub lifetime_probability_override: Option<f64>,
    pub prefer_private_room: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    pub subject: Person,
    pub spouse: Option<Person>,
    pub filing_status: FilingStatus,
    pub jurisdiction: String,
    pub balances: BucketAmounts,
    pub savings: SavingsPlan,
    pub annual_expense: f64,
    pub market: MarketAssumptions,
    pub ltc: LtcInputs,
    pub iterations: u32,
    pub seed: u64,
    pub keep_ledgers: bool,
    pub parallel: bool,
}

impl SimulationParameters {
    /// Number of simulated years: until the longer-lived spouse reaches life expectancy.
    pub fn horizon_years(&self) -> u32 {
        let subject = self.subject.years_remaining();
        let spouse = self
            .spouse
            .as_ref()
            .map(Person::years_remaining)
            .unwrap_or(0);
        subject.max(spouse).max(1)
    }
}

/// Per-iteration, per-year snapshot. All money is in today's dollars.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub year: u32,
    pub age: u32,
    pub spouse_age: Option<u32>,
    pub retired: bool,
    pub real_return: f64,
    pub nominal_return: f64,
    pub inflation: f64,
    pub social_security: f64,
    pub pension: f64,
    pub part_time: f64,
    pub annuity: f64,
    pub expense: f64,
    pub ltc_state: Option<String>,
    pub ltc_cost: f64,
    pub ltc_benefit: f64,
    pub ltc_premium: f64,
    pub rmd: f64,
    pub contributions: BucketAmounts,
    pub withdrawals: BucketAmounts,
    pub tax_paid: f64,
    /// Federal plus state tax on the year's ordinary income, as a share of it.
    pub effective_tax_rate: f64,
    pub shortfall: f64,
    pub ending: BucketAmounts,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileBands {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationLedger {
    pub iteration: u32,
    pub success: bool,
    pub years: Vec<YearRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowYearResult {
    pub age: u32,
    pub median_guaranteed_income: f64,
    pub median_contribution_total: f64,
    pub median_withdrawal_total: f64,
    pub median_rmd: f64,
    pub median_ltc_cost: f64,
    pub median_tax_paid: f64,
    pub median_end_taxable: f64,
    pub median_end_tax_deferred: f64,
    pub median_end_tax_free: f64,
    pub median_end_hsa: f64,
    pub median_end_total: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub iterations_requested: u32,
    pub iterations_completed: u32,
    pub iterations_excluded: u32,
    pub success_probability: f64,
    pub mean_ending_balance: f64,
    pub median_ending_balance: f64,
    pub ending_balance_percentiles: PercentileBands,
    pub ltc_episode_rate: f64,
    pub mean_lifetime_ltc_cost: f64,
    pub median_depletion_age: Option<f64>,
    pub ledgers: Option<Vec<IterationLedger>>,
}
