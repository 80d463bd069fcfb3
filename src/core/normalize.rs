use serde::Deserialize;
use serde_json::Value;

use super::error::{Result, SimulationError};
use super::jurisdiction;
use super::types::{
    Annuity, BucketAmounts, BucketKind, FilingStatus, Gender, HealthStatus, IncomeStreams,
    InflationRider, InsurancePolicy, LtcInputs, LtcStrategy, MarketAssumptions, Person,
    ReturnMode, SavingsPlan, SimulationParameters,
};

pub const DEFAULT_CURRENT_AGE: u32 = 40;
pub const DEFAULT_RETIREMENT_AGE: u32 = 65;
pub const DEFAULT_LIFE_EXPECTANCY: u32 = 90;
pub const DEFAULT_MONTHLY_EXPENSE: f64 = 11_000.0;
pub const DEFAULT_INFLATION: f64 = 0.025;
pub const DEFAULT_INFLATION_VOLATILITY: f64 = 0.01;
pub const DEFAULT_EXPECTED_RETURN: f64 = 0.07;
pub const DEFAULT_VOLATILITY: f64 = 0.12;
pub const DEFAULT_SOCIAL_SECURITY_CLAIM_AGE: u32 = 67;
pub const DEFAULT_PENSION_START_AGE: u32 = 65;
pub const DEFAULT_ITERATIONS: u32 = 1_000;
pub const MAX_ITERATIONS: u32 = 100_000;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_JURISDICTION: &str = "US";
pub const DEFAULT_ELIMINATION_DAYS: u32 = 90;
pub const DEFAULT_BENEFIT_PERIOD_YEARS: f64 = 3.0;
pub const DEFAULT_LTC_STRATEGY: LtcStrategy = LtcStrategy::PerYearWalk;
pub const DEFAULT_GENDER: Gender = Gender::Female;
pub const DEFAULT_HEALTH: HealthStatus = HealthStatus::Good;
pub const DEFAULT_SAVINGS_SPLIT: (f64, f64, f64) = (0.35, 0.35, 0.30);

const MAX_AGE: f64 = 130.0;

/// Loosely-shaped household record as it arrives from a client. Numbers may be JSON
/// numbers or strings such as "$1,200" and "7%".
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FinancialRecord {
    pub age: Option<Value>,
    pub retirement_age: Option<Value>,
    pub life_expectancy: Option<Value>,
    pub monthly_expense: Option<Value>,
    pub annual_expense: Option<Value>,
    pub filing_status: Option<String>,
    pub state: Option<String>,
    pub accounts: Vec<AccountRecord>,

    pub social_security: Option<Value>,
    pub social_security_claim_age: Option<Value>,
    pub pension: Option<Value>,
    pub pension_start_age: Option<Value>,
    pub part_time_income: Option<Value>,
    pub annuities: Vec<AnnuityRecord>,

    pub annual_savings: Option<Value>,
    pub employer_plan_contribution: Option<Value>,
    pub ira_contribution: Option<Value>,
    pub roth_contribution: Option<Value>,
    pub brokerage_contribution: Option<Value>,
    pub household_income: Option<Value>,
    pub working_expense: Option<Value>,

    pub return_mode: Option<String>,
    pub expected_return: Option<Value>,
    pub volatility: Option<Value>,
    pub inflation: Option<Value>,
    pub inflation_volatility: Option<Value>,

    pub spouse: Option<SpouseRecord>,
    pub ltc: Option<LtcRecord>,

    pub iterations: Option<Value>,
    pub seed: Option<Value>,
    pub keep_ledgers: Option<bool>,
    pub parallel: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(alias = "type")]
    pub account_type: Option<String>,
    pub balance: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnnuityRecord {
    pub annual_payout: Option<Value>,
    pub start_age: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpouseRecord {
    pub age: Option<Value>,
    pub retirement_age: Option<Value>,
    pub life_expectancy: Option<Value>,
    pub social_security: Option<Value>,
    pub social_security_claim_age: Option<Value>,
    pub pension: Option<Value>,
    pub pension_start_age: Option<Value>,
    pub part_time_income: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LtcRecord {
    pub strategy: Option<String>,
    pub gender: Option<String>,
    pub health: Option<String>,
    pub lifetime_probability: Option<Value>,
    pub private_room: Option<bool>,
    pub policy: Option<PolicyRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyRecord {
    pub daily_benefit: Option<Value>,
    pub elimination_days: Option<Value>,
    pub benefit_period_years: Option<Value>,
    pub inflation_rider: Option<String>,
    pub tax_qualified: Option<bool>,
    pub annual_premium: Option<Value>,
}

pub fn parse_number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .chars()
            .filter(|c| !matches!(c, '$' | ',' | '%' | '_') && !c.is_whitespace())
            .collect::<String>()
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn money(value: Option<&Value>, default: f64) -> f64 {
    parse_number(value).unwrap_or(default)
}

/// Rates may arrive as 0.07, 7 or "7%"; anything above 1 in magnitude is a percent.
pub fn parse_rate(value: Option<&Value>) -> Option<f64> {
    let n = parse_number(value)?;
    let is_percent = matches!(value, Some(Value::String(s)) if s.contains('%'));
    Some(if is_percent || n.abs() > 1.0 { n / 100.0 } else { n })
}

fn rate(value: Option<&Value>, default: f64) -> f64 {
    parse_rate(value).unwrap_or(default)
}

fn age(value: Option<&Value>, field: &'static str, default: u32) -> Result<u32> {
    match parse_number(value) {
        None => Ok(default),
        Some(n) if n < 0.0 => Err(SimulationError::invalid(field, format!("{n} is negative"))),
        Some(n) if n > MAX_AGE => Err(SimulationError::invalid(
            field,
            format!("{n} is not a plausible age"),
        )),
        Some(n) => Ok(n.round() as u32),
    }
}

fn keyword(raw: Option<&str>) -> String {
    raw.unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

pub fn classify_account(account_type: &str) -> BucketKind {
    let key = keyword(Some(account_type));
    let is_hsa_word = account_type
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("hsa"));
    if is_hsa_word || key.contains("healthsavings") {
        return BucketKind::Hsa;
    }
    if key.contains("roth") {
        return BucketKind::TaxFree;
    }
    const DEFERRED: [&str; 9] = [
        "401k", "403b", "457", "ira", "traditional", "sep", "simple", "tsp", "pension",
    ];
    if DEFERRED.iter().any(|k| key.contains(k)) {
        return BucketKind::TaxDeferred;
    }
    const TAXABLE: [&str; 8] = [
        "brokerage", "taxable", "cash", "savings", "checking", "cd", "moneymarket", "individual",
    ];
    if !TAXABLE.iter().any(|k| key.contains(k)) {
        log::debug!("unrecognised account type {account_type:?}; treating as taxable");
    }
    BucketKind::Taxable
}

fn filing_status(raw: Option<&str>, has_spouse: bool) -> FilingStatus {
    match keyword(raw).as_str() {
        "single" => FilingStatus::Single,
        "married" | "marriedjoint" | "marriedfilingjointly" | "joint" | "mfj" => {
            FilingStatus::MarriedJoint
        }
        _ if has_spouse => FilingStatus::MarriedJoint,
        _ => FilingStatus::Single,
    }
}

fn ltc_strategy(raw: Option<&str>) -> LtcStrategy {
    match keyword(raw).as_str() {
        "disabled" | "none" | "off" => LtcStrategy::Disabled,
        "singleevent" | "single" | "event" => LtcStrategy::SingleEvent,
        "peryearwalk" | "walk" | "markov" => LtcStrategy::PerYearWalk,
        _ => DEFAULT_LTC_STRATEGY,
    }
}

fn gender(raw: Option<&str>) -> Gender {
    match keyword(raw).as_str() {
        "male" | "m" => Gender::Male,
        "female" | "f" => Gender::Female,
        _ => DEFAULT_GENDER,
    }
}

fn health(raw: Option<&str>) -> HealthStatus {
    match keyword(raw).as_str() {
        "excellent" => HealthStatus::Excellent,
        "good" => HealthStatus::Good,
        "fair" => HealthStatus::Fair,
        "poor" => HealthStatus::Poor,
        _ => DEFAULT_HEALTH,
    }
}

fn inflation_rider(raw: Option<&str>) -> InflationRider {
    match keyword(raw).as_str() {
        "compound" | "compound3" | "3compound" => InflationRider::Compound3,
        "simple" | "simple5" | "5simple" => InflationRider::Simple5,
        "cpi" => InflationRider::Cpi,
        _ => InflationRider::None,
    }
}

fn return_mode(raw: Option<&str>) -> ReturnMode {
    match keyword(raw).as_str() {
        "glidepath" | "glide" => ReturnMode::GlidePath,
        _ => ReturnMode::Fixed,
    }
}

#[allow(clippy::too_many_arguments)]
fn person(
    age_value: Option<&Value>,
    retirement: Option<&Value>,
    life: Option<&Value>,
    social_security: Option<&Value>,
    claim_age: Option<&Value>,
    pension: Option<&Value>,
    pension_start: Option<&Value>,
    part_time: Option<&Value>,
    annuities: Vec<Annuity>,
) -> Result<Person> {
    let current_age = age(age_value, "age", DEFAULT_CURRENT_AGE)?;
    let retirement_age = age(retirement, "retirementAge", DEFAULT_RETIREMENT_AGE.max(current_age))?;
    if retirement_age < current_age {
        return Err(SimulationError::invalid(
            "retirementAge",
            format!("{retirement_age} is before current age {current_age}"),
        ));
    }
    let life_expectancy = age(life, "lifeExpectancy", DEFAULT_LIFE_EXPECTANCY)?.max(current_age + 1);

    Ok(Person {
        current_age,
        retirement_age,
        life_expectancy,
        income: IncomeStreams {
            social_security_annual: money(social_security, 0.0).max(0.0),
            social_security_claim_age: age(
                claim_age,
                "socialSecurityClaimAge",
                DEFAULT_SOCIAL_SECURITY_CLAIM_AGE,
            )?,
            pension_annual: money(pension, 0.0).max(0.0),
            pension_start_age: age(pension_start, "pensionStartAge", DEFAULT_PENSION_START_AGE)?,
            part_time_annual: money(part_time, 0.0).max(0.0),
            annuities,
        },
    })
}

fn savings_plan(record: &FinancialRecord, annual_expense: f64, earners: u32) -> SavingsPlan {
    let explicit = [
        record.employer_plan_contribution.as_ref(),
        record.ira_contribution.as_ref(),
        record.roth_contribution.as_ref(),
        record.brokerage_contribution.as_ref(),
    ]
    .into_iter()
    .any(|v| parse_number(v).is_some());

    let (employer_plan, traditional_ira, roth_ira, brokerage) = if explicit {
        (
            money(record.employer_plan_contribution.as_ref(), 0.0),
            money(record.ira_contribution.as_ref(), 0.0),
            money(record.roth_contribution.as_ref(), 0.0),
            money(record.brokerage_contribution.as_ref(), 0.0),
        )
    } else {
        let total = money(record.annual_savings.as_ref(), 0.0).max(0.0);
        let (employer, ira, brokerage) = DEFAULT_SAVINGS_SPLIT;
        (total * employer, total * ira, 0.0, total * brokerage)
    };

    SavingsPlan {
        employer_plan: employer_plan.max(0.0),
        traditional_ira: traditional_ira.max(0.0),
        roth_ira: roth_ira.max(0.0),
        brokerage: brokerage.max(0.0),
        household_income: money(record.household_income.as_ref(), 0.0).max(0.0),
        working_expense: money(record.working_expense.as_ref(), annual_expense).max(0.0),
        earners,
    }
}

fn policy(record: &PolicyRecord) -> InsurancePolicy {
    InsurancePolicy {
        daily_benefit: money(record.daily_benefit.as_ref(), 0.0).max(0.0),
        elimination_days: parse_number(record.elimination_days.as_ref())
            .map(|d| d.max(0.0).round() as u32)
            .unwrap_or(DEFAULT_ELIMINATION_DAYS),
        benefit_period_years: money(
            record.benefit_period_years.as_ref(),
            DEFAULT_BENEFIT_PERIOD_YEARS,
        )
        .max(0.0),
        inflation_rider: inflation_rider(record.inflation_rider.as_deref()),
        tax_qualified: record.tax_qualified.unwrap_or(true),
        annual_premium: money(record.annual_premium.as_ref(), 0.0).max(0.0),
    }
}

fn ltc_inputs(record: Option<&LtcRecord>) -> LtcInputs {
    let Some(record) = record else {
        return LtcInputs {
            strategy: DEFAULT_LTC_STRATEGY,
            gender: DEFAULT_GENDER,
            health: DEFAULT_HEALTH,
            policy: None,
            lifetime_probability_override: None,
            prefer_private_room: false,
        };
    };
    LtcInputs {
        strategy: ltc_strategy(record.strategy.as_deref()),
        gender: gender(record.gender.as_deref()),
        health: health(record.health.as_deref()),
        policy: record.policy.as_ref().map(policy),
        lifetime_probability_override: parse_rate(record.lifetime_probability.as_ref())
            .map(|p| p.clamp(0.0, 1.0)),
        prefer_private_room: record.private_room.unwrap_or(false),
    }
}

/// Turns a loose record into fully-populated parameters. Missing or unreadable
/// fields take the `DEFAULT_*` constants; only impossible ages are rejected.
pub fn normalize(record: &FinancialRecord) -> Result<SimulationParameters> {
    let annuities = record
        .annuities
        .iter()
        .filter_map(|a| {
            let payout = parse_number(a.annual_payout.as_ref())?;
            Some(Annuity {
                annual_payout: payout.max(0.0),
                start_age: parse_number(a.start_age.as_ref())
                    .map(|n| n.max(0.0).round() as u32)
                    .unwrap_or(DEFAULT_RETIREMENT_AGE),
            })
        })
        .collect();

    let subject = person(
        record.age.as_ref(),
        record.retirement_age.as_ref(),
        record.life_expectancy.as_ref(),
        record.social_security.as_ref(),
        record.social_security_claim_age.as_ref(),
        record.pension.as_ref(),
        record.pension_start_age.as_ref(),
        record.part_time_income.as_ref(),
        annuities,
    )?;

    let spouse = record
        .spouse
        .as_ref()
        .map(|s| {
            person(
                s.age.as_ref(),
                s.retirement_age.as_ref(),
                s.life_expectancy.as_ref(),
                s.social_security.as_ref(),
                s.social_security_claim_age.as_ref(),
                s.pension.as_ref(),
                s.pension_start_age.as_ref(),
                s.part_time_income.as_ref(),
                Vec::new(),
            )
        })
        .transpose()?;

    let mut balances = BucketAmounts::default();
    for account in &record.accounts {
        let kind = classify_account(account.account_type.as_deref().unwrap_or_default());
        balances.add(kind, money(account.balance.as_ref(), 0.0).max(0.0));
    }

    let annual_expense = parse_number(record.annual_expense.as_ref())
        .or_else(|| parse_number(record.monthly_expense.as_ref()).map(|m| m * 12.0))
        .unwrap_or(DEFAULT_MONTHLY_EXPENSE * 12.0)
        .max(0.0);

    let jurisdiction_code = record
        .state
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .unwrap_or(DEFAULT_JURISDICTION);
    if !jurisdiction::is_known(jurisdiction_code) {
        log::debug!("unknown jurisdiction {jurisdiction_code:?}; using national averages");
    }

    let earners = 1 + u32::from(spouse.is_some());
    let params = SimulationParameters {
        filing_status: filing_status(record.filing_status.as_deref(), spouse.is_some()),
        jurisdiction: jurisdiction_code.to_ascii_uppercase(),
        balances,
        savings: savings_plan(record, annual_expense, earners),
        annual_expense,
        market: MarketAssumptions {
            mode: return_mode(record.return_mode.as_deref()),
            expected_return: rate(record.expected_return.as_ref(), DEFAULT_EXPECTED_RETURN),
            volatility: rate(record.volatility.as_ref(), DEFAULT_VOLATILITY).abs(),
            inflation_mean: rate(record.inflation.as_ref(), DEFAULT_INFLATION),
            inflation_volatility: rate(
                record.inflation_volatility.as_ref(),
                DEFAULT_INFLATION_VOLATILITY,
            )
            .abs(),
        },
        ltc: ltc_inputs(record.ltc.as_ref()),
        iterations: parse_number(record.iterations.as_ref())
            .filter(|n| *n >= 1.0)
            .map(|n| n.round() as u32)
            .unwrap_or(DEFAULT_ITERATIONS),
        seed: parse_number(record.seed.as_ref())
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64)
            .unwrap_or(DEFAULT_SEED),
        keep_ledgers: record.keep_ledgers.unwrap_or(false),
        parallel: record.parallel.unwrap_or(true),
        subject,
        spouse,
    };
    validate(&params)?;
    Ok(params)
}

fn check_person(person: &Person, field: &'static str) -> Result<()> {
    if person.retirement_age < person.current_age {
        return Err(SimulationError::invalid(
            field,
            format!(
                "retirement age {} is before current age {}",
                person.retirement_age, person.current_age
            ),
        ));
    }
    Ok(())
}

fn check_amount(value: f64, field: &'static str) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SimulationError::invalid(field, format!("{value} must be a finite, non-negative amount")));
    }
    Ok(())
}

pub fn validate(params: &SimulationParameters) -> Result<()> {
    check_person(&params.subject, "subject")?;
    if let Some(spouse) = &params.spouse {
        check_person(spouse, "spouse")?;
    }
    if params.iterations == 0 {
        return Err(SimulationError::invalid("iterations", "must be at least 1"));
    }
    if params.iterations > MAX_ITERATIONS {
        return Err(SimulationError::invalid(
            "iterations",
            format!("must be at most {MAX_ITERATIONS}"),
        ));
    }
    check_amount(params.annual_expense, "annualExpense")?;
    for (value, field) in [
        (params.balances.taxable, "balances.taxable"),
        (params.balances.tax_deferred, "balances.taxDeferred"),
        (params.balances.tax_free, "balances.taxFree"),
        (params.balances.hsa, "balances.hsa"),
    ] {
        check_amount(value, field)?;
    }
    let market = &params.market;
    if !market.expected_return.is_finite() || market.expected_return <= -1.0 {
        return Err(SimulationError::invalid("market.expectedReturn", "must be above -100%"));
    }
    check_amount(market.volatility, "market.volatility")?;
    check_amount(market.inflation_volatility, "market.inflationVolatility")?;
    if !market.inflation_mean.is_finite() || market.inflation_mean <= -1.0 {
        return Err(SimulationError::invalid("market.inflationMean", "must be above -100%"));
    }
    if let Some(p) = params.ltc.lifetime_probability_override {
        if !(0.0..=1.0).contains(&p) {
            return Err(SimulationError::invalid(
                "ltc.lifetimeProbabilityOverride",
                format!("{p} is outside [0, 1]"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn record(value: Value) -> FinancialRecord {
        serde_json::from_value(value).expect("record deserializes")
    }

    #[test]
    fn empty_record_takes_documented_defaults() {
        let params = normalize(&FinancialRecord::default()).expect("defaults are valid");
        assert_eq!(params.subject.current_age, DEFAULT_CURRENT_AGE);
        assert_eq!(params.subject.retirement_age, DEFAULT_RETIREMENT_AGE);
        assert_eq!(params.subject.life_expectancy, DEFAULT_LIFE_EXPECTANCY);
        assert_eq!(params.annual_expense, 132_000.0);
        assert_eq!(params.market.inflation_mean, DEFAULT_INFLATION);
        assert_eq!(params.iterations, DEFAULT_ITERATIONS);
        assert_eq!(params.jurisdiction, "US");
        assert_eq!(params.filing_status, FilingStatus::Single);
        assert_eq!(params.ltc.strategy, DEFAULT_LTC_STRATEGY);
        assert!(params.parallel);
    }

    #[test]
    fn numeric_strings_and_percentages_are_understood() {
        assert_eq!(parse_number(Some(&json!("$1,200"))), Some(1_200.0));
        assert_eq!(parse_number(Some(&json!(" 42 "))), Some(42.0));
        assert_eq!(parse_number(Some(&json!("n/a"))), None);
        assert_eq!(parse_number(Some(&json!(true))), None);
        assert_close(parse_rate(Some(&json!("7%"))).unwrap(), 0.07, 1e-6);
        assert_close(parse_rate(Some(&json!(7))).unwrap(), 0.07, 1e-6);
        assert_close(parse_rate(Some(&json!(0.07))).unwrap(), 0.07, 1e-6);
        assert_close(parse_rate(Some(&json!("0.5%"))).unwrap(), 0.005, 1e-6);
    }

    #[test]
    fn non_numeric_fields_fall_back_instead_of_failing() {
        let params = normalize(&record(json!({
            "age": "unknown",
            "monthlyExpense": "lots",
            "expectedReturn": null,
        })))
        .expect("fallbacks");
        assert_eq!(params.subject.current_age, DEFAULT_CURRENT_AGE);
        assert_eq!(params.annual_expense, DEFAULT_MONTHLY_EXPENSE * 12.0);
        assert_eq!(params.market.expected_return, DEFAULT_EXPECTED_RETURN);
    }

    #[test]
    fn accounts_land_in_exactly_one_bucket() {
        assert_eq!(classify_account("401(k)"), BucketKind::TaxDeferred);
        assert_eq!(classify_account("403b"), BucketKind::TaxDeferred);
        assert_eq!(classify_account("Traditional IRA"), BucketKind::TaxDeferred);
        assert_eq!(classify_account("SEP-IRA"), BucketKind::TaxDeferred);
        assert_eq!(classify_account("SIMPLE IRA"), BucketKind::TaxDeferred);
        assert_eq!(classify_account("Roth IRA"), BucketKind::TaxFree);
        assert_eq!(classify_account("roth 401k"), BucketKind::TaxFree);
        assert_eq!(classify_account("HSA"), BucketKind::Hsa);
        assert_eq!(classify_account("Health Savings Account"), BucketKind::Hsa);
        assert_eq!(classify_account("cash savings"), BucketKind::Taxable);
        assert_eq!(classify_account("Brokerage"), BucketKind::Taxable);
        assert_eq!(classify_account("CD"), BucketKind::Taxable);
        assert_eq!(classify_account("crypto wallet"), BucketKind::Taxable);

        let params = normalize(&record(json!({
            "accounts": [
                {"type": "401k", "balance": "$300,000"},
                {"accountType": "Roth IRA", "balance": 100000},
                {"type": "brokerage", "balance": 60000},
                {"type": "cash", "balance": 40000},
                {"type": "hsa", "balance": 8000},
            ]
        })))
        .expect("valid");
        assert_eq!(params.balances.tax_deferred, 300_000.0);
        assert_eq!(params.balances.tax_free, 100_000.0);
        assert_eq!(params.balances.taxable, 100_000.0);
        assert_eq!(params.balances.hsa, 8_000.0);
    }

    #[test]
    fn negative_age_is_rejected() {
        let err = normalize(&record(json!({"age": -3}))).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidParameter { field: "age", .. }));
    }

    #[test]
    fn retirement_before_current_age_is_rejected() {
        let err = normalize(&record(json!({"age": 60, "retirementAge": 55}))).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::InvalidParameter {
                field: "retirementAge",
                ..
            }
        ));
        let spouse = normalize(&record(json!({
            "age": 50,
            "spouse": {"age": 52, "retirementAge": 51}
        })));
        assert!(spouse.is_err());
    }

    #[test]
    fn older_than_default_retirement_age_retires_now() {
        let params = normalize(&record(json!({"age": 70}))).expect("valid");
        assert_eq!(params.subject.retirement_age, 70);
    }

    #[test]
    fn spouse_has_independent_claim_age_and_implies_joint_filing() {
        let params = normalize(&record(json!({
            "age": 60,
            "socialSecurity": 30000,
            "socialSecurityClaimAge": 70,
            "spouse": {"age": 58, "socialSecurity": "18,000", "socialSecurityClaimAge": 62}
        })))
        .expect("valid");
        let spouse = params.spouse.as_ref().expect("spouse");
        assert_eq!(params.filing_status, FilingStatus::MarriedJoint);
        assert_eq!(params.subject.income.social_security_claim_age, 70);
        assert_eq!(spouse.income.social_security_claim_age, 62);
        assert_eq!(spouse.income.social_security_annual, 18_000.0);
        assert_eq!(params.savings.earners, 2);
    }

    #[test]
    fn undifferentiated_savings_split_across_accounts() {
        let params = normalize(&record(json!({"annualSavings": 30000}))).expect("valid");
        assert_close(params.savings.employer_plan, 10_500.0, 1e-6);
        assert_close(params.savings.traditional_ira, 10_500.0, 1e-6);
        assert_close(params.savings.brokerage, 9_000.0, 1e-6);
        assert_eq!(params.savings.roth_ira, 0.0);

        let explicit = normalize(&record(json!({
            "annualSavings": 30000,
            "rothContribution": 7000
        })))
        .expect("valid");
        assert_eq!(explicit.savings.roth_ira, 7_000.0);
        assert_eq!(explicit.savings.employer_plan, 0.0);
    }

    #[test]
    fn ltc_record_is_mapped() {
        let params = normalize(&record(json!({
            "state": "ny",
            "ltc": {
                "strategy": "single-event",
                "gender": "male",
                "health": "poor",
                "lifetimeProbability": "100%",
                "policy": {"dailyBenefit": 200, "inflationRider": "compound", "annualPremium": "$2,400"}
            }
        })))
        .expect("valid");
        assert_eq!(params.jurisdiction, "NY");
        assert_eq!(params.ltc.strategy, LtcStrategy::SingleEvent);
        assert_eq!(params.ltc.gender, Gender::Male);
        assert_eq!(params.ltc.health, HealthStatus::Poor);
        assert_eq!(params.ltc.lifetime_probability_override, Some(1.0));
        let policy = params.ltc.policy.expect("policy");
        assert_eq!(policy.elimination_days, DEFAULT_ELIMINATION_DAYS);
        assert_eq!(policy.inflation_rider, InflationRider::Compound3);
        assert_eq!(policy.annual_premium, 2_400.0);
        assert!(policy.tax_qualified);
    }

    #[test]
    fn oversized_iteration_counts_are_rejected() {
        for iterations in [json!(4e12), json!("150,000")] {
            let record: FinancialRecord =
                serde_json::from_value(json!({ "iterations": iterations })).expect("parses");
            let err = normalize(&record).expect_err("too many iterations");
            assert!(
                matches!(err, SimulationError::InvalidParameter { field: "iterations", .. }),
                "{err:?}"
            );
        }
        let record: FinancialRecord =
            serde_json::from_value(json!({ "iterations": 100000 })).expect("parses");
        assert_eq!(normalize(&record).expect("at the cap").iterations, MAX_ITERATIONS);
    }

    #[test]
    fn validate_catches_hand_built_problems() {
        let mut params = normalize(&FinancialRecord::default()).expect("valid");
        params.iterations = 0;
        assert!(validate(&params).is_err());
        params.iterations = MAX_ITERATIONS + 1;
        assert!(validate(&params).is_err());
        params.iterations = MAX_ITERATIONS;
        assert!(validate(&params).is_ok());
        params.balances.taxable = f64::NAN;
        assert!(validate(&params).is_err());
        params.balances.taxable = 0.0;
        params.ltc.lifetime_probability_override = Some(1.5);
        assert!(validate(&params).is_err());
    }
}
