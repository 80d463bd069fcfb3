use super::jurisdiction::Jurisdiction;
use super::types::{FilingStatus, Person};

pub const RMD_START_AGE: u32 = 73;

pub const UNIFORM_LIFETIME_TABLE: [(u32, f64); 29] = [
    (72, 27.4),
    (73, 26.5),
    (74, 25.5),
    (75, 24.6),
    (76, 23.7),
    (77, 22.9),
    (78, 22.0),
    (79, 21.1),
    (80, 20.2),
    (81, 19.4),
    (82, 18.5),
    (83, 17.7),
    (84, 16.8),
    (85, 16.0),
    (86, 15.2),
    (87, 14.4),
    (88, 13.7),
    (89, 12.9),
    (90, 12.2),
    (91, 11.5),
    (92, 10.8),
    (93, 10.1),
    (94, 9.5),
    (95, 8.9),
    (96, 8.4),
    (97, 7.8),
    (98, 7.3),
    (99, 6.8),
    (100, 6.4),
];

// (upper bound of bracket, marginal rate), 2024 ordinary income.
const SINGLE_BRACKETS: [(f64, f64); 7] = [
    (11_600.0, 0.10),
    (47_150.0, 0.12),
    (100_525.0, 0.22),
    (191_950.0, 0.24),
    (243_725.0, 0.32),
    (609_350.0, 0.35),
    (f64::INFINITY, 0.37),
];

const MARRIED_BRACKETS: [(f64, f64); 7] = [
    (23_200.0, 0.10),
    (94_300.0, 0.12),
    (201_050.0, 0.22),
    (383_900.0, 0.24),
    (487_450.0, 0.32),
    (731_200.0, 0.35),
    (f64::INFINITY, 0.37),
];

const SINGLE_STANDARD_DEDUCTION: f64 = 14_600.0;
const MARRIED_STANDARD_DEDUCTION: f64 = 29_200.0;
const SINGLE_SENIOR_ADD_ON: f64 = 1_950.0;
const MARRIED_SENIOR_ADD_ON: f64 = 1_550.0;
const SENIOR_AGE: u32 = 65;

pub const SS_THRESHOLDS_SINGLE: (f64, f64) = (25_000.0, 34_000.0);
pub const SS_THRESHOLDS_MARRIED: (f64, f64) = (32_000.0, 44_000.0);

pub const PART_TIME_DECAY_START_AGE: u32 = 65;
pub const PART_TIME_DECAY_PER_YEAR: f64 = 0.10;

// Brokerage sales: assumed share of proceeds that is gain, and its tax rate.
pub const BROKERAGE_GAIN_SHARE: f64 = 0.5;
pub const LONG_TERM_GAINS_RATE: f64 = 0.15;

pub const GROSS_UP_MAX_ITERATIONS: u32 = 3;
pub const GROSS_UP_TOLERANCE: f64 = 1.0;

#[derive(Copy, Clone, Debug)]
pub struct TaxContext<'a> {
    pub filing_status: FilingStatus,
    pub jurisdiction: &'a Jurisdiction,
    pub seniors: u32,
}

impl TaxContext<'_> {
    fn standard_deduction(&self) -> f64 {
        match self.filing_status {
            FilingStatus::Single => {
                SINGLE_STANDARD_DEDUCTION + SINGLE_SENIOR_ADD_ON * self.seniors.min(1) as f64
            }
            FilingStatus::MarriedJoint => {
                MARRIED_STANDARD_DEDUCTION + MARRIED_SENIOR_ADD_ON * self.seniors.min(2) as f64
            }
        }
    }

    fn brackets(&self) -> &'static [(f64, f64)] {
        match self.filing_status {
            FilingStatus::Single => &SINGLE_BRACKETS,
            FilingStatus::MarriedJoint => &MARRIED_BRACKETS,
        }
    }
}

pub fn seniors(ages: &[u32]) -> u32 {
    ages.iter().filter(|age| **age >= SENIOR_AGE).count() as u32
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GuaranteedIncome {
    pub social_security: f64,
    pub pension: f64,
    pub part_time: f64,
    pub annuity: f64,
}

impl GuaranteedIncome {
    pub fn total(&self) -> f64 {
        self.social_security + self.pension + self.part_time + self.annuity
    }

    pub fn ordinary(&self) -> f64 {
        self.pension + self.part_time + self.annuity
    }

    pub fn combine(self, other: GuaranteedIncome) -> GuaranteedIncome {
        GuaranteedIncome {
            social_security: self.social_security + other.social_security,
            pension: self.pension + other.pension,
            part_time: self.part_time + other.part_time,
            annuity: self.annuity + other.annuity,
        }
    }
}

/// Nominal streams (pension, annuities) are deflated by `price_index`.
pub fn guaranteed_income(person: &Person, age: u32, price_index: f64) -> GuaranteedIncome {
    let streams = &person.income;
    let deflator = price_index.max(1e-9);

    let social_security = if age >= streams.social_security_claim_age {
        streams.social_security_annual.max(0.0)
    } else {
        0.0
    };
    let pension = if age >= streams.pension_start_age && age >= person.retirement_age {
        streams.pension_annual.max(0.0) / deflator
    } else {
        0.0
    };
    let part_time = if age >= person.retirement_age {
        streams.part_time_annual.max(0.0) * part_time_factor(age)
    } else {
        0.0
    };
    let annuity = streams
        .annuities
        .iter()
        .filter(|a| age >= a.start_age)
        .map(|a| a.annual_payout.max(0.0))
        .sum::<f64>()
        / deflator;

    GuaranteedIncome {
        social_security,
        pension,
        part_time,
        annuity,
    }
}

pub fn part_time_factor(age: u32) -> f64 {
    let years_past = age.saturating_sub(PART_TIME_DECAY_START_AGE) as f64;
    (1.0 - PART_TIME_DECAY_PER_YEAR * years_past).clamp(0.0, 1.0)
}

pub fn taxable_social_security(benefits: f64, other_income: f64, status: FilingStatus) -> f64 {
    if benefits <= 0.0 {
        return 0.0;
    }
    let (base, adjusted) = match status {
        FilingStatus::Single => SS_THRESHOLDS_SINGLE,
        FilingStatus::MarriedJoint => SS_THRESHOLDS_MARRIED,
    };
    let provisional = other_income.max(0.0) + 0.5 * benefits;

    if provisional <= base {
        0.0
    } else if provisional <= adjusted {
        (0.5 * (provisional - base)).min(0.5 * benefits)
    } else {
        let tier_one = (0.5 * (adjusted - base)).min(0.5 * benefits);
        (0.85 * (provisional - adjusted) + tier_one).min(0.85 * benefits)
    }
}

pub fn rmd_divisor(age: u32) -> f64 {
    let first = UNIFORM_LIFETIME_TABLE[0];
    let last = UNIFORM_LIFETIME_TABLE[UNIFORM_LIFETIME_TABLE.len() - 1];
    let clamped = age.clamp(first.0, last.0);
    UNIFORM_LIFETIME_TABLE[(clamped - first.0) as usize].1
}

pub fn required_minimum_distribution(age: u32, tax_deferred_balance: f64) -> f64 {
    if age < RMD_START_AGE || tax_deferred_balance <= 0.0 {
        return 0.0;
    }
    tax_deferred_balance / rmd_divisor(age)
}

fn bracket_tax(taxable: f64, brackets: &[(f64, f64)]) -> f64 {
    let mut tax = 0.0;
    let mut lower = 0.0;
    for &(upper, rate) in brackets {
        if taxable <= lower {
            break;
        }
        tax += (taxable.min(upper) - lower) * rate;
        lower = upper;
    }
    tax
}

pub fn federal_income_tax(ctx: &TaxContext<'_>, ordinary_income: f64) -> f64 {
    let taxable = (ordinary_income - ctx.standard_deduction()).max(0.0);
    bracket_tax(taxable, ctx.brackets())
}

pub fn state_income_tax(ctx: &TaxContext<'_>, state_taxable_income: f64) -> f64 {
    let taxable = (state_taxable_income - ctx.standard_deduction()).max(0.0);
    taxable * ctx.jurisdiction.income_tax_rate
}

pub fn effective_tax_rate(ctx: &TaxContext<'_>, taxable_income: f64) -> f64 {
    if taxable_income <= 0.0 {
        return 0.0;
    }
    (federal_income_tax(ctx, taxable_income) + state_income_tax(ctx, taxable_income))
        / taxable_income
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct YearTaxProfile {
    pub ordinary_income: f64,
    pub social_security: f64,
    pub deductions: f64,
}

impl YearTaxProfile {
    pub fn total_tax(&self, ctx: &TaxContext<'_>, extra_ordinary: f64) -> f64 {
        let ordinary = (self.ordinary_income + extra_ordinary.max(0.0) - self.deductions).max(0.0);
        let ss_taxable = taxable_social_security(
            self.social_security,
            ordinary,
            ctx.filing_status,
        );
        let federal = federal_income_tax(ctx, ordinary + ss_taxable);
        let state_base = if ctx.jurisdiction.taxes_social_security {
            ordinary + ss_taxable
        } else {
            ordinary
        };
        federal + state_income_tax(ctx, state_base)
    }

    pub fn incremental_tax(&self, ctx: &TaxContext<'_>, already: f64, additional: f64) -> f64 {
        (self.total_tax(ctx, already + additional) - self.total_tax(ctx, already)).max(0.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GrossUp {
    pub gross: f64,
    pub tax: f64,
    pub iterations: u32,
    pub converged: bool,
}

/// Resolves the tax-deferred withdrawal that nets `net_need` after tax, given that
/// `already_withdrawn` of ordinary income was taken earlier in the year.
///
/// Bounded fixed point: gross starts at the net need and is inflated by the incremental
/// tax at the new cumulative income, at most `GROSS_UP_MAX_ITERATIONS` times. If the
/// budget runs out the last estimate stands.
pub fn gross_up_withdrawal(
    ctx: &TaxContext<'_>,
    profile: &YearTaxProfile,
    already_withdrawn: f64,
    net_need: f64,
) -> GrossUp {
    if net_need <= 0.0 {
        return GrossUp {
            gross: 0.0,
            tax: 0.0,
            iterations: 0,
            converged: true,
        };
    }

    let mut gross = net_need;
    for iteration in 1..=GROSS_UP_MAX_ITERATIONS {
        let tax = profile.incremental_tax(ctx, already_withdrawn, gross);
        let next = net_need + tax;
        if (next - gross).abs() <= GROSS_UP_TOLERANCE {
            return GrossUp {
                gross: next,
                tax,
                iterations: iteration,
                converged: true,
            };
        }
        gross = next;
    }

    log::debug!(
        "gross-up for net {net_need:.0} did not converge in {GROSS_UP_MAX_ITERATIONS} rounds; using {gross:.0}"
    );
    GrossUp {
        gross,
        tax: profile.incremental_tax(ctx, already_withdrawn, gross),
        iterations: GROSS_UP_MAX_ITERATIONS,
        converged: false,
    }
}

pub fn brokerage_sale_tax(gross: f64) -> f64 {
    gross.max(0.0) * BROKERAGE_GAIN_SHARE * LONG_TERM_GAINS_RATE
}

pub fn brokerage_gross_for_net(net: f64) -> f64 {
    net.max(0.0) / (1.0 - BROKERAGE_GAIN_SHARE * LONG_TERM_GAINS_RATE)
}
