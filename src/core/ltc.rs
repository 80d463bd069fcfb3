use rand::Rng;
use serde::Serialize;

use super::jurisdiction::Jurisdiction;
use super::market::standard_normal;
use super::types::{Gender, HealthStatus, InflationRider, InsurancePolicy, LtcInputs, LtcStrategy};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LtcState {
    Healthy,
    NeedsAssistance,
    HomeCare,
    AssistedLiving,
    NursingHome,
    Deceased,
}

impl LtcState {
    pub const ALL: [LtcState; 6] = [
        LtcState::Healthy,
        LtcState::NeedsAssistance,
        LtcState::HomeCare,
        LtcState::AssistedLiving,
        LtcState::NursingHome,
        LtcState::Deceased,
    ];

    pub fn in_care(self) -> bool {
        matches!(
            self,
            LtcState::NeedsAssistance
                | LtcState::HomeCare
                | LtcState::AssistedLiving
                | LtcState::NursingHome
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            LtcState::Healthy => "healthy",
            LtcState::NeedsAssistance => "needs-assistance",
            LtcState::HomeCare => "home-care",
            LtcState::AssistedLiving => "assisted-living",
            LtcState::NursingHome => "nursing-home",
            LtcState::Deceased => "deceased",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CareSetting {
    HomeHealthAide,
    Homemaker,
    AdultDayHealth,
    AssistedLiving,
    NursingHomeSemiPrivate,
    NursingHomePrivate,
}

impl CareSetting {
    pub fn base_annual_cost(self) -> f64 {
        match self {
            CareSetting::HomeHealthAide => 75_504.0,
            CareSetting::Homemaker => 68_640.0,
            CareSetting::AdultDayHealth => 22_100.0,
            CareSetting::AssistedLiving => 64_200.0,
            CareSetting::NursingHomeSemiPrivate => 104_025.0,
            CareSetting::NursingHomePrivate => 116_800.0,
        }
    }

    /// Residential settings bill every calendar day; the others five days a week.
    pub fn full_time(self) -> bool {
        matches!(
            self,
            CareSetting::AssistedLiving
                | CareSetting::NursingHomeSemiPrivate
                | CareSetting::NursingHomePrivate
        )
    }
}

pub const DAYS_PER_YEAR: f64 = 365.0;
const SERVICE_DAYS_PER_WEEK: f64 = 5.0;
const CALENDAR_DAYS_PER_WEEK: f64 = 7.0;

pub const LTC_EXCESS_INFLATION: f64 = 0.01;
pub const COST_DISPERSION: f64 = 0.10;

pub const QUALIFIED_PER_DIEM_CAP: f64 = 420.0;

// (maximum age in band, deductible premium limit).
pub const PREMIUM_DEDUCTION_LIMITS: [(u32, f64); 5] = [
    (40, 480.0),
    (50, 890.0),
    (60, 1_790.0),
    (70, 4_770.0),
    (u32::MAX, 5_960.0),
];

pub const COMPOUND_RIDER_RATE: f64 = 0.03;
pub const SIMPLE_RIDER_RATE: f64 = 0.05;
pub const CPI_RIDER_RATE: f64 = 0.025;

// Per-year walk tables. Age bands: <65, 65-74, 75-84, 85+.
const AGE_BAND_FLOORS: [u32; 3] = [65, 75, 85];
const ONSET_HAZARD: [f64; 4] = [0.001, 0.006, 0.02, 0.05];
// How a new onset splits across needs-assistance, home care, assisted living, nursing home.
const ONSET_SPLIT: [f64; 4] = [0.45, 0.30, 0.15, 0.10];
const HEALTHY_MORTALITY: [f64; 4] = [0.006, 0.015, 0.045, 0.13];
// Insured people move into paid home care and assisted living more readily.
const INSURED_FORMAL_CARE_FACTOR: f64 = 1.15;

const NURSING_HOME_MORTALITY_FLOOR: f64 = 0.10;
const NURSING_HOME_MORTALITY_STEP: f64 = 0.02;
const NURSING_HOME_MORTALITY_CAP: f64 = 0.30;
const NURSING_HOME_MORTALITY_PIVOT_AGE: u32 = 80;

// Single-event tables.
pub const SINGLE_EVENT_MIN_ONSET_AGE: u32 = 75;
const SINGLE_EVENT_ONSET_SPAN: u32 = 20;
const LIFETIME_INCIDENCE_FEMALE: [f64; 4] = [0.52, 0.50, 0.46, 0.40];
const LIFETIME_INCIDENCE_MALE: [f64; 4] = [0.44, 0.42, 0.38, 0.32];
pub const MAX_LIFETIME_INCIDENCE: f64 = 0.95;
const MEAN_DURATION_FEMALE: f64 = 3.7;
const MEAN_DURATION_MALE: f64 = 2.2;
const DURATION_MULTIPLIER_RANGE: (f64, f64) = (0.5, 1.5);
const SINGLE_EVENT_LEVEL_WEIGHTS: [f64; 3] = [0.40, 0.25, 0.35];
const HOME_HEALTH_AIDE_SHARE: f64 = 0.7;

fn age_band(age: u32) -> usize {
    AGE_BAND_FLOORS.iter().filter(|floor| age >= **floor).count()
}

pub fn walk_health_multiplier(health: HealthStatus) -> f64 {
    match health {
        HealthStatus::Excellent => 0.6,
        HealthStatus::Good => 0.9,
        HealthStatus::Fair => 1.25,
        HealthStatus::Poor => 1.8,
    }
}

pub fn single_event_health_multiplier(health: HealthStatus) -> f64 {
    match health {
        HealthStatus::Excellent => 0.5,
        HealthStatus::Good => 0.85,
        HealthStatus::Fair => 1.3,
        HealthStatus::Poor => 2.0,
    }
}

pub fn nursing_home_mortality(age: u32) -> f64 {
    let years_past = age.saturating_sub(NURSING_HOME_MORTALITY_PIVOT_AGE) as f64;
    (NURSING_HOME_MORTALITY_FLOOR + NURSING_HOME_MORTALITY_STEP * years_past)
        .clamp(NURSING_HOME_MORTALITY_FLOOR, NURSING_HOME_MORTALITY_CAP)
}

/// Next-year probabilities in `LtcState::ALL` order. Staying put absorbs the remainder.
pub fn transition_row(
    state: LtcState,
    age: u32,
    insured: bool,
    onset_multiplier: f64,
) -> [f64; 6] {
    let band = age_band(age);
    let mortality = HEALTHY_MORTALITY[band];
    let formal = if insured {
        INSURED_FORMAL_CARE_FACTOR
    } else {
        1.0
    };

    // healthy, needs-assistance, home care, assisted living, nursing home, deceased
    let mut row = match state {
        LtcState::Healthy => {
            let onset = ONSET_HAZARD[band] * onset_multiplier.max(0.0);
            [
                0.0,
                onset * ONSET_SPLIT[0],
                onset * ONSET_SPLIT[1] * formal,
                onset * ONSET_SPLIT[2] * formal,
                onset * ONSET_SPLIT[3],
                mortality,
            ]
        }
        LtcState::NeedsAssistance => [
            0.15,
            0.0,
            0.20 * formal,
            0.08 * formal,
            0.04,
            mortality * 1.5,
        ],
        LtcState::HomeCare => [0.08, 0.05, 0.0, 0.12 * formal, 0.10, mortality * 2.0],
        LtcState::AssistedLiving => [
            0.0,
            0.0,
            0.04,
            0.0,
            0.18,
            (mortality * 2.5).max(NURSING_HOME_MORTALITY_FLOOR),
        ],
        LtcState::NursingHome => [0.0, 0.0, 0.0, 0.03, 0.0, nursing_home_mortality(age)],
        LtcState::Deceased => [0.0; 6],
    };

    let moving: f64 = row.iter().sum();
    if moving > 1.0 {
        for p in &mut row {
            *p /= moving;
        }
    }
    let stay = (1.0 - row.iter().sum::<f64>()).max(0.0);
    row[state_index(state)] += stay;
    row
}

fn state_index(state: LtcState) -> usize {
    LtcState::ALL
        .iter()
        .position(|s| *s == state)
        .unwrap_or(0)
}

fn sample_index<R: Rng>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0;
    }
    let mut u = rng.gen_range(0.0..total);
    for (idx, w) in weights.iter().enumerate() {
        if u < *w {
            return idx;
        }
        u -= *w;
    }
    weights.len() - 1
}

fn sample_onset_state<R: Rng>(insured: bool, rng: &mut R) -> LtcState {
    let formal = if insured {
        INSURED_FORMAL_CARE_FACTOR
    } else {
        1.0
    };
    let weights = [
        ONSET_SPLIT[0],
        ONSET_SPLIT[1] * formal,
        ONSET_SPLIT[2] * formal,
        ONSET_SPLIT[3],
    ];
    [
        LtcState::NeedsAssistance,
        LtcState::HomeCare,
        LtcState::AssistedLiving,
        LtcState::NursingHome,
    ][sample_index(&weights, rng)]
}

/// Onset age for a forced or sampled episode: at least 75, inside the simulated window
/// when the window reaches 75. Returns `None` when the window ends before 75 and the
/// episode is not forced.
fn sample_onset_age<R: Rng>(start_age: u32, last_age: u32, forced: bool, rng: &mut R) -> Option<u32> {
    let earliest = start_age.max(SINGLE_EVENT_MIN_ONSET_AGE);
    if earliest > last_age {
        return forced.then_some(last_age);
    }
    let latest = last_age.min(earliest + SINGLE_EVENT_ONSET_SPAN);
    Some(rng.gen_range(earliest..=latest))
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CareYear {
    pub state: LtcState,
    pub fraction: f64,
    pub days_into_episode: f64,
}

impl CareYear {
    fn idle(state: LtcState) -> Self {
        Self {
            state,
            fraction: 0.0,
            days_into_episode: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct YearlyWalk {
    state: LtcState,
    insured: bool,
    onset_multiplier: f64,
    /// With a forced lifetime probability the first onset is decided up front.
    forced_onset: Option<Option<u32>>,
    episode_years: u32,
}

impl YearlyWalk {
    fn advance<R: Rng>(&mut self, age: u32, rng: &mut R) -> CareYear {
        let previous = self.state;
        self.state = match (previous, self.forced_onset) {
            (LtcState::Healthy, Some(None)) => LtcState::Healthy,
            (LtcState::Healthy, Some(Some(onset))) if age >= onset => {
                // Only the first episode is forced.
                self.forced_onset = None;
                sample_onset_state(self.insured, rng)
            }
            (LtcState::Healthy, Some(_)) => LtcState::Healthy,
            (LtcState::Deceased, _) => LtcState::Deceased,
            (state, _) => {
                let row = transition_row(state, age, self.insured, self.onset_multiplier);
                LtcState::ALL[sample_index(&row, rng)]
            }
        };

        if self.state.in_care() {
            let days_into_episode = if previous.in_care() {
                self.episode_years as f64 * DAYS_PER_YEAR
            } else {
                self.episode_years = 0;
                0.0
            };
            self.episode_years += 1;
            CareYear {
                state: self.state,
                fraction: 1.0,
                days_into_episode,
            }
        } else {
            self.episode_years = 0;
            CareYear::idle(self.state)
        }
    }
}

#[derive(Clone, Debug)]
pub struct SingleEpisode {
    onset_age: Option<u32>,
    duration_years: f64,
    level: LtcState,
}

impl SingleEpisode {
    pub fn onset_age(&self) -> Option<u32> {
        self.onset_age
    }

    pub fn duration_years(&self) -> f64 {
        self.duration_years
    }

    fn advance(&self, age: u32) -> CareYear {
        let Some(onset) = self.onset_age else {
            return CareYear::idle(LtcState::Healthy);
        };
        let start = onset as f64;
        let end = start + self.duration_years;
        let year_start = age as f64;
        let year_end = year_start + 1.0;

        if year_end <= start {
            return CareYear::idle(LtcState::Healthy);
        }
        if year_start >= end {
            return CareYear::idle(LtcState::Deceased);
        }
        let overlap = year_end.min(end) - year_start.max(start);
        CareYear {
            state: self.level,
            fraction: overlap.clamp(0.0, 1.0),
            days_into_episode: (year_start - start).max(0.0) * DAYS_PER_YEAR,
        }
    }
}

pub fn single_event_incidence(gender: Gender, health: HealthStatus, start_age: u32) -> f64 {
    let table = match gender {
        Gender::Female => &LIFETIME_INCIDENCE_FEMALE,
        Gender::Male => &LIFETIME_INCIDENCE_MALE,
    };
    (table[age_band(start_age)] * single_event_health_multiplier(health))
        .min(MAX_LIFETIME_INCIDENCE)
}

pub fn mean_episode_years(gender: Gender) -> f64 {
    match gender {
        Gender::Female => MEAN_DURATION_FEMALE,
        Gender::Male => MEAN_DURATION_MALE,
    }
}

#[derive(Clone, Debug)]
pub enum CarePath {
    Disabled,
    Walk(YearlyWalk),
    SingleEvent(SingleEpisode),
}

impl CarePath {
    pub fn new<R: Rng>(inputs: &LtcInputs, start_age: u32, last_age: u32, rng: &mut R) -> Self {
        let insured = inputs.policy.is_some();
        let forced = inputs
            .lifetime_probability_override
            .map(|p| p.clamp(0.0, 1.0));

        match inputs.strategy {
            LtcStrategy::Disabled => CarePath::Disabled,
            LtcStrategy::PerYearWalk => {
                let forced_onset = forced.map(|p| {
                    if rng.gen_bool(p) {
                        sample_onset_age(start_age, last_age, true, rng)
                    } else {
                        None
                    }
                });
                CarePath::Walk(YearlyWalk {
                    state: LtcState::Healthy,
                    insured,
                    onset_multiplier: walk_health_multiplier(inputs.health),
                    forced_onset,
                    episode_years: 0,
                })
            }
            LtcStrategy::SingleEvent => {
                let probability = forced.unwrap_or_else(|| {
                    single_event_incidence(inputs.gender, inputs.health, start_age)
                });
                let onset_age = if rng.gen_bool(probability) {
                    sample_onset_age(start_age, last_age, forced.is_some(), rng)
                } else {
                    None
                };
                let (lo, hi) = DURATION_MULTIPLIER_RANGE;
                let duration_years = mean_episode_years(inputs.gender) * rng.gen_range(lo..=hi);
                let level = [
                    LtcState::HomeCare,
                    LtcState::AssistedLiving,
                    LtcState::NursingHome,
                ][sample_index(&SINGLE_EVENT_LEVEL_WEIGHTS, rng)];
                CarePath::SingleEvent(SingleEpisode {
                    onset_age,
                    duration_years,
                    level,
                })
            }
        }
    }

    pub fn advance<R: Rng>(&mut self, age: u32, rng: &mut R) -> CareYear {
        match self {
            CarePath::Disabled => CareYear::idle(LtcState::Healthy),
            CarePath::Walk(walk) => walk.advance(age, rng),
            CarePath::SingleEvent(episode) => episode.advance(age),
        }
    }
}

pub fn annual_cost(setting: CareSetting, jurisdiction: &Jurisdiction, years: u32) -> f64 {
    setting.base_annual_cost()
        * jurisdiction.ltc_cost_index
        * (1.0 + LTC_EXCESS_INFLATION).powi(years as i32)
}

pub fn rider_daily_benefit(policy: &InsurancePolicy, years: u32) -> f64 {
    let t = years as f64;
    let daily = policy.daily_benefit.max(0.0);
    match policy.inflation_rider {
        InflationRider::None => daily,
        InflationRider::Compound3 => daily * (1.0 + COMPOUND_RIDER_RATE).powf(t),
        InflationRider::Simple5 => daily * (1.0 + SIMPLE_RIDER_RATE * t),
        InflationRider::Cpi => daily * (1.0 + CPI_RIDER_RATE).powf(t),
    }
}

fn pool_growth_rate(rider: InflationRider) -> f64 {
    match rider {
        InflationRider::Compound3 => COMPOUND_RIDER_RATE,
        InflationRider::Cpi => CPI_RIDER_RATE,
        InflationRider::None | InflationRider::Simple5 => 0.0,
    }
}

pub fn premium_deduction_limit(age: u32) -> f64 {
    PREMIUM_DEDUCTION_LIMITS
        .iter()
        .find(|(max_age, _)| age <= *max_age)
        .map(|(_, limit)| *limit)
        .unwrap_or(PREMIUM_DEDUCTION_LIMITS[PREMIUM_DEDUCTION_LIMITS.len() - 1].1)
}

/// Calendar days of elimination to serve; part-time care accrues service days 5 per week.
pub fn elimination_calendar_days(elimination_days: u32, setting: CareSetting) -> f64 {
    let days = elimination_days as f64;
    if setting.full_time() {
        days
    } else {
        days * CALENDAR_DAYS_PER_WEEK / SERVICE_DAYS_PER_WEEK
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BenefitPayment {
    pub benefit: f64,
    pub taxable: f64,
    pub covered_days: f64,
}

/// Tracks what is left of a policy's lifetime pool (nominal dollars).
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyLedger {
    pool_remaining: f64,
    claim_started: bool,
}

impl PolicyLedger {
    pub fn new(policy: &InsurancePolicy) -> Self {
        Self {
            pool_remaining: policy.lifetime_pool(),
            claim_started: false,
        }
    }

    pub fn claim_started(&self) -> bool {
        self.claim_started
    }

    pub fn pay(
        &mut self,
        policy: &InsurancePolicy,
        care: &CareYear,
        setting: CareSetting,
        cost: f64,
        price_index: f64,
        years: u32,
    ) -> BenefitPayment {
        if care.fraction <= 0.0 || cost <= 0.0 || self.pool_remaining <= 0.0 {
            return BenefitPayment::default();
        }

        let elimination = elimination_calendar_days(policy.elimination_days, setting);
        let care_days = care.fraction * DAYS_PER_YEAR;
        let episode_end = care.days_into_episode + care_days;
        if episode_end <= elimination {
            return BenefitPayment::default();
        }
        let covered_days = episode_end - care.days_into_episode.max(elimination);
        let payable_days = if setting.full_time() {
            covered_days
        } else {
            covered_days * SERVICE_DAYS_PER_WEEK / CALENDAR_DAYS_PER_WEEK
        };

        let deflator = price_index.max(1e-9);
        let nominal = (rider_daily_benefit(policy, years) * payable_days)
            .min(self.pool_remaining)
            .min(cost * deflator);
        if nominal <= 0.0 {
            return BenefitPayment::default();
        }
        self.pool_remaining = (self.pool_remaining - nominal).max(0.0);
        self.claim_started = true;

        let benefit = nominal / deflator;
        let taxable = if policy.tax_qualified {
            (benefit - QUALIFIED_PER_DIEM_CAP * covered_days).max(0.0)
        } else {
            benefit
        };
        BenefitPayment {
            benefit,
            taxable,
            covered_days,
        }
    }

    pub fn roll_year(&mut self, policy: &InsurancePolicy) {
        self.pool_remaining *= 1.0 + pool_growth_rate(policy.inflation_rider);
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LtcYear {
    pub state: LtcState,
    pub setting: Option<CareSetting>,
    pub cost: f64,
    pub benefit: f64,
    pub taxable_benefit: f64,
    pub premium: f64,
    pub deductible_premium: f64,
}

impl LtcYear {
    pub fn out_of_pocket(&self) -> f64 {
        (self.cost - self.benefit).max(0.0) + self.premium
    }
}

pub struct LtcProcess<'a> {
    inputs: &'a LtcInputs,
    jurisdiction: &'a Jurisdiction,
    path: CarePath,
    ledger: Option<PolicyLedger>,
    home_setting: CareSetting,
    cost_multiplier: f64,
    had_episode: bool,
}

impl<'a> LtcProcess<'a> {
    pub fn new<P: Rng, C: Rng>(
        inputs: &'a LtcInputs,
        jurisdiction: &'a Jurisdiction,
        start_age: u32,
        last_age: u32,
        path_rng: &mut P,
        cost_rng: &mut C,
    ) -> Self {
        let path = CarePath::new(inputs, start_age, last_age, path_rng);
        let home_setting = if cost_rng.gen_bool(HOME_HEALTH_AIDE_SHARE) {
            CareSetting::HomeHealthAide
        } else {
            CareSetting::Homemaker
        };
        let cost_multiplier = (COST_DISPERSION * standard_normal(cost_rng)
            - 0.5 * COST_DISPERSION * COST_DISPERSION)
            .exp();
        Self {
            inputs,
            jurisdiction,
            path,
            ledger: inputs
                .policy
                .as_ref()
                .filter(|_| inputs.strategy != LtcStrategy::Disabled)
                .map(PolicyLedger::new),
            home_setting,
            cost_multiplier,
            had_episode: false,
        }
    }

    pub fn had_episode(&self) -> bool {
        self.had_episode
    }

    fn setting_for(&self, state: LtcState) -> Option<CareSetting> {
        match state {
            LtcState::NeedsAssistance => Some(CareSetting::AdultDayHealth),
            LtcState::HomeCare => Some(self.home_setting),
            LtcState::AssistedLiving => Some(CareSetting::AssistedLiving),
            LtcState::NursingHome if self.inputs.prefer_private_room => {
                Some(CareSetting::NursingHomePrivate)
            }
            LtcState::NursingHome => Some(CareSetting::NursingHomeSemiPrivate),
            LtcState::Healthy | LtcState::Deceased => None,
        }
    }

    pub fn step<R: Rng>(&mut self, age: u32, years: u32, price_index: f64, path_rng: &mut R) -> LtcYear {
        let care = self.path.advance(age, path_rng);
        let setting = self.setting_for(care.state).filter(|_| care.fraction > 0.0);
        let cost = setting
            .map(|s| annual_cost(s, self.jurisdiction, years) * self.cost_multiplier * care.fraction)
            .unwrap_or(0.0);
        if cost > 0.0 {
            self.had_episode = true;
        }

        let mut year = LtcYear {
            state: care.state,
            setting,
            cost,
            benefit: 0.0,
            taxable_benefit: 0.0,
            premium: 0.0,
            deductible_premium: 0.0,
        };

        let (Some(policy), Some(ledger)) = (self.inputs.policy.as_ref(), self.ledger.as_mut())
        else {
            return year;
        };

        if !ledger.claim_started() && care.state != LtcState::Deceased {
            let deflator = price_index.max(1e-9);
            year.premium = policy.annual_premium.max(0.0) / deflator;
            if policy.tax_qualified {
                year.deductible_premium = year.premium.min(premium_deduction_limit(age));
            }
        }
        if let Some(setting) = setting {
            let payment = ledger.pay(policy, &care, setting, cost, price_index, years);
            year.benefit = payment.benefit;
            year.taxable_benefit = payment.taxable;
        }
        ledger.roll_year(policy);
        year
    }
}
