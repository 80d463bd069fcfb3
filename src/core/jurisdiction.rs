#[derive(Debug, PartialEq)]
pub struct Jurisdiction {
    pub code: &'static str,
    pub ltc_cost_index: f64,
    /// Flat approximation of the state's tax on ordinary retirement income.
    pub income_tax_rate: f64,
    pub taxes_social_security: bool,
}

const fn j(
    code: &'static str,
    ltc_cost_index: f64,
    income_tax_rate: f64,
    taxes_social_security: bool,
) -> Jurisdiction {
    Jurisdiction {
        code,
        ltc_cost_index,
        income_tax_rate,
        taxes_social_security,
    }
}

pub static NATIONAL: Jurisdiction = j("US", 1.0, 0.0, false);

pub static JURISDICTIONS: [Jurisdiction; 51] = [
    j("AL", 0.82, 0.040, false),
    j("AK", 1.62, 0.0, false),
    j("AZ", 0.98, 0.025, false),
    j("AR", 0.80, 0.039, false),
    j("CA", 1.25, 0.060, false),
    j("CO", 1.12, 0.044, true),
    j("CT", 1.34, 0.050, true),
    j("DE", 1.15, 0.052, false),
    j("DC", 1.30, 0.065, false),
    j("FL", 0.97, 0.0, false),
    j("GA", 0.88, 0.0539, false),
    j("HI", 1.38, 0.070, false),
    j("ID", 0.97, 0.058, false),
    j("IL", 1.00, 0.0, false),
    j("IN", 0.94, 0.0305, false),
    j("IA", 0.96, 0.038, false),
    j("KS", 0.90, 0.052, false),
    j("KY", 0.90, 0.040, false),
    j("LA", 0.78, 0.030, false),
    j("ME", 1.18, 0.058, false),
    j("MD", 1.12, 0.0475, false),
    j("MA", 1.35, 0.050, false),
    j("MI", 1.02, 0.0425, false),
    j("MN", 1.17, 0.068, true),
    j("MS", 0.80, 0.047, false),
    j("MO", 0.85, 0.048, false),
    j("MT", 1.00, 0.059, true),
    j("NE", 0.95, 0.0584, false),
    j("NV", 1.05, 0.0, false),
    j("NH", 1.20, 0.0, false),
    j("NJ", 1.25, 0.055, false),
    j("NM", 0.98, 0.049, true),
    j("NY", 1.28, 0.060, false),
    j("NC", 0.94, 0.045, false),
    j("ND", 1.14, 0.025, false),
    j("OH", 0.97, 0.035, false),
    j("OK", 0.84, 0.0475, false),
    j("OR", 1.15, 0.0875, false),
    j("PA", 1.06, 0.0, false),
    j("RI", 1.21, 0.055, true),
    j("SC", 0.90, 0.064, false),
    j("SD", 0.92, 0.0, false),
    j("TN", 0.85, 0.0, false),
    j("TX", 0.86, 0.0, false),
    j("UT", 1.00, 0.0465, true),
    j("VT", 1.22, 0.066, true),
    j("VA", 1.02, 0.0575, false),
    j("WA", 1.24, 0.0, false),
    j("WV", 0.98, 0.048, false),
    j("WI", 1.07, 0.053, false),
    j("WY", 1.00, 0.0, false),
];

pub fn lookup(code: &str) -> &'static Jurisdiction {
    let code = code.trim();
    JURISDICTIONS
        .iter()
        .find(|entry| entry.code.eq_ignore_ascii_case(code))
        .unwrap_or(&NATIONAL)
}

pub fn is_known(code: &str) -> bool {
    !std::ptr::eq(lookup(code), &NATIONAL)
}
