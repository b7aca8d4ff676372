use serde::{Deserialize, Serialize};

use super::account::{AssetAllocation, TaxTreatment};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingStatus {
    Single,
    MarriedJoint,
}

// The engine treats these as stateless oracles: scalar in, scalar out, no
// caching across periods.

pub trait RmdCalculator {
    fn required_distribution(&self, prior_year_end_balance: f64, age: u32) -> f64;
    fn start_age(&self, birth_year: i32) -> u32;
    fn is_subject(&self, treatment: TaxTreatment) -> bool;
}

pub trait SocialSecurityCalculator {
    // Full retirement age, expressed in months of age.
    fn fra_months(&self, birth_year: i32) -> u32;
    fn adjusted_monthly_benefit(&self, benefit_at_fra: f64, claim_age_months: u32, birth_year: i32)
    -> f64;
    fn apply_cola(&self, monthly_benefit: f64, years_since_claim: u32) -> f64;
}

pub trait ReturnCalculator {
    fn blended_annual_rate(&self, allocation: AssetAllocation) -> f64;
    // True annual compounding: a growth multiplier of (1 + annual)^(months/12).
    fn growth_over_months(&self, annual_rate: f64, months: u32) -> f64;
}

pub trait TaxCalculator {
    fn federal_tax(&self, taxable_income: f64, status: FilingStatus) -> f64;
}

// IRS Uniform Lifetime Table distribution periods, ages 72 through 100.
// Ages beyond the table reuse the final factor.
const UNIFORM_LIFETIME: [f64; 29] = [
    27.4, 26.5, 25.5, 24.6, 23.7, 22.9, 22.0, 21.1, 20.2, 19.4, 18.5, 17.7, 16.8, 16.0, 15.2,
    14.5, 13.7, 12.9, 12.2, 11.5, 10.8, 10.1, 9.5, 8.9, 8.4, 7.8, 7.3, 6.8, 6.4,
];

pub struct UniformLifetimeRmd;

impl RmdCalculator for UniformLifetimeRmd {
    fn required_distribution(&self, prior_year_end_balance: f64, age: u32) -> f64 {
        if prior_year_end_balance <= 0.0 || age < 72 {
            return 0.0;
        }
        let index = ((age - 72) as usize).min(UNIFORM_LIFETIME.len() - 1);
        prior_year_end_balance / UNIFORM_LIFETIME[index]
    }

    // SECURE 2.0 schedule.
    fn start_age(&self, birth_year: i32) -> u32 {
        if birth_year <= 1950 {
            72
        } else if birth_year <= 1959 {
            73
        } else {
            75
        }
    }

    fn is_subject(&self, treatment: TaxTreatment) -> bool {
        treatment == TaxTreatment::PreTax
    }
}

pub struct SsaBenefitRules {
    pub annual_cola: f64,
}

impl Default for SsaBenefitRules {
    fn default() -> Self {
        Self { annual_cola: 0.025 }
    }
}

impl SocialSecurityCalculator for SsaBenefitRules {
    fn fra_months(&self, birth_year: i32) -> u32 {
        match birth_year {
            ..=1937 => 65 * 12,
            1938..=1942 => 65 * 12 + 2 * (birth_year - 1937) as u32,
            1943..=1954 => 66 * 12,
            1955..=1959 => 66 * 12 + 2 * (birth_year - 1954) as u32,
            _ => 67 * 12,
        }
    }

    fn adjusted_monthly_benefit(
        &self,
        benefit_at_fra: f64,
        claim_age_months: u32,
        birth_year: i32,
    ) -> f64 {
        if benefit_at_fra <= 0.0 {
            return 0.0;
        }
        let fra = self.fra_months(birth_year);

        if claim_age_months < fra {
            // Early claim: 5/9 of 1% per month for the first 36 months,
            // 5/12 of 1% for each month beyond.
            let early = fra - claim_age_months;
            let first = early.min(36) as f64;
            let rest = early.saturating_sub(36) as f64;
            let reduction = first * (5.0 / 900.0) + rest * (5.0 / 1200.0);
            benefit_at_fra * (1.0 - reduction).max(0.0)
        } else {
            // Delayed credits accrue at 2/3 of 1% per month, capped at age 70.
            let capped = claim_age_months.min(70 * 12);
            let delayed = capped.saturating_sub(fra) as f64;
            benefit_at_fra * (1.0 + delayed * (2.0 / 300.0))
        }
    }

    fn apply_cola(&self, monthly_benefit: f64, years_since_claim: u32) -> f64 {
        monthly_benefit * (1.0 + self.annual_cola).powi(years_since_claim as i32)
    }
}

pub struct BlendedReturnModel {
    pub stock_rate: f64,
    pub bond_rate: f64,
    pub cash_rate: f64,
}

impl ReturnCalculator for BlendedReturnModel {
    fn blended_annual_rate(&self, allocation: AssetAllocation) -> f64 {
        allocation.stocks * self.stock_rate
            + allocation.bonds * self.bond_rate
            + allocation.cash() * self.cash_rate
    }

    fn growth_over_months(&self, annual_rate: f64, months: u32) -> f64 {
        (1.0 + annual_rate).max(0.0).powf(months as f64 / 12.0)
    }
}

struct Bracket {
    over: f64,
    rate: f64,
}

// 2024 federal brackets.
const SINGLE_BRACKETS: [Bracket; 7] = [
    Bracket { over: 0.0, rate: 0.10 },
    Bracket { over: 11_600.0, rate: 0.12 },
    Bracket { over: 47_150.0, rate: 0.22 },
    Bracket { over: 100_525.0, rate: 0.24 },
    Bracket { over: 191_950.0, rate: 0.32 },
    Bracket { over: 243_725.0, rate: 0.35 },
    Bracket { over: 609_350.0, rate: 0.37 },
];

const JOINT_BRACKETS: [Bracket; 7] = [
    Bracket { over: 0.0, rate: 0.10 },
    Bracket { over: 23_200.0, rate: 0.12 },
    Bracket { over: 94_300.0, rate: 0.22 },
    Bracket { over: 201_050.0, rate: 0.24 },
    Bracket { over: 383_900.0, rate: 0.32 },
    Bracket { over: 487_450.0, rate: 0.35 },
    Bracket { over: 731_200.0, rate: 0.37 },
];

pub struct FederalBracketTax;

impl TaxCalculator for FederalBracketTax {
    fn federal_tax(&self, taxable_income: f64, status: FilingStatus) -> f64 {
        let brackets: &[Bracket] = match status {
            FilingStatus::Single => &SINGLE_BRACKETS,
            FilingStatus::MarriedJoint => &JOINT_BRACKETS,
        };
        let income = taxable_income.max(0.0);

        let mut tax = 0.0;
        for (i, bracket) in brackets.iter().enumerate() {
            if income <= bracket.over {
                break;
            }
            let upper = brackets
                .get(i + 1)
                .map(|next| next.over)
                .unwrap_or(f64::INFINITY);
            tax += (income.min(upper) - bracket.over) * bracket.rate;
        }
        tax
    }
}

// The bundle the engine is constructed with. Defaults cover the shipped
// regulatory rules; tests swap in simpler oracles.
pub struct Calculators {
    pub rmd: Box<dyn RmdCalculator>,
    pub social_security: Box<dyn SocialSecurityCalculator>,
    pub returns: Box<dyn ReturnCalculator>,
    pub tax: Box<dyn TaxCalculator>,
}

impl Calculators {
    pub fn with_market_rates(stock_rate: f64, bond_rate: f64, cash_rate: f64) -> Self {
        Self {
            rmd: Box::new(UniformLifetimeRmd),
            social_security: Box::new(SsaBenefitRules::default()),
            returns: Box::new(BlendedReturnModel {
                stock_rate,
                bond_rate,
                cash_rate,
            }),
            tax: Box::new(FederalBracketTax),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    #[test]
    fn rmd_divides_by_the_distribution_period() {
        let rmd = UniformLifetimeRmd;
        assert_close(rmd.required_distribution(100_000.0, 75), 100_000.0 / 24.6, 1e-9);
        assert_eq!(rmd.required_distribution(100_000.0, 71), 0.0);
        assert_eq!(rmd.required_distribution(0.0, 80), 0.0);
        // Past the table end the final factor holds.
        assert_close(rmd.required_distribution(10_000.0, 110), 10_000.0 / 6.4, 1e-9);
    }

    #[test]
    fn rmd_start_age_follows_birth_year() {
        let rmd = UniformLifetimeRmd;
        assert_eq!(rmd.start_age(1949), 72);
        assert_eq!(rmd.start_age(1955), 73);
        assert_eq!(rmd.start_age(1962), 75);
        assert!(rmd.is_subject(TaxTreatment::PreTax));
        assert!(!rmd.is_subject(TaxTreatment::Roth));
        assert!(!rmd.is_subject(TaxTreatment::Taxable));
    }

    #[test]
    fn fra_months_table() {
        let rules = SsaBenefitRules::default();
        assert_eq!(rules.fra_months(1937), 780);
        assert_eq!(rules.fra_months(1940), 786);
        assert_eq!(rules.fra_months(1950), 792);
        assert_eq!(rules.fra_months(1957), 798);
        assert_eq!(rules.fra_months(1965), 804);
    }

    #[test]
    fn early_claim_reduces_and_delay_increases() {
        let rules = SsaBenefitRules { annual_cola: 0.0 };
        let fra_claim = rules.adjusted_monthly_benefit(1_000.0, 67 * 12, 1960);
        assert_close(fra_claim, 1_000.0, 1e-9);

        // 60 months early: 36 * 5/900 + 24 * 5/1200 = 0.30.
        let early = rules.adjusted_monthly_benefit(1_000.0, 62 * 12, 1960);
        assert_close(early, 700.0, 1e-9);

        // 36 months delayed: 36 * 2/300 = 0.24, and nothing accrues past 70.
        let delayed = rules.adjusted_monthly_benefit(1_000.0, 70 * 12, 1960);
        assert_close(delayed, 1_240.0, 1e-9);
        let past_cap = rules.adjusted_monthly_benefit(1_000.0, 72 * 12, 1960);
        assert_close(past_cap, 1_240.0, 1e-9);
    }

    #[test]
    fn cola_compounds_annually() {
        let rules = SsaBenefitRules { annual_cola: 0.02 };
        assert_close(rules.apply_cola(1_000.0, 0), 1_000.0, 1e-9);
        assert_close(rules.apply_cola(1_000.0, 2), 1_040.4, 1e-9);
    }

    #[test]
    fn blended_rate_weights_the_allocation() {
        let model = BlendedReturnModel {
            stock_rate: 0.08,
            bond_rate: 0.04,
            cash_rate: 0.01,
        };
        let rate = model.blended_annual_rate(AssetAllocation {
            stocks: 0.5,
            bonds: 0.3,
        });
        assert_close(rate, 0.5 * 0.08 + 0.3 * 0.04 + 0.2 * 0.01, 1e-12);

        // Twelve months of the monthly multiplier equals one annual step.
        let monthly = model.growth_over_months(0.06, 1);
        assert_close(monthly.powi(12), 1.06, 1e-9);
    }

    #[test]
    fn bracket_tax_is_marginal_not_flat() {
        let tax = FederalBracketTax;
        assert_eq!(tax.federal_tax(0.0, FilingStatus::Single), 0.0);
        assert_close(tax.federal_tax(11_600.0, FilingStatus::Single), 1_160.0, 1e-9);
        // 11,600 * 0.10 + (47,150 - 11,600) * 0.12
        assert_close(tax.federal_tax(47_150.0, FilingStatus::Single), 5_426.0, 1e-6);
        // Married-joint brackets are wider, so the same income owes less.
        assert!(
            tax.federal_tax(100_000.0, FilingStatus::MarriedJoint)
                < tax.federal_tax(100_000.0, FilingStatus::Single)
        );
    }
}
