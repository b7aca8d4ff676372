use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::calculators::SocialSecurityCalculator;
use super::error::ValidationError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialSecurityProfile {
    pub monthly_benefit_at_fra: f64,
    pub claim_date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PensionProfile {
    pub monthly_amount: f64,
    pub start_date: NaiveDate,
    // Fraction of the benefit that continues to a surviving spouse.
    #[serde(default)]
    pub survivor_fraction: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonProfile {
    pub name: String,
    pub birth_date: NaiveDate,
    pub retirement_date: NaiveDate,
    pub withdrawal_start_date: NaiveDate,
    #[serde(default)]
    pub death_date: Option<NaiveDate>,
    #[serde(default)]
    pub annual_salary: f64,
    #[serde(default)]
    pub social_security: Option<SocialSecurityProfile>,
    #[serde(default)]
    pub pension: Option<PensionProfile>,
    #[serde(default)]
    pub other_monthly_income: f64,
}

impl PersonProfile {
    pub fn is_alive(&self, month: NaiveDate) -> bool {
        self.death_date.is_none_or(|d| month < d)
    }

    pub fn birth_year(&self) -> i32 {
        self.birth_date.year()
    }

    pub fn age_on(&self, month: NaiveDate) -> u32 {
        whole_years_between(self.birth_date, month)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::MissingField("profile name"));
        }
        if self.retirement_date <= self.birth_date {
            return Err(ValidationError::invalid(format!(
                "{}: retirement date must come after birth date",
                self.name
            )));
        }
        if self.annual_salary < 0.0 || self.other_monthly_income < 0.0 {
            return Err(ValidationError::NegativeAmount {
                context: "profile income",
                amount: self.annual_salary.min(self.other_monthly_income),
            });
        }
        if let Some(ss) = &self.social_security {
            if ss.monthly_benefit_at_fra < 0.0 {
                return Err(ValidationError::NegativeAmount {
                    context: "social security benefit",
                    amount: ss.monthly_benefit_at_fra,
                });
            }
        }
        if let Some(p) = &self.pension {
            if p.monthly_amount < 0.0 || !(0.0..=1.0).contains(&p.survivor_fraction) {
                return Err(ValidationError::invalid(format!(
                    "{}: pension amount must be non-negative and survivor fraction within [0, 1]",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyIncome {
    pub salary: f64,
    pub social_security: f64,
    pub pension: f64,
    pub other: f64,
}

impl MonthlyIncome {
    pub fn total(self) -> f64 {
        self.salary + self.social_security + self.pension + self.other
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingGap {
    pub need: f64,
    pub surplus: f64,
}

pub fn funding_gap(monthly_expenses: f64, monthly_income: f64) -> FundingGap {
    let diff = monthly_expenses - monthly_income;
    FundingGap {
        need: diff.max(0.0),
        surplus: (-diff).max(0.0),
    }
}

// Sums every income source active in `month` across the household. Salary
// stops at each person's own retirement date, so a staggered household keeps
// one salary while the other spouse draws down.
pub fn aggregate_income(
    month: NaiveDate,
    profiles: &[PersonProfile],
    social_security: &dyn SocialSecurityCalculator,
) -> MonthlyIncome {
    let mut income = MonthlyIncome::default();

    let mut alive_ss = Vec::new();
    let mut deceased_best_ss = 0.0_f64;
    let any_survivor = profiles.iter().any(|p| p.is_alive(month));

    for profile in profiles {
        let alive = profile.is_alive(month);

        if alive && month < profile.retirement_date {
            income.salary += profile.annual_salary / 12.0;
        }
        if alive {
            income.other += profile.other_monthly_income;
        }

        let benefit = social_security_benefit(profile, month, social_security);
        if alive {
            alive_ss.push(benefit);
        } else {
            deceased_best_ss = deceased_best_ss.max(benefit);
        }

        if let Some(pension) = &profile.pension {
            if month >= pension.start_date {
                if alive {
                    income.pension += pension.monthly_amount;
                } else if any_survivor {
                    income.pension += pension.monthly_amount * pension.survivor_fraction;
                }
            }
        }
    }

    // Survivor benefit: the surviving spouse collects the larger of their own
    // benefit and the deceased spouse's (two-person household semantics).
    if deceased_best_ss > 0.0 {
        if let Some(largest) = alive_ss
            .iter_mut()
            .max_by(|a, b| a.total_cmp(b))
        {
            *largest = largest.max(deceased_best_ss);
        }
    }
    income.social_security += alive_ss.iter().sum::<f64>();

    income
}

fn social_security_benefit(
    profile: &PersonProfile,
    month: NaiveDate,
    social_security: &dyn SocialSecurityCalculator,
) -> f64 {
    let Some(ss) = &profile.social_security else {
        return 0.0;
    };
    if month < ss.claim_date {
        return 0.0;
    }

    let claim_age_months = months_between(profile.birth_date, ss.claim_date);
    let base = social_security.adjusted_monthly_benefit(
        ss.monthly_benefit_at_fra,
        claim_age_months,
        profile.birth_year(),
    );
    social_security.apply_cola(base, whole_years_between(ss.claim_date, month))
}

pub fn months_between(earlier: NaiveDate, later: NaiveDate) -> u32 {
    if later <= earlier {
        return 0;
    }
    let mut months =
        (later.year() - earlier.year()) * 12 + later.month() as i32 - earlier.month() as i32;
    if later.day() < earlier.day() {
        months -= 1;
    }
    months.max(0) as u32
}

pub fn whole_years_between(earlier: NaiveDate, later: NaiveDate) -> u32 {
    months_between(earlier, later) / 12
}
