use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::account::{AccountKind, AssetAllocation, TaxTreatment};
use super::calculators::FilingStatus;
use super::error::ValidationError;
use super::income::PersonProfile;
use super::phase::Phase;
use super::sequence::SequencePolicy;
use super::spending::SpendingStrategy;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub id: String,
    pub name: String,
    pub kind: AccountKind,
    pub tax_treatment: TaxTreatment,
    #[serde(default)]
    pub rmd_subject: bool,
    pub opening_balance: f64,
    pub allocation: AssetAllocation,
    #[serde(default)]
    pub monthly_contribution: f64,
    // Profile name of the account owner; RMD timing keys off their age.
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpensePlan {
    pub annual_expenses: f64,
    // Share of annual expenses per category; empty means one implicit
    // "household" category.
    #[serde(default)]
    pub category_shares: BTreeMap<String, f64>,
    // Per-category multipliers applied while the household is in survivor
    // mode (e.g. housing stays at 1.0, travel drops to 0.6).
    #[serde(default)]
    pub survivor_multipliers: BTreeMap<String, f64>,
}

impl ExpensePlan {
    pub fn monthly_expenses(&self, phase: Phase) -> f64 {
        let monthly = self.annual_expenses / 12.0;
        if phase != Phase::Survivor || self.survivor_multipliers.is_empty() {
            return monthly;
        }

        if self.category_shares.is_empty() {
            let multiplier = self
                .survivor_multipliers
                .get("household")
                .copied()
                .unwrap_or(1.0);
            return monthly * multiplier;
        }

        self.category_shares
            .iter()
            .map(|(category, share)| {
                let multiplier = self
                    .survivor_multipliers
                    .get(category)
                    .copied()
                    .unwrap_or(1.0);
                share * multiplier * monthly
            })
            .sum()
    }

    // Categories whose survivor multiplier actually changes spending.
    pub fn survivor_contingency_categories(&self) -> Vec<&str> {
        self.survivor_multipliers
            .iter()
            .filter(|(_, m)| (**m - 1.0).abs() > 1e-9)
            .map(|(category, _)| category.as_str())
            .collect()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.annual_expenses < 0.0 {
            return Err(ValidationError::NegativeAmount {
                context: "annual expenses",
                amount: self.annual_expenses,
            });
        }
        if !self.category_shares.is_empty() {
            let total: f64 = self.category_shares.values().sum();
            if (total - 1.0).abs() > 1e-6 {
                return Err(ValidationError::invalid(format!(
                    "expense category shares must sum to 1, got {total}"
                )));
            }
        }
        if self
            .survivor_multipliers
            .values()
            .chain(self.category_shares.values())
            .any(|v| *v < 0.0)
        {
            return Err(ValidationError::invalid(
                "expense shares and multipliers must be non-negative",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketModel {
    pub stock_mean: f64,
    #[serde(default)]
    pub stock_vol: f64,
    pub bond_mean: f64,
    #[serde(default)]
    pub bond_vol: f64,
    #[serde(default)]
    pub cash_rate: f64,
    #[serde(default)]
    pub stock_bond_correlation: f64,
}

impl MarketModel {
    pub fn is_deterministic(&self) -> bool {
        self.stock_vol == 0.0 && self.bond_vol == 0.0
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.stock_vol < 0.0 || self.bond_vol < 0.0 {
            return Err(ValidationError::invalid("volatility must be non-negative"));
        }
        if !(-1.0..=1.0).contains(&self.stock_bond_correlation) {
            return Err(ValidationError::invalid(
                "correlation must be within [-1, 1]",
            ));
        }
        Ok(())
    }
}

fn default_seed() -> u64 {
    42
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub start_month: NaiveDate,
    pub horizon_months: u32,
    pub profiles: Vec<PersonProfile>,
    pub accounts: Vec<AccountConfig>,
    pub expenses: ExpensePlan,
    pub strategy: SpendingStrategy,
    pub sequence_policy: SequencePolicy,
    pub filing_status: FilingStatus,
    pub market: MarketModel,
    #[serde(default)]
    pub contribution_growth_rate: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.horizon_months == 0 {
            return Err(ValidationError::invalid("horizon must be at least one month"));
        }
        if self.start_month.day() != 1 {
            return Err(ValidationError::invalid(
                "start month must be the first of a month",
            ));
        }
        if self.profiles.is_empty() {
            return Err(ValidationError::MissingField("profiles"));
        }
        if self.accounts.is_empty() {
            return Err(ValidationError::MissingField("accounts"));
        }

        let mut names = HashSet::new();
        for profile in &self.profiles {
            profile.validate()?;
            if !names.insert(profile.name.as_str()) {
                return Err(ValidationError::invalid(format!(
                    "duplicate profile name: {}",
                    profile.name
                )));
            }
        }

        let mut ids = HashSet::new();
        for account in &self.accounts {
            if account.id.is_empty() {
                return Err(ValidationError::MissingField("account id"));
            }
            if !ids.insert(account.id.as_str()) {
                return Err(ValidationError::invalid(format!(
                    "duplicate account id: {}",
                    account.id
                )));
            }
            if account.opening_balance < 0.0 || account.monthly_contribution < 0.0 {
                return Err(ValidationError::NegativeAmount {
                    context: "account balance or contribution",
                    amount: account.opening_balance.min(account.monthly_contribution),
                });
            }
            account.allocation.validate()?;
            if let Some(owner) = &account.owner {
                if !self.profiles.iter().any(|p| &p.name == owner) {
                    return Err(ValidationError::invalid(format!(
                        "account {} names unknown owner {owner}",
                        account.id
                    )));
                }
            }
        }

        self.expenses.validate()?;
        self.market.validate()?;
        self.strategy.validate()?;

        if self.contribution_growth_rate < -1.0 {
            return Err(ValidationError::invalid(
                "contribution growth rate must be above -100%",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::core::income::test_support::{person, ymd};

    pub fn brokerage_account(id: &str, balance: f64) -> AccountConfig {
        AccountConfig {
            id: id.to_string(),
            name: id.to_string(),
            kind: AccountKind::Brokerage,
            tax_treatment: TaxTreatment::Taxable,
            rmd_subject: false,
            opening_balance: balance,
            allocation: AssetAllocation {
                stocks: 0.6,
                bonds: 0.4,
            },
            monthly_contribution: 0.0,
            owner: None,
        }
    }

    pub fn baseline_config() -> SimulationConfig {
        let mut retiree = person(
            "ann",
            ymd(1960, 6, 15),
            ymd(2025, 1, 1),
            ymd(2025, 1, 1),
            None,
        );
        retiree.annual_salary = 0.0;

        SimulationConfig {
            start_month: ymd(2025, 1, 1),
            horizon_months: 120,
            profiles: vec![retiree],
            accounts: vec![brokerage_account("brokerage", 1_000_000.0)],
            expenses: ExpensePlan {
                annual_expenses: 48_000.0,
                category_shares: BTreeMap::new(),
                survivor_multipliers: BTreeMap::new(),
            },
            strategy: SpendingStrategy::Fixed {
                annual_amount: 48_000.0,
            },
            sequence_policy: SequencePolicy::TaxEfficient,
            filing_status: FilingStatus::Single,
            market: MarketModel {
                stock_mean: 0.0,
                stock_vol: 0.0,
                bond_mean: 0.0,
                bond_vol: 0.0,
                cash_rate: 0.0,
                stock_bond_correlation: 0.0,
            },
            contribution_growth_rate: 0.0,
            seed: 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{baseline_config, brokerage_account};
    use super::*;
    use crate::core::income::test_support::ymd;

    #[test]
    fn baseline_config_validates() {
        assert_eq!(baseline_config().validate(), Ok(()));
    }

    #[test]
    fn duplicate_account_ids_are_rejected() {
        let mut config = baseline_config();
        config.accounts.push(brokerage_account("brokerage", 1.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_account_owner_is_rejected() {
        let mut config = baseline_config();
        let mut account = brokerage_account("ira", 10.0);
        account.owner = Some("nobody".to_string());
        config.accounts.push(account);
        assert!(config.validate().is_err());
    }

    #[test]
    fn mid_month_start_is_rejected() {
        let mut config = baseline_config();
        config.start_month = ymd(2025, 1, 15);
        assert!(config.validate().is_err());
    }

    #[test]
    fn category_shares_must_sum_to_one() {
        let mut config = baseline_config();
        config
            .expenses
            .category_shares
            .insert("housing".to_string(), 0.5);
        assert!(config.validate().is_err());

        config
            .expenses
            .category_shares
            .insert("everything-else".to_string(), 0.5);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn survivor_multipliers_scale_only_their_category() {
        let mut plan = ExpensePlan {
            annual_expenses: 60_000.0,
            category_shares: BTreeMap::new(),
            survivor_multipliers: BTreeMap::new(),
        };
        plan.category_shares.insert("housing".to_string(), 0.5);
        plan.category_shares.insert("travel".to_string(), 0.5);
        plan.survivor_multipliers.insert("travel".to_string(), 0.6);

        assert!((plan.monthly_expenses(Phase::Distribution) - 5_000.0).abs() < 1e-9);
        // Housing unchanged, travel reduced by 40%.
        assert!((plan.monthly_expenses(Phase::Survivor) - 4_000.0).abs() < 1e-9);
        assert_eq!(plan.survivor_contingency_categories(), vec!["travel"]);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = baseline_config();
        let json = serde_json::to_string(&config).expect("serializes");
        let back: SimulationConfig = serde_json::from_str(&json).expect("parses");
        assert_eq!(config, back);
    }

    #[test]
    fn config_parses_from_camel_case_json() {
        let json = r#"{
            "startMonth": "2025-01-01",
            "horizonMonths": 12,
            "profiles": [{
                "name": "ann",
                "birthDate": "1960-06-15",
                "retirementDate": "2025-01-01",
                "withdrawalStartDate": "2025-01-01",
                "annualSalary": 0.0
            }],
            "accounts": [{
                "id": "brokerage",
                "name": "Brokerage",
                "kind": "brokerage",
                "taxTreatment": "taxable",
                "openingBalance": 500000.0,
                "allocation": { "stocks": 0.6, "bonds": 0.4 }
            }],
            "expenses": { "annualExpenses": 40000.0 },
            "strategy": { "kind": "guardrails", "initialRate": 0.04,
                          "upperMultiplier": 1.2, "lowerMultiplier": 0.8,
                          "decreaseAdjustment": 0.1, "increaseAdjustment": 0.1,
                          "minimumYearsBetweenRatchets": 1.0,
                          "floor": null, "ceiling": null },
            "sequencePolicy": "tax-efficient",
            "filingStatus": "single",
            "market": { "stockMean": 0.07, "bondMean": 0.03 }
        }"#;
        let config: SimulationConfig = serde_json::from_str(json).expect("parses");
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.seed, 42);
        assert_eq!(config.strategy.name(), "guardrails");
    }
}
