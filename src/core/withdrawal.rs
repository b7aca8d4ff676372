use serde::Serialize;

use super::account::{AccountSnapshot, TaxTreatment};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountWithdrawal {
    pub account: AccountSnapshot,
    pub requested: f64,
    pub amount: f64,
    pub prior_balance: f64,
    pub new_balance: f64,
    pub tax_treatment: TaxTreatment,
}

impl AccountWithdrawal {
    pub fn is_taxable(&self) -> bool {
        matches!(self.tax_treatment, TaxTreatment::Taxable | TaxTreatment::PreTax)
    }

    pub fn depleted(&self) -> bool {
        self.new_balance <= 0.0
    }

    pub fn partial(&self) -> bool {
        self.amount + 1e-9 < self.requested
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingPlan {
    pub target_withdrawal: f64,
    pub adjusted_withdrawal: f64,
    pub withdrawals: Vec<AccountWithdrawal>,
    pub meets_target: bool,
    pub strategy: String,
}

impl SpendingPlan {
    pub fn empty(strategy: &str) -> Self {
        Self {
            target_withdrawal: 0.0,
            adjusted_withdrawal: 0.0,
            withdrawals: Vec::new(),
            meets_target: true,
            strategy: strategy.to_string(),
        }
    }

    pub fn shortfall(&self) -> f64 {
        (self.target_withdrawal - self.adjusted_withdrawal).max(0.0)
    }
}

// Greedy allocation down the sequenced list: drain each account up to its
// balance until the target is met or the accounts run out. Underfunding is
// reported through meets_target, never an error.
pub fn build_plan(target: f64, sequenced: &[AccountSnapshot], strategy: &str) -> SpendingPlan {
    let target = target.max(0.0);
    let mut remaining = target;
    let mut withdrawals = Vec::new();

    for account in sequenced {
        if remaining <= 1e-9 {
            break;
        }
        let amount = remaining.min(account.balance.max(0.0));
        if amount <= 0.0 {
            continue;
        }
        withdrawals.push(AccountWithdrawal {
            requested: remaining,
            amount,
            prior_balance: account.balance,
            new_balance: account.balance - amount,
            tax_treatment: account.tax_treatment,
            account: account.clone(),
        });
        remaining -= amount;
    }

    SpendingPlan {
        target_withdrawal: target,
        adjusted_withdrawal: target - remaining.max(0.0),
        meets_target: remaining <= 1e-9,
        withdrawals,
        strategy: strategy.to_string(),
    }
}
