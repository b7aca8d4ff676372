use serde::{Deserialize, Serialize};

use super::error::{ValidationError, require_non_negative};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxTreatment {
    Taxable,
    PreTax,
    Roth,
    Hsa,
}

impl TaxTreatment {
    // Withdrawal sequencing tier: taxable money first, HSA last.
    pub fn sequence_priority(self) -> u8 {
        match self {
            TaxTreatment::Taxable => 0,
            TaxTreatment::PreTax => 1,
            TaxTreatment::Roth => 2,
            TaxTreatment::Hsa => 3,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountKind {
    Brokerage,
    TraditionalIra,
    RothIra,
    WorkplacePlan,
    Hsa,
    Savings,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAllocation {
    pub stocks: f64,
    pub bonds: f64,
}

impl AssetAllocation {
    pub fn cash(self) -> f64 {
        (1.0 - self.stocks - self.bonds).max(0.0)
    }

    pub fn validate(self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.stocks) || !(0.0..=1.0).contains(&self.bonds) {
            return Err(ValidationError::invalid(
                "allocation weights must be within [0, 1]",
            ));
        }
        if self.stocks + self.bonds > 1.0 + 1e-9 {
            return Err(ValidationError::invalid(
                "allocation weights must not sum above 1",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub id: String,
    pub name: String,
    pub kind: AccountKind,
    pub balance: f64,
    pub tax_treatment: TaxTreatment,
    pub rmd_subject: bool,
    pub allocation: AssetAllocation,
}

#[derive(Clone, Debug)]
pub struct AccountState {
    id: String,
    name: String,
    kind: AccountKind,
    tax_treatment: TaxTreatment,
    rmd_subject: bool,
    allocation: AssetAllocation,
    balance: f64,
}

impl AccountState {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: AccountKind,
        tax_treatment: TaxTreatment,
        rmd_subject: bool,
        allocation: AssetAllocation,
        opening_balance: f64,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::MissingField("account id"));
        }
        allocation.validate()?;
        let balance = require_non_negative("opening balance", opening_balance)?;

        Ok(Self {
            id,
            name: name.into(),
            kind,
            tax_treatment,
            rmd_subject,
            allocation,
            balance,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn tax_treatment(&self) -> TaxTreatment {
        self.tax_treatment
    }

    pub fn rmd_subject(&self) -> bool {
        self.rmd_subject
    }

    pub fn allocation(&self) -> AssetAllocation {
        self.allocation
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn deposit(&mut self, amount: f64) -> Result<(), ValidationError> {
        let amount = require_non_negative("deposit", amount)?;
        self.balance += amount;
        Ok(())
    }

    // Clamped to the available balance: overdrawing withdraws everything and
    // reports the lesser amount instead of erroring.
    pub fn withdraw(&mut self, amount: f64) -> Result<f64, ValidationError> {
        let amount = require_non_negative("withdrawal", amount)?;
        let actual = amount.min(self.balance);
        self.balance -= actual;
        Ok(actual)
    }

    pub fn apply_return(&mut self, rate: f64) -> f64 {
        let before = self.balance;
        self.balance = (self.balance * (1.0 + rate)).max(0.0);
        self.balance - before
    }

    pub fn set_balance(&mut self, balance: f64) -> Result<(), ValidationError> {
        self.balance = require_non_negative("balance", balance)?;
        Ok(())
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            balance: self.balance,
            tax_treatment: self.tax_treatment,
            rmd_subject: self.rmd_subject,
            allocation: self.allocation,
        }
    }
}
