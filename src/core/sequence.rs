use serde::{Deserialize, Serialize};

use super::account::AccountSnapshot;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SequencePolicy {
    TaxEfficient,
    RmdFirst,
}

// Pure ordering over snapshots: same input, same order. Zero-balance accounts
// never participate.
pub fn sequence(policy: SequencePolicy, accounts: &[AccountSnapshot]) -> Vec<AccountSnapshot> {
    let funded: Vec<AccountSnapshot> = accounts
        .iter()
        .filter(|a| a.balance > 0.0)
        .cloned()
        .collect();

    match policy {
        SequencePolicy::TaxEfficient => tax_efficient(funded),
        SequencePolicy::RmdFirst => rmd_first(funded),
    }
}

// Taxable money first, then pre-tax, Roth, HSA; smaller balances drain first
// within a tier so tax-advantaged growth is preserved longest.
fn tax_efficient(mut accounts: Vec<AccountSnapshot>) -> Vec<AccountSnapshot> {
    accounts.sort_by(|a, b| {
        a.tax_treatment
            .sequence_priority()
            .cmp(&b.tax_treatment.sequence_priority())
            .then(a.balance.total_cmp(&b.balance))
    });
    accounts
}

// RMD-subject accounts lead, largest balance first, so the biggest mandatory
// obligations are satisfied before anything else; the rest fall back to the
// tax-efficient order.
fn rmd_first(accounts: Vec<AccountSnapshot>) -> Vec<AccountSnapshot> {
    let (mut mandatory, rest): (Vec<AccountSnapshot>, Vec<AccountSnapshot>) =
        accounts.into_iter().partition(|a| a.rmd_subject);
    mandatory.sort_by(|a, b| b.balance.total_cmp(&a.balance));
    mandatory.extend(tax_efficient(rest));
    mandatory
}
