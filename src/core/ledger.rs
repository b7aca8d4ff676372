use chrono::NaiveDate;
use serde::Serialize;

use super::account::{AccountSnapshot, AccountState, AssetAllocation};
use super::error::{ValidationError, require_non_negative};
use super::flags::SimulationFlags;
use super::phase::Phase;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMonthlyFlow {
    pub account_id: String,
    pub starting_balance: f64,
    pub deposits: f64,
    pub withdrawals: f64,
    pub returns: f64,
    pub ending_balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySnapshot {
    pub month: NaiveDate,
    pub phase: Phase,
    pub starting_balance: f64,
    pub ending_balance: f64,
    pub income: f64,
    pub expenses: f64,
    pub estimated_tax: f64,
    pub target_withdrawal: f64,
    pub adjusted_withdrawal: f64,
    pub met_target: bool,
    pub flows: Vec<AccountMonthlyFlow>,
}

impl MonthlySnapshot {
    pub fn total_withdrawals(&self) -> f64 {
        self.flows.iter().map(|f| f.withdrawals).sum()
    }

    pub fn total_returns(&self) -> f64 {
        self.flows.iter().map(|f| f.returns).sum()
    }
}

// The only component that mutates money. Accounts are owned records addressed
// by id; nothing outside the ledger holds a reference into it.
pub struct SimulationState {
    accounts: Vec<AccountState>,
    cumulative_withdrawals: f64,
    high_water_mark: f64,
    initial_balance: f64,
    history: Vec<MonthlySnapshot>,
    last_ratchet: Option<(NaiveDate, f64)>,
    flags: SimulationFlags,
}

impl SimulationState {
    pub fn new(accounts: Vec<AccountState>) -> Self {
        let initial_balance = accounts.iter().map(AccountState::balance).sum();
        Self {
            accounts,
            cumulative_withdrawals: 0.0,
            high_water_mark: initial_balance,
            initial_balance,
            history: Vec::new(),
            last_ratchet: None,
            flags: SimulationFlags::new(),
        }
    }

    pub fn total_balance(&self) -> f64 {
        self.accounts.iter().map(AccountState::balance).sum()
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn high_water_mark(&self) -> f64 {
        self.high_water_mark
    }

    pub fn cumulative_withdrawals(&self) -> f64 {
        self.cumulative_withdrawals
    }

    pub fn history(&self) -> &[MonthlySnapshot] {
        &self.history
    }

    pub fn into_history(self) -> Vec<MonthlySnapshot> {
        self.history
    }

    pub fn flags(&self) -> &SimulationFlags {
        &self.flags
    }

    pub fn set_flags(&mut self, flags: SimulationFlags) {
        self.flags = flags;
    }

    pub fn last_ratchet(&self) -> Option<NaiveDate> {
        self.last_ratchet.map(|(month, _)| month)
    }

    // The annual spending level the most recent ratchet settled on. Holds
    // between adjustments so a cut or raise is not undone by the next period's
    // trailing-spending lookup.
    pub fn ratchet_level(&self) -> Option<f64> {
        self.last_ratchet.map(|(_, level)| level)
    }

    pub fn mark_ratchet(&mut self, month: NaiveDate, annual_level: f64) {
        self.last_ratchet = Some((month, annual_level));
    }

    pub fn years_since_last_ratchet(&self, as_of: NaiveDate) -> f64 {
        match self.last_ratchet {
            Some((month, _)) => (as_of - month).num_days() as f64 / 365.25,
            None => f64::INFINITY,
        }
    }

    pub fn account(&self, id: &str) -> Option<&AccountState> {
        self.accounts.iter().find(|a| a.id() == id)
    }

    fn account_mut(&mut self, id: &str) -> Option<&mut AccountState> {
        self.accounts.iter_mut().find(|a| a.id() == id)
    }

    pub fn snapshots(&self) -> Vec<AccountSnapshot> {
        self.accounts.iter().map(AccountState::snapshot).collect()
    }

    // Balance-weighted household allocation, used to blend one portfolio-level
    // return rate per period.
    pub fn portfolio_allocation(&self) -> AssetAllocation {
        let total = self.total_balance();
        if total <= 0.0 {
            return AssetAllocation {
                stocks: 0.0,
                bonds: 0.0,
            };
        }
        let mut stocks = 0.0;
        let mut bonds = 0.0;
        for account in &self.accounts {
            let weight = account.balance() / total;
            stocks += weight * account.allocation().stocks;
            bonds += weight * account.allocation().bonds;
        }
        AssetAllocation { stocks, bonds }
    }

    // Unknown ids are a silent zero-withdrawal no-op; only a negative amount
    // is an error.
    pub fn withdraw(&mut self, id: &str, amount: f64) -> Result<f64, ValidationError> {
        require_non_negative("withdrawal", amount)?;
        let Some(account) = self.account_mut(id) else {
            return Ok(0.0);
        };
        let actual = account.withdraw(amount)?;
        self.cumulative_withdrawals += actual;
        Ok(actual)
    }

    pub fn deposit(&mut self, id: &str, amount: f64) -> Result<(), ValidationError> {
        require_non_negative("deposit", amount)?;
        let Some(account) = self.account_mut(id) else {
            return Ok(());
        };
        account.deposit(amount)?;
        self.refresh_high_water_mark();
        Ok(())
    }

    pub fn apply_returns(&mut self, rate: f64) -> Vec<(String, f64)> {
        let deltas = self
            .accounts
            .iter_mut()
            .map(|account| (account.id().to_string(), account.apply_return(rate)))
            .collect();
        self.refresh_high_water_mark();
        deltas
    }

    pub fn record_history(&mut self, snapshot: MonthlySnapshot) {
        self.history.push(snapshot);
    }

    // Sum of withdrawals over the trailing twelve recorded months strictly
    // before `as_of`. Less history than that still counts what exists.
    pub fn prior_year_spending(&self, as_of: NaiveDate) -> f64 {
        self.history
            .iter()
            .rev()
            .filter(|s| s.month < as_of)
            .take(12)
            .map(MonthlySnapshot::total_withdrawals)
            .sum()
    }

    // Trailing-twelve-month return on the balance at the start of the window.
    // Zero until a full year of history exists.
    pub fn prior_year_return(&self, as_of: NaiveDate) -> f64 {
        let window: Vec<&MonthlySnapshot> = self
            .history
            .iter()
            .rev()
            .filter(|s| s.month < as_of)
            .take(12)
            .collect();
        if window.len() < 12 {
            return 0.0;
        }
        let start = window.last().map(|s| s.starting_balance).unwrap_or(0.0);
        if start <= 0.0 {
            return 0.0;
        }
        window.iter().map(|s| s.total_returns()).sum::<f64>() / start
    }

    fn refresh_high_water_mark(&mut self) {
        self.high_water_mark = self.high_water_mark.max(self.total_balance());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account::{AccountKind, TaxTreatment};
    use crate::core::income::test_support::ymd;
    use proptest::prelude::{prop_assert, proptest};

    fn account(id: &str, balance: f64) -> AccountState {
        AccountState::new(
            id,
            id,
            AccountKind::Brokerage,
            TaxTreatment::Taxable,
            false,
            AssetAllocation {
                stocks: 0.6,
                bonds: 0.4,
            },
            balance,
        )
        .expect("valid account")
    }

    fn two_account_state() -> SimulationState {
        SimulationState::new(vec![account("a", 10_000.0), account("b", 5_000.0)])
    }

    fn snapshot_for(month: NaiveDate, starting: f64, withdrawals: f64, returns: f64) -> MonthlySnapshot {
        MonthlySnapshot {
            month,
            phase: Phase::Distribution,
            starting_balance: starting,
            ending_balance: starting - withdrawals + returns,
            income: 0.0,
            expenses: 0.0,
            estimated_tax: 0.0,
            target_withdrawal: withdrawals,
            adjusted_withdrawal: withdrawals,
            met_target: true,
            flows: vec![AccountMonthlyFlow {
                account_id: "a".to_string(),
                starting_balance: starting,
                deposits: 0.0,
                withdrawals,
                returns,
                ending_balance: starting - withdrawals + returns,
            }],
        }
    }

    #[test]
    fn total_balance_is_the_sum_of_accounts() {
        let state = two_account_state();
        assert_eq!(state.total_balance(), 15_000.0);
        assert_eq!(state.initial_balance(), 15_000.0);
        assert_eq!(state.high_water_mark(), 15_000.0);
    }

    #[test]
    fn unknown_account_is_a_silent_no_op() {
        let mut state = two_account_state();
        assert_eq!(state.withdraw("missing", 1_000.0), Ok(0.0));
        state.deposit("missing", 1_000.0).expect("no-op");
        assert_eq!(state.total_balance(), 15_000.0);
        assert_eq!(state.cumulative_withdrawals(), 0.0);
    }

    #[test]
    fn negative_amounts_are_rejected_before_lookup() {
        let mut state = two_account_state();
        assert!(state.withdraw("a", -1.0).is_err());
        assert!(state.deposit("missing", -1.0).is_err());
    }

    #[test]
    fn partial_withdrawal_drains_and_reports_the_lesser_amount() {
        let mut state = two_account_state();
        let actual = state.withdraw("b", 9_999.0).expect("valid");
        assert_eq!(actual, 5_000.0);
        assert_eq!(state.account("b").map(|a| a.balance()), Some(0.0));
        assert_eq!(state.cumulative_withdrawals(), 5_000.0);
    }

    #[test]
    fn apply_returns_reports_per_account_deltas_and_clamps() {
        let mut state = two_account_state();
        let deltas = state.apply_returns(-1.5);
        assert_eq!(deltas.len(), 2);
        for (_, delta) in &deltas {
            assert!(*delta < 0.0);
        }
        assert_eq!(state.total_balance(), 0.0);
    }

    #[test]
    fn high_water_mark_tracks_the_running_maximum() {
        let mut state = two_account_state();
        state.apply_returns(0.10);
        let peak = state.high_water_mark();
        assert!((peak - 16_500.0).abs() < 1e-9);

        state.withdraw("a", 8_000.0).expect("valid");
        assert_eq!(state.high_water_mark(), peak);

        state.apply_returns(-0.5);
        assert_eq!(state.high_water_mark(), peak);
    }

    #[test]
    fn portfolio_allocation_is_balance_weighted() {
        let mut state = SimulationState::new(vec![
            AccountState::new(
                "stocks",
                "stocks",
                AccountKind::Brokerage,
                TaxTreatment::Taxable,
                false,
                AssetAllocation {
                    stocks: 1.0,
                    bonds: 0.0,
                },
                30_000.0,
            )
            .expect("valid"),
            AccountState::new(
                "bonds",
                "bonds",
                AccountKind::Brokerage,
                TaxTreatment::Taxable,
                false,
                AssetAllocation {
                    stocks: 0.0,
                    bonds: 1.0,
                },
                10_000.0,
            )
            .expect("valid"),
        ]);
        let allocation = state.portfolio_allocation();
        assert!((allocation.stocks - 0.75).abs() < 1e-9);
        assert!((allocation.bonds - 0.25).abs() < 1e-9);

        state.withdraw("stocks", 30_000.0).expect("valid");
        state.withdraw("bonds", 10_000.0).expect("valid");
        let empty = state.portfolio_allocation();
        assert_eq!(empty.stocks, 0.0);
        assert_eq!(empty.bonds, 0.0);
    }

    #[test]
    fn prior_year_spending_uses_a_trailing_window() {
        let mut state = two_account_state();
        for i in 0..18 {
            let month = ymd(2030 + i / 12, (i % 12) as u32 + 1, 1);
            state.record_history(snapshot_for(month, 15_000.0, 100.0, 0.0));
        }
        // 12 months strictly before July 2031: Jul 2030 .. Jun 2031.
        assert!((state.prior_year_spending(ymd(2031, 7, 1)) - 1_200.0).abs() < 1e-9);
        // Only six recorded months precede July 2030.
        assert!((state.prior_year_spending(ymd(2030, 7, 1)) - 600.0).abs() < 1e-9);
        assert_eq!(state.prior_year_spending(ymd(2030, 1, 1)), 0.0);
    }

    #[test]
    fn prior_year_return_requires_a_full_year() {
        let mut state = two_account_state();
        for i in 0..11 {
            state.record_history(snapshot_for(ymd(2030, i + 1, 1), 10_000.0, 0.0, 50.0));
        }
        assert_eq!(state.prior_year_return(ymd(2030, 12, 1)), 0.0);

        state.record_history(snapshot_for(ymd(2030, 12, 1), 10_000.0, 0.0, 50.0));
        let annual = state.prior_year_return(ymd(2031, 1, 1));
        assert!((annual - 600.0 / 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn ratchet_timestamp_measures_elapsed_years() {
        let mut state = two_account_state();
        assert_eq!(state.years_since_last_ratchet(ymd(2030, 1, 1)), f64::INFINITY);
        assert_eq!(state.ratchet_level(), None);

        state.mark_ratchet(ymd(2030, 1, 1), 43_200.0);
        let elapsed = state.years_since_last_ratchet(ymd(2033, 1, 1));
        assert!((elapsed - 3.0).abs() < 0.01);
        assert_eq!(state.last_ratchet(), Some(ymd(2030, 1, 1)));
        assert_eq!(state.ratchet_level(), Some(43_200.0));

        state.mark_ratchet(ymd(2033, 1, 1), 38_880.0);
        assert_eq!(state.ratchet_level(), Some(38_880.0));
    }

    proptest! {
        #[test]
        fn high_water_mark_never_decreases(
            ops in proptest::collection::vec((0u8..3, 0.0f64..20_000.0), 1..40)
        ) {
            let mut state = two_account_state();
            let mut previous = state.high_water_mark();
            for (op, amount) in ops {
                match op {
                    0 => { state.deposit("a", amount).expect("valid"); }
                    1 => { state.withdraw("a", amount).expect("valid"); }
                    _ => { state.apply_returns(amount / 10_000.0 - 1.0); }
                }
                let current = state.high_water_mark();
                prop_assert!(current >= previous);
                previous = current;
            }
        }
    }
}
