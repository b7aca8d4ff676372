use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{Datelike, Months, NaiveDate};
use log::{debug, warn};
use serde::Serialize;

use super::account::{AccountSnapshot, AccountState, AssetAllocation, TaxTreatment};
use super::calculators::Calculators;
use super::config::SimulationConfig;
use super::error::ValidationError;
use super::income::{aggregate_income, funding_gap, whole_years_between};
use super::ledger::{AccountMonthlyFlow, MonthlySnapshot, SimulationState};
use super::phase::{Phase, derive_phase};
use super::sequence::{SequencePolicy, sequence};
use super::spending::SpendingContext;
use super::withdrawal::{SpendingPlan, build_plan};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub months_simulated: u32,
    pub ending_balance: f64,
    pub high_water_mark: f64,
    pub cumulative_withdrawals: f64,
    pub depleted_month: Option<NaiveDate>,
    pub ending_accounts: Vec<AccountSnapshot>,
    pub history: Vec<MonthlySnapshot>,
}

pub struct SimulationEngine {
    config: SimulationConfig,
    calculators: Calculators,
    state: SimulationState,
    rng: Rng,
    months_elapsed: u32,
    depleted_month: Option<NaiveDate>,
    shortfall_seen: bool,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig, calculators: Calculators) -> Result<Self, ValidationError> {
        config.validate()?;

        let accounts = config
            .accounts
            .iter()
            .map(|a| {
                AccountState::new(
                    a.id.clone(),
                    a.name.clone(),
                    a.kind,
                    a.tax_treatment,
                    a.rmd_subject,
                    a.allocation,
                    a.opening_balance,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rng = Rng::new(config.seed);
        Ok(Self {
            config,
            calculators,
            state: SimulationState::new(accounts),
            rng,
            months_elapsed: 0,
            depleted_month: None,
            shortfall_seen: false,
        })
    }

    pub fn with_default_calculators(config: SimulationConfig) -> Result<Self, ValidationError> {
        let calculators = Calculators::with_market_rates(
            config.market.stock_mean,
            config.market.bond_mean,
            config.market.cash_rate,
        );
        Self::new(config, calculators)
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn current_month(&self) -> NaiveDate {
        self.config.start_month + Months::new(self.months_elapsed)
    }

    // One simulated month: income, then the funding gap, then a spending
    // decision turned into a sequenced withdrawal plan, then returns and
    // contributions, then a history record. Depletion is recorded but never
    // stops the loop.
    pub fn step(&mut self) {
        let month = self.current_month();
        let phase = derive_phase(month, &self.config.profiles);
        self.sync_flags(phase);

        let starting = self.state.snapshots();
        let starting_balance = self.state.total_balance();
        let mut flows: Vec<AccountMonthlyFlow> = starting
            .iter()
            .map(|a| AccountMonthlyFlow {
                account_id: a.id.clone(),
                starting_balance: a.balance,
                deposits: 0.0,
                withdrawals: 0.0,
                returns: 0.0,
                ending_balance: a.balance,
            })
            .collect();
        let index: BTreeMap<&str, usize> = starting
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.as_str(), i))
            .collect();

        let income = aggregate_income(
            month,
            &self.config.profiles,
            self.calculators.social_security.as_ref(),
        );
        let monthly_income = income.total();
        let monthly_expenses = self.config.expenses.monthly_expenses(phase);
        let gap = funding_gap(monthly_expenses, monthly_income);
        let annual_income_base =
            12.0 * (income.salary + income.pension + 0.85 * income.social_security);
        // Rolling one-year taxable base: the trailing eleven recorded months
        // plus whatever this period actually withdraws.
        let mut taxable_withdrawn = self.trailing_taxable_withdrawals();
        let mut swept = false;

        let mut plan = SpendingPlan::empty(self.config.strategy.name());
        if matches!(phase, Phase::Distribution | Phase::Survivor) {
            let rmd_due = self.monthly_rmd_due(month);
            let ctx = self.spending_context(
                month,
                monthly_income,
                monthly_expenses,
                annual_income_base + taxable_withdrawn,
            );
            let decision = self.config.strategy.decide(&ctx);
            if let Some(direction) = decision.ratchet {
                debug!("{month}: guardrails ratchet {direction:?}");
                self.state.mark_ratchet(month, decision.annual_amount);
            }

            // RMDs set a floor under whatever the strategy wants.
            let target = (decision.annual_amount / 12.0).max(rmd_due);
            let policy = if rmd_due > 0.0 {
                SequencePolicy::RmdFirst
            } else {
                self.config.sequence_policy
            };
            let ordered = sequence(policy, &starting);
            plan = build_plan(target, &ordered, self.config.strategy.name());

            for withdrawal in &plan.withdrawals {
                let actual = self
                    .state
                    .withdraw(&withdrawal.account.id, withdrawal.amount)
                    .unwrap_or(0.0);
                if let Some(&i) = index.get(withdrawal.account.id.as_str()) {
                    flows[i].withdrawals += actual;
                }
                if withdrawal.is_taxable() {
                    taxable_withdrawn += actual;
                }
            }

            if !plan.meets_target {
                if self.shortfall_seen {
                    debug!(
                        "{month}: shortfall of {:.2} against target {:.2}",
                        plan.shortfall(),
                        plan.target_withdrawal
                    );
                } else {
                    warn!(
                        "{month}: first shortfall, {:.2} raised against target {:.2}",
                        plan.adjusted_withdrawal, plan.target_withdrawal
                    );
                    self.shortfall_seen = true;
                }
            }
        } else if phase == Phase::Transition && gap.surplus > 0.0 {
            // Excess retirement income parks in the first taxable account.
            if let Some(taxable) = starting
                .iter()
                .find(|a| a.tax_treatment == TaxTreatment::Taxable)
            {
                if self.state.deposit(&taxable.id, gap.surplus).is_ok() {
                    if let Some(&i) = index.get(taxable.id.as_str()) {
                        flows[i].deposits += gap.surplus;
                    }
                    swept = true;
                }
            }
        }

        // Refill mode reflects the current period only: set while surplus
        // income is flowing into taxable, cleared the period the sweep stops.
        let flags = self.state.flags().clone().with_refill_mode(swept);
        self.state.set_flags(flags);

        let allocation = self.state.portfolio_allocation();
        let monthly_rate = self.sample_monthly_rate(allocation);
        for (id, delta) in self.state.apply_returns(monthly_rate) {
            if let Some(&i) = index.get(id.as_str()) {
                flows[i].returns += delta;
            }
        }

        if phase == Phase::Accumulation {
            let years = whole_years_between(self.config.start_month, month);
            let multiplier = (1.0 + self.config.contribution_growth_rate).powi(years as i32);
            let contributions: Vec<(String, f64)> = self
                .config
                .accounts
                .iter()
                .filter(|a| a.monthly_contribution > 0.0)
                .map(|a| (a.id.clone(), a.monthly_contribution * multiplier))
                .collect();
            for (id, amount) in contributions {
                if self.state.deposit(&id, amount).is_ok() {
                    if let Some(&i) = index.get(id.as_str()) {
                        flows[i].deposits += amount;
                    }
                }
            }
        }

        for flow in &mut flows {
            flow.ending_balance = self
                .state
                .account(&flow.account_id)
                .map(AccountState::balance)
                .unwrap_or(0.0);
        }

        let estimated_tax = self
            .calculators
            .tax
            .federal_tax(annual_income_base + taxable_withdrawn, self.config.filing_status)
            / 12.0;

        let ending_balance = self.state.total_balance();
        if self.depleted_month.is_none() && ending_balance <= 1e-9 {
            warn!("{month}: portfolio depleted, later periods draw on nothing");
            self.depleted_month = Some(month);
        }

        self.state.record_history(MonthlySnapshot {
            month,
            phase,
            starting_balance,
            ending_balance,
            income: monthly_income,
            expenses: monthly_expenses,
            estimated_tax,
            target_withdrawal: plan.target_withdrawal,
            adjusted_withdrawal: plan.adjusted_withdrawal,
            met_target: plan.meets_target,
            flows,
        });
        self.months_elapsed += 1;
    }

    pub fn run(mut self) -> SimulationResult {
        for _ in 0..self.config.horizon_months {
            self.step();
        }

        SimulationResult {
            months_simulated: self.months_elapsed,
            ending_balance: self.state.total_balance(),
            high_water_mark: self.state.high_water_mark(),
            cumulative_withdrawals: self.state.cumulative_withdrawals(),
            depleted_month: self.depleted_month,
            ending_accounts: self.state.snapshots(),
            history: self.state.into_history(),
        }
    }

    fn sync_flags(&mut self, phase: Phase) {
        let survivor = phase == Phase::Survivor;
        let mut flags = self.state.flags().clone().with_survivor_mode(survivor);
        if survivor {
            for category in self.config.expenses.survivor_contingency_categories() {
                flags = flags.with_contingency(category, true);
            }
        }
        self.state.set_flags(flags);
    }

    fn spending_context(
        &self,
        month: NaiveDate,
        monthly_income: f64,
        monthly_expenses: f64,
        annual_taxable_income: f64,
    ) -> SpendingContext {
        let primary = self
            .config
            .profiles
            .iter()
            .find(|p| p.is_alive(month))
            .unwrap_or(&self.config.profiles[0]);
        let years_in_retirement = if month >= primary.retirement_date {
            (month - primary.retirement_date).num_days() as f64 / 365.25
        } else {
            0.0
        };

        // Trailing-spending figures only become meaningful once a full year
        // has been recorded; before that, strategies fall back to their
        // initial-rate behavior.
        let full_year = self.months_elapsed >= 12;

        SpendingContext {
            accounts: self.state.snapshots(),
            total_balance: self.state.total_balance(),
            annual_expenses: monthly_expenses * 12.0,
            annual_other_income: monthly_income * 12.0,
            month,
            age: primary.age_on(month),
            birth_year: primary.birth_year(),
            years_in_retirement,
            initial_balance: self.state.initial_balance(),
            prior_year_spending: if full_year {
                self.state.prior_year_spending(month)
            } else {
                0.0
            },
            ratcheted_spending: self.state.ratchet_level(),
            prior_year_return: self.state.prior_year_return(month),
            years_since_last_ratchet: self.state.years_since_last_ratchet(month),
            taxable_income: annual_taxable_income,
            filing_status: self.config.filing_status,
            params: BTreeMap::new(),
        }
    }

    // Annual RMD obligation across subject accounts, spread evenly over the
    // year. The basis is the prior December ending balance; with no history
    // that far back, the current balance stands in.
    fn monthly_rmd_due(&self, month: NaiveDate) -> f64 {
        let rmd = self.calculators.rmd.as_ref();
        let mut annual_due = 0.0;

        for account_config in &self.config.accounts {
            let Some(account) = self.state.account(&account_config.id) else {
                continue;
            };
            if !account.rmd_subject() || !rmd.is_subject(account.tax_treatment()) {
                continue;
            }

            let owner = account_config
                .owner
                .as_deref()
                .and_then(|name| self.config.profiles.iter().find(|p| p.name == name))
                .unwrap_or(&self.config.profiles[0]);
            if !owner.is_alive(month) {
                continue;
            }
            let age = owner.age_on(month);
            if age < rmd.start_age(owner.birth_year()) {
                continue;
            }

            let basis = self
                .prior_year_end_balance(&account_config.id, month)
                .unwrap_or_else(|| account.balance());
            annual_due += rmd.required_distribution(basis, age);
        }

        annual_due / 12.0
    }

    fn trailing_taxable_withdrawals(&self) -> f64 {
        self.state
            .history()
            .iter()
            .rev()
            .take(11)
            .flat_map(|s| s.flows.iter())
            .filter(|f| {
                self.state.account(&f.account_id).is_some_and(|a| {
                    matches!(
                        a.tax_treatment(),
                        TaxTreatment::Taxable | TaxTreatment::PreTax
                    )
                })
            })
            .map(|f| f.withdrawals)
            .sum()
    }

    fn prior_year_end_balance(&self, id: &str, month: NaiveDate) -> Option<f64> {
        self.state
            .history()
            .iter()
            .rev()
            .find(|s| s.month.year() < month.year())
            .and_then(|s| s.flows.iter().find(|f| f.account_id == id))
            .map(|f| f.ending_balance)
    }

    fn sample_monthly_rate(&mut self, allocation: AssetAllocation) -> f64 {
        let annual_mean = self.calculators.returns.blended_annual_rate(allocation);
        let deterministic = self.calculators.returns.growth_over_months(annual_mean, 1) - 1.0;
        if self.config.market.is_deterministic() {
            return deterministic;
        }

        let z1 = self.rng.standard_normal();
        let z2 = self.rng.standard_normal();
        let corr = self.config.market.stock_bond_correlation;
        let orth = (1.0 - corr * corr).max(0.0).sqrt();
        let monthly_scale = (12.0_f64).sqrt();

        let stock_shock = allocation.stocks * self.config.market.stock_vol / monthly_scale * z1;
        let bond_shock = allocation.bonds * self.config.market.bond_vol / monthly_scale
            * (corr * z1 + orth * z2);
        (deterministic + stock_shock + bond_shock).clamp(-0.5, 0.5)
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloSummary {
    pub runs: u32,
    pub success_rate: f64,
    pub median_ending_balance: f64,
    pub p10_ending_balance: f64,
    pub median_cumulative_withdrawals: f64,
    pub median_high_water_mark: f64,
}

// Every run owns a fresh ledger and a private random stream derived from the
// base seed, so the summary is reproducible for a given seed and run count.
pub fn run_monte_carlo(
    config: &SimulationConfig,
    runs: u32,
) -> Result<MonteCarloSummary, ValidationError> {
    if runs == 0 {
        return Err(ValidationError::invalid(
            "monte carlo requires at least one run",
        ));
    }
    config.validate()?;

    let mut successes = 0_u32;
    let mut endings = Vec::with_capacity(runs as usize);
    let mut withdrawals = Vec::with_capacity(runs as usize);
    let mut peaks = Vec::with_capacity(runs as usize);

    for run_id in 0..runs {
        let mut run_config = config.clone();
        run_config.seed = derive_seed(config.seed, run_id);
        let result = SimulationEngine::with_default_calculators(run_config)?.run();

        if result.depleted_month.is_none() {
            successes += 1;
        }
        endings.push(result.ending_balance);
        withdrawals.push(result.cumulative_withdrawals);
        peaks.push(result.high_water_mark);
    }

    Ok(MonteCarloSummary {
        runs,
        success_rate: successes as f64 / runs as f64,
        median_ending_balance: percentile(&mut endings, 50.0),
        p10_ending_balance: percentile(&mut endings, 10.0),
        median_cumulative_withdrawals: percentile(&mut withdrawals, 50.0),
        median_high_water_mark: percentile(&mut peaks, 50.0),
    })
}

fn derive_seed(base_seed: u64, run_id: u32) -> u64 {
    splitmix64(base_seed ^ ((run_id as u64) << 32))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// xorshift64* with a Box-Muller cache; no external RNG dependency and byte
// identical streams across platforms.
struct Rng {
    state: u64,
    cached_normal: Option<f64>,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self {
            state,
            cached_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }
}

// Linear interpolation between order statistics.
fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
