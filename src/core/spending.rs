use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::account::AccountSnapshot;
use super::calculators::FilingStatus;
use super::error::ValidationError;

// Everything a strategy may look at for one decision. Built fresh each period
// and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct SpendingContext {
    pub accounts: Vec<AccountSnapshot>,
    pub total_balance: f64,
    pub annual_expenses: f64,
    pub annual_other_income: f64,
    pub month: NaiveDate,
    pub age: u32,
    pub birth_year: i32,
    pub years_in_retirement: f64,
    pub initial_balance: f64,
    pub prior_year_spending: f64,
    // Annual spending level set by the most recent guardrails ratchet, if any.
    // Survives between adjustments so a cut or raise holds until the next one.
    pub ratcheted_spending: Option<f64>,
    pub prior_year_return: f64,
    pub years_since_last_ratchet: f64,
    pub taxable_income: f64,
    pub filing_status: FilingStatus,
    pub params: BTreeMap<String, f64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RatchetDirection {
    Increase,
    Decrease,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpendingDecision {
    pub annual_amount: f64,
    pub ratchet: Option<RatchetDirection>,
}

impl SpendingDecision {
    fn flat(annual_amount: f64) -> Self {
        Self {
            annual_amount,
            ratchet: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailsConfig {
    pub initial_rate: f64,
    pub upper_multiplier: Option<f64>,
    pub lower_multiplier: Option<f64>,
    #[serde(default)]
    pub decrease_adjustment: f64,
    #[serde(default)]
    pub increase_adjustment: f64,
    #[serde(default)]
    pub minimum_years_between_ratchets: f64,
    #[serde(default = "default_true")]
    pub allow_spending_cuts: bool,
    pub floor: Option<f64>,
    pub ceiling: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl GuardrailsConfig {
    // Guyton-Klinger: 20% bands around the initial rate, 10% adjustments in
    // either direction, at most one adjustment per year.
    pub fn guyton_klinger(initial_rate: f64) -> Self {
        Self {
            initial_rate,
            upper_multiplier: Some(1.2),
            lower_multiplier: Some(0.8),
            decrease_adjustment: 0.10,
            increase_adjustment: 0.10,
            minimum_years_between_ratchets: 1.0,
            allow_spending_cuts: true,
            floor: None,
            ceiling: None,
        }
    }

    // Vanguard dynamic spending: wide bands, small annual ceiling/floor moves.
    pub fn vanguard(initial_rate: f64) -> Self {
        Self {
            initial_rate,
            upper_multiplier: Some(1.5),
            lower_multiplier: Some(0.75),
            decrease_adjustment: 0.025,
            increase_adjustment: 0.05,
            minimum_years_between_ratchets: 1.0,
            allow_spending_cuts: true,
            floor: None,
            ceiling: None,
        }
    }

    // Kitces one-way ratchet: spending only ever steps up, 10% at a time,
    // after the portfolio has outgrown the plan and a three-year cooldown.
    pub fn kitces_ratchet(initial_rate: f64) -> Self {
        Self {
            initial_rate,
            upper_multiplier: None,
            lower_multiplier: Some(0.8),
            decrease_adjustment: 0.0,
            increase_adjustment: 0.10,
            minimum_years_between_ratchets: 3.0,
            allow_spending_cuts: false,
            floor: None,
            ceiling: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.initial_rate) || self.initial_rate <= 0.0 {
            return Err(ValidationError::invalid(
                "guardrails initial rate must be within (0, 1]",
            ));
        }
        if !(0.0..1.0).contains(&self.decrease_adjustment)
            || self.increase_adjustment < 0.0
            || self.minimum_years_between_ratchets < 0.0
        {
            return Err(ValidationError::invalid(
                "guardrails adjustments must be non-negative and cuts below 100%",
            ));
        }
        if let (Some(floor), Some(ceiling)) = (self.floor, self.ceiling) {
            if floor > ceiling {
                return Err(ValidationError::invalid(
                    "guardrails floor must not exceed ceiling",
                ));
            }
        }
        Ok(())
    }
}

// Closed set of strategy families selected at configuration time; each is a
// pure function over the context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SpendingStrategy {
    Fixed { annual_amount: f64 },
    PercentOfPortfolio { rate: f64 },
    Guardrails(GuardrailsConfig),
}

impl SpendingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SpendingStrategy::Fixed { .. } => "fixed",
            SpendingStrategy::PercentOfPortfolio { .. } => "percent-of-portfolio",
            SpendingStrategy::Guardrails(_) => "guardrails",
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            SpendingStrategy::Fixed { annual_amount } => {
                if *annual_amount < 0.0 {
                    return Err(ValidationError::NegativeAmount {
                        context: "fixed annual amount",
                        amount: *annual_amount,
                    });
                }
            }
            SpendingStrategy::PercentOfPortfolio { rate } => {
                if !(0.0..=1.0).contains(rate) {
                    return Err(ValidationError::invalid(
                        "portfolio withdrawal rate must be within [0, 1]",
                    ));
                }
            }
            SpendingStrategy::Guardrails(config) => config.validate()?,
        }
        Ok(())
    }

    pub fn decide(&self, ctx: &SpendingContext) -> SpendingDecision {
        match self {
            SpendingStrategy::Fixed { annual_amount } => SpendingDecision::flat(*annual_amount),
            SpendingStrategy::PercentOfPortfolio { rate } => {
                SpendingDecision::flat(rate * ctx.total_balance.max(0.0))
            }
            SpendingStrategy::Guardrails(config) => decide_guardrails(config, ctx),
        }
    }
}

fn decide_guardrails(config: &GuardrailsConfig, ctx: &SpendingContext) -> SpendingDecision {
    // Once a ratchet has fired, its adjusted level is the base for every
    // later period until the next adjustment. Before any ratchet, trailing
    // spending is the base; the first year has neither and falls back to the
    // configured initial rate against the starting portfolio.
    let base = match ctx.ratcheted_spending {
        Some(level) => level,
        None if ctx.prior_year_spending > 0.0 => ctx.prior_year_spending,
        None => config.initial_rate * ctx.initial_balance,
    };

    // A depleted portfolio defines the withdrawal rate as zero rather than
    // dividing by zero.
    let current_rate = if ctx.total_balance <= 0.0 {
        0.0
    } else if ctx.ratcheted_spending.is_some() || ctx.prior_year_spending > 0.0 {
        base / ctx.total_balance
    } else {
        config.initial_rate
    };

    let cooldown_open = ctx.years_since_last_ratchet >= config.minimum_years_between_ratchets;
    let mut amount = base;
    let mut ratchet = None;

    if let Some(upper) = config.upper_multiplier {
        // Capital preservation: spending has grown too large relative to what
        // remains, cut it back.
        if config.allow_spending_cuts
            && cooldown_open
            && current_rate > upper * config.initial_rate
        {
            amount = base * (1.0 - config.decrease_adjustment);
            ratchet = Some(RatchetDirection::Decrease);
        }
    }

    if ratchet.is_none() && current_rate > 0.0 {
        if let Some(lower) = config.lower_multiplier {
            // Prosperity: the portfolio has outgrown the plan, ratchet up.
            if cooldown_open && current_rate < lower * config.initial_rate {
                amount = base * (1.0 + config.increase_adjustment);
                ratchet = Some(RatchetDirection::Increase);
            }
        }
    }

    if let Some(floor) = config.floor {
        amount = amount.max(floor);
    }
    if let Some(ceiling) = config.ceiling {
        amount = amount.min(ceiling);
    }

    SpendingDecision {
        annual_amount: amount,
        ratchet,
    }
}
