mod account;
mod calculators;
mod config;
mod engine;
mod error;
mod flags;
mod income;
mod ledger;
mod phase;
mod sequence;
mod spending;
mod withdrawal;

pub use account::{AccountKind, AccountSnapshot, AccountState, AssetAllocation, TaxTreatment};
pub use calculators::{
    BlendedReturnModel, Calculators, FederalBracketTax, FilingStatus, RmdCalculator,
    ReturnCalculator, SocialSecurityCalculator, SsaBenefitRules, TaxCalculator, UniformLifetimeRmd,
};
pub use config::{AccountConfig, ExpensePlan, MarketModel, SimulationConfig};
pub use engine::{MonteCarloSummary, SimulationEngine, SimulationResult, run_monte_carlo};
pub use error::ValidationError;
pub use flags::SimulationFlags;
pub use income::{
    FundingGap, MonthlyIncome, PensionProfile, PersonProfile, SocialSecurityProfile,
    aggregate_income, funding_gap,
};
pub use ledger::{AccountMonthlyFlow, MonthlySnapshot, SimulationState};
pub use phase::{Phase, derive_phase};
pub use sequence::{SequencePolicy, sequence};
pub use spending::{
    GuardrailsConfig, RatchetDirection, SpendingContext, SpendingDecision, SpendingStrategy,
};
pub use withdrawal::{AccountWithdrawal, SpendingPlan, build_plan};

#[cfg(test)]
pub use config::test_support;
