mod engine;
pub mod error;
pub mod jurisdiction;
pub mod ltc;
pub mod market;
pub mod normalize;
pub mod solver;
pub mod stats;
pub mod tax;
pub mod types;
pub mod withdrawal;

pub use engine::{Progress, run_simulation, run_simulation_with_progress, run_yearly_cashflow_trace};
pub use error::{Result, SimulationError};
pub use normalize::{FinancialRecord, normalize};
pub use solver::{GoalSolveConfig, GoalSolveResult, GoalType, solve_goal};
pub use types::{
    CashflowYearResult, IterationLedger, PercentileBands, SimulationParameters, SimulationResult,
    YearRecord,
};
