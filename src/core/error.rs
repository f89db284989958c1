use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("discount rate must be finite and greater than -100%, got {rate}")]
    InvalidRate { rate: f64 },

    #[error("{what} must be finite")]
    NonFiniteInput { what: &'static str },

    #[error("computation produced a non-finite value")]
    NonFiniteResult,

    #[error("scenario for year {year} must satisfy low <= mode <= high, got ({low}, {mode}, {high})")]
    InvalidScenario {
        year: usize,
        low: f64,
        mode: f64,
        high: f64,
    },

    #[error("at least one scenario year is required")]
    EmptyScenarios,

    #[error("number of simulations must be > 0")]
    ZeroSimulations,

    #[error("cannot summarize an empty distribution")]
    EmptyDistribution,

    #[error("payback is undefined: non-positive cash flow in recovery year {year}")]
    UndefinedPayback { year: usize },

    #[error("simulation cancelled")]
    Cancelled,

    #[error("simulation exceeded its deadline")]
    DeadlineExceeded,
}
