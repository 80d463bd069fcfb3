use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("numeric degeneracy in {context}")]
    NumericDegeneracy { context: String },

    #[error("solver configuration: {0}")]
    Solver(String),
}

impl SimulationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    pub fn degenerate(context: impl Into<String>) -> Self {
        Self::NumericDegeneracy {
            context: context.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
