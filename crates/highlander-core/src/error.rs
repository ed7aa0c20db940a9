//! Error taxonomy for the simulation.
//!
//! Timeouts and cancellation are deliberately absent: they surface as boolean
//! or best-effort outcomes on the operations that can hit them.

/// Errors produced while configuring or constructing a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown fight mode: {0} (expected `ordered` or `naive`)")]
    InvalidFightMode(String),

    #[error("invalid value for {var}: {value}")]
    InvalidEnvValue { var: String, value: String },
}

/// Errors produced by the bank-transfer strategies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: u64,
        balance: i64,
        requested: i64,
    },

    #[error("cannot transfer from account {0} to itself")]
    SameAccount(u64),

    #[error("could not acquire both account locks within {waited_ms} ms")]
    LockTimeout { waited_ms: u64 },
}

/// Result type for simulation construction and configuration.
pub type Result<T> = std::result::Result<T, SimulationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_error_display() {
        let err = SimulationError::InvalidConfig("reap interval must be non-zero".to_string());
        assert!(err.to_string().contains("invalid configuration"));

        let err = SimulationError::InvalidFightMode("chaotic".to_string());
        assert!(err.to_string().contains("chaotic"));
        assert!(err.to_string().contains("ordered"));
    }

    #[test]
    fn test_transfer_error_display() {
        let err = TransferError::InsufficientFunds {
            account: 1,
            balance: 5,
            requested: 10,
        };
        assert!(err.to_string().contains("insufficient funds"));
        assert!(err.to_string().contains("account 1"));

        let err = TransferError::LockTimeout { waited_ms: 250 };
        assert!(err.to_string().contains("250 ms"));
    }
}
