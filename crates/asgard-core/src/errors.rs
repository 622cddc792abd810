//! Error types for Asgard

use thiserror::Error;

/// Errors surfaced by handlers, managers and the keeper
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid address: {message}")]
    InvalidAddress { message: String },

    #[error("Unknown request: {message}")]
    UnknownRequest { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("fail swap: {message}")]
    SwapFail { message: String },

    /// Matched by string downstream; keep the wording stable.
    #[error("emit asset {emit} less than price limit {limit}")]
    PriceLimit { emit: u64, limit: u64 },

    #[error("fail swap, not enough fee: {message}")]
    SwapFailNotEnoughFee { message: String },

    #[error("fail swap, not enough balance: {message}")]
    NotEnoughBalance { message: String },

    #[error("fail swap, invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("fail swap, invalid balance: {message}")]
    InvalidBalance { message: String },

    #[error("prepare outbound tx not successful: {message}")]
    FailAddOutboundTx { message: String },

    /// Matched by string downstream; keep the wording stable.
    #[error("outbound amount does not meet requirements ({net}/{min})")]
    OutboundRequirements { net: u64, min: u64 },

    #[error("not enough asset to pay for fees")]
    NotEnoughToPayFee,

    #[error("yggdrasil vault still holds funds, return requested")]
    ReturnYgg,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Asgard operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn unknown_request(message: impl Into<String>) -> Self {
        Self::UnknownRequest {
            message: message.into(),
        }
    }

    pub fn swap_fail(message: impl Into<String>) -> Self {
        Self::SwapFail {
            message: message.into(),
        }
    }

    /// Stable identifier for logs and refund events
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAddress { .. } => "invalid_address",
            Self::UnknownRequest { .. } => "unknown_request",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Conflict { .. } => "conflict",
            Self::Internal { .. } => "internal",
            Self::SwapFail { .. } | Self::PriceLimit { .. } => "swap_fail",
            Self::SwapFailNotEnoughFee { .. } => "swap_fail_not_enough_fee",
            Self::NotEnoughBalance { .. } => "swap_fail_not_enough_balance",
            Self::InvalidAmount { .. } => "swap_fail_invalid_amount",
            Self::InvalidBalance { .. } => "swap_fail_invalid_balance",
            Self::FailAddOutboundTx { .. } | Self::OutboundRequirements { .. } => {
                "fail_add_outbound_tx"
            }
            Self::NotEnoughToPayFee => "not_enough_to_pay_fee",
            Self::ReturnYgg => "return_yggdrasil",
            Self::Store(_) => "store",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Numeric code reported to the consensus engine and carried by refunds
    pub fn code(&self) -> u32 {
        match self {
            Self::Unauthorized { .. } => 4,
            Self::UnknownRequest { .. } => 6,
            Self::InvalidAddress { .. } => 7,
            Self::Conflict { .. } => 36,
            Self::Internal { .. } | Self::Store(_) | Self::Serialization(_) => 99,
            Self::SwapFail { .. } | Self::PriceLimit { .. } => 108,
            Self::SwapFailNotEnoughFee { .. } => 110,
            Self::InvalidAmount { .. } => 113,
            Self::InvalidBalance { .. } => 114,
            Self::NotEnoughBalance { .. } => 115,
            Self::FailAddOutboundTx { .. } | Self::OutboundRequirements { .. } => 131,
            Self::NotEnoughToPayFee => 133,
            Self::ReturnYgg => 145,
        }
    }

    /// Swap failures that leave pool state untouched and can be refunded
    pub fn is_swap_failure(&self) -> bool {
        matches!(
            self,
            Self::SwapFail { .. }
                | Self::PriceLimit { .. }
                | Self::SwapFailNotEnoughFee { .. }
                | Self::NotEnoughBalance { .. }
                | Self::InvalidAmount { .. }
                | Self::InvalidBalance { .. }
                | Self::FailAddOutboundTx { .. }
                | Self::OutboundRequirements { .. }
                | Self::NotEnoughToPayFee
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::unknown_request("cannot unbond while node is active");
        assert_eq!(err.error_code(), "unknown_request");
        assert_eq!(err.code(), 6);

        let err = Error::ReturnYgg;
        assert_eq!(err.error_code(), "return_yggdrasil");
        assert!(!err.is_swap_failure());
    }

    #[test]
    fn test_price_limit_message() {
        let err = Error::PriceLimit {
            emit: 100,
            limit: 120,
        };
        assert_eq!(err.to_string(), "emit asset 100 less than price limit 120");
        assert!(err.is_swap_failure());
    }

    #[test]
    fn test_outbound_requirements_message() {
        let err = Error::OutboundRequirements { net: 5, min: 10 };
        assert_eq!(
            err.to_string(),
            "outbound amount does not meet requirements (5/10)"
        );
        assert_eq!(err.code(), 131);
    }
}
