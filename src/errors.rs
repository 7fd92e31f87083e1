use chrono::{DateTime, Utc};
use http::StatusCode;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Broad category of a [`ServiceError`].
///
/// Only validation and not-found errors are worded for the shopper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad coupon, expired coupon, minimum purchase, quantity range and the like.
    Validation,
    NotFound,
    /// Usage-limit races and refund allocations that would overrun the order coupon.
    Consistency,
    System,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Coupon {0} not found")]
    CouponNotFound(String),

    #[error("Coupon {0} is not active")]
    CouponInactive(String),

    #[error("Coupon {code} is not valid before {starts_at}")]
    CouponNotStarted {
        code: String,
        starts_at: DateTime<Utc>,
    },

    #[error("Coupon {code} expired at {expired_at}")]
    CouponExpired {
        code: String,
        expired_at: DateTime<Utc>,
    },

    #[error("Coupon {0} has reached its usage limit")]
    CouponUsageLimitReached(String),

    #[error("A minimum purchase of {required} is required for this coupon (cart subtotal is {subtotal})")]
    MinimumPurchaseNotMet { required: Decimal, subtotal: Decimal },

    #[error("Quantity {quantity} is outside the allowed range {min}..={max}")]
    QuantityOutOfRange { quantity: i32, min: i32, max: i32 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Insufficient wallet balance: {required} required, {available} available")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Coupon allocation of {requested} on order {order_id} exceeds the unconsumed {remaining}")]
    AllocationExceeded {
        order_id: Uuid,
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CouponInactive(_)
            | Self::CouponNotStarted { .. }
            | Self::CouponExpired { .. }
            | Self::CouponUsageLimitReached(_)
            | Self::MinimumPurchaseNotMet { .. }
            | Self::QuantityOutOfRange { .. }
            | Self::ValidationError(_)
            | Self::InvalidOperation(_)
            | Self::MalformedInput(_)
            | Self::InsufficientBalance { .. } => ErrorKind::Validation,
            Self::NotFound(_) | Self::CouponNotFound(_) => ErrorKind::NotFound,
            Self::AllocationExceeded { .. } | Self::ConcurrentModification(_) => {
                ErrorKind::Consistency
            }
            Self::DatabaseError(_)
            | Self::InternalError(_)
            | Self::Other(_) => ErrorKind::System,
        }
    }

    /// Stable machine-readable code.
    ///
    /// Every coupon failure has its own code so the storefront can word its
    /// message precisely.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::CouponNotFound(_) => "coupon_invalid",
            Self::CouponInactive(_) => "coupon_inactive",
            Self::CouponNotStarted { .. } => "coupon_not_started",
            Self::CouponExpired { .. } => "coupon_expired",
            Self::CouponUsageLimitReached(_) => "coupon_usage_limit_reached",
            Self::MinimumPurchaseNotMet { .. } => "minimum_purchase_not_met",
            Self::QuantityOutOfRange { .. } => "quantity_out_of_range",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::MalformedInput(_) => "malformed_input",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::AllocationExceeded { .. } => "allocation_exceeded",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::InternalError(_) | Self::Other(_) => "system_error",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::CouponNotFound(_) => StatusCode::NOT_FOUND,
            Self::CouponInactive(_)
            | Self::CouponNotStarted { .. }
            | Self::CouponExpired { .. }
            | Self::CouponUsageLimitReached(_)
            | Self::MinimumPurchaseNotMet { .. }
            | Self::QuantityOutOfRange { .. }
            | Self::ValidationError(_)
            | Self::InvalidOperation(_)
            | Self::MalformedInput(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::AllocationExceeded { .. } | Self::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            Self::DatabaseError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a shopper. System errors are not described.
    pub fn response_message(&self) -> String {
        match self.kind() {
            ErrorKind::System => "Something went wrong, please try again".to_string(),
            ErrorKind::Consistency => {
                "This order changed while we were processing it, please retry".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Serializable error body handed to the calling UI.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(error: &ServiceError) -> Self {
        Self {
            code: error.error_code(),
            kind: error.kind(),
            message: error.response_message(),
        }
    }
}
