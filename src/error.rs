use tonic::{Code, Status};

/// Error taxonomy for the pricing engine (spec.md §7).
///
/// `NotFound` never escapes the store layer as an error proper — it's
/// consumed by the pricing use case as an "absent" row — but the variant
/// still exists because store implementations need something to return
/// from `get()` when the single-key lookup misses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider bad response: {0}")]
    ProviderBadResponse(String),

    #[error("price unavailable for coin={coin_id} bucket={bucket}")]
    PriceUnavailable { coin_id: String, bucket: String },

    #[error("fx unavailable for currency={currency} day={day}")]
    FXUnavailable { currency: String, day: String },

    #[error("unsupported fiat: {0}")]
    UnsupportedFiat(String),

    #[error("cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Xml(#[from] quick_xml::de::DeError),

    #[error("internal: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::InvalidArgument(_) => Code::InvalidArgument,
            AppError::Cancelled => Code::Cancelled,
            AppError::DeadlineExceeded => Code::DeadlineExceeded,
            AppError::NotFound(_) => Code::NotFound,
            // Per spec.md §7: resolver misses are leg-local and never reach
            // here as a whole-call error; everything else request-global is
            // surfaced as Internal, carrying the root cause in the message.
            AppError::UnknownSymbol(_)
            | AppError::ProviderUnavailable(_)
            | AppError::ProviderBadResponse(_)
            | AppError::PriceUnavailable { .. }
            | AppError::FXUnavailable { .. }
            | AppError::UnsupportedFiat(_)
            | AppError::Sqlx(_)
            | AppError::Reqwest(_)
            | AppError::Redis(_)
            | AppError::Xml(_)
            | AppError::Internal(_) => Code::Internal,
        };
        Status::new(code, err.to_string())
    }
}
