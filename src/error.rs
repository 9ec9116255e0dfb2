use thiserror::Error;

/// Everything that can go wrong between the marketplace and a result table.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials were rejected, or the logged-in check failed after a
    /// submit.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An expected hidden form field was missing. This usually means the
    /// site markup changed.
    #[error("no {field:?} field on the {page}")]
    TokenNotFound { field: &'static str, page: String },

    /// The two-factor verification code was rejected.
    #[error("two-factor verification failed: {0}")]
    TwoFactor(String),

    /// Invalid command-line argument combination.
    #[error("{0}")]
    Input(String),

    /// A report filename does not encode a year and month.
    #[error("could not extract year/month from filename: {0:?}")]
    UnparsableFilename(String),

    /// A sort or display column is not part of the loaded schema.
    #[error("unknown column {0:?}")]
    UnknownColumn(String),

    #[error("cookie store: {0}")]
    CookieStore(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
