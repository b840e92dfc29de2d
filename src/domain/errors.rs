use thiserror::Error;

// Persistence failures surface to callers as-is; the ledger never retries a
// failed read or write, to avoid double-granting or double-charging.
#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StoreError(pub String);

// Domain-level errors for account workflows. The messages are what the
// frontend shows, so they stay user-readable.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be between 6 and 128 characters")]
    InvalidPassword,
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no account with this email")]
    UserNotFound,
    #[error("account is already verified")]
    AlreadyVerified,
    #[error("the code must be six digits")]
    InvalidOtpFormat,
    #[error("invalid or expired verification code")]
    InvalidOrExpiredToken,
    #[error("storage unavailable")]
    StorageFailure,
}

// Errors from the image-generation provider boundary.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider error {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("provider returned no image: {0}")]
    EmptyResult(String),
}
