use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("retry.max_attempts must be at least 1")]
    NoAttempts,

    #[error("transfer.concurrency_limit must be at least 1 when set")]
    ZeroConcurrency,

    #[error("retry.max_backoff_ms ({max}) is below retry.backoff_base_ms ({base})")]
    BackoffCeilingBelowBase { base: u64, max: u64 },

    #[error("staging and published directories must differ: {0}")]
    SameDirectories(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_retry(config)?;
    validate_transfer(config)?;
    Ok(())
}

fn validate_retry(config: &Config) -> Result<(), ValidationError> {
    if config.retry.max_attempts == 0 {
        return Err(ValidationError::NoAttempts);
    }
    if let Some(max) = config.retry.max_backoff_ms {
        if max < config.retry.backoff_base_ms {
            return Err(ValidationError::BackoffCeilingBelowBase {
                base: config.retry.backoff_base_ms,
                max,
            });
        }
    }
    Ok(())
}

fn validate_transfer(config: &Config) -> Result<(), ValidationError> {
    if config.transfer.concurrency_limit == Some(0) {
        return Err(ValidationError::ZeroConcurrency);
    }
    if config.transfer.staging_dir == config.transfer.published_dir {
        return Err(ValidationError::SameDirectories(
            config.transfer.staging_dir.display().to_string(),
        ));
    }
    Ok(())
}
