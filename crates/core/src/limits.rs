//! Input validation bounds
//!
//! Request fields are validated at the engine boundary before any state is
//! touched; a validation failure never mutates a buffer or the store.

use crate::error::{Error, Result};

/// Maximum length of a business type string.
pub const MAX_BUSINESS_TYPE_LEN: usize = 64;

/// Maximum length of a time key string.
pub const MAX_TIME_KEY_LEN: usize = 32;

/// Validate a business type: non-empty, bounded length.
pub fn validate_business_type(business_type: &str) -> Result<()> {
    if business_type.is_empty() {
        return Err(Error::validation("business_type must not be empty"));
    }
    if business_type.len() > MAX_BUSINESS_TYPE_LEN {
        return Err(Error::validation(format!(
            "business_type exceeds {} bytes",
            MAX_BUSINESS_TYPE_LEN
        )));
    }
    Ok(())
}

/// Validate a time key: bounded length (empty is allowed).
pub fn validate_time_key(time_key: &str) -> Result<()> {
    if time_key.len() > MAX_TIME_KEY_LEN {
        return Err(Error::validation(format!(
            "time_key exceeds {} bytes",
            MAX_TIME_KEY_LEN
        )));
    }
    Ok(())
}

/// Validate a batch count: at least one ID per request.
pub fn validate_count(count: u32) -> Result<()> {
    if count < 1 {
        return Err(Error::validation("count must be at least 1"));
    }
    Ok(())
}

/// Validate a step size: strictly positive.
pub fn validate_step(step: u32) -> Result<()> {
    if step == 0 {
        return Err(Error::validation("step_size must be positive"));
    }
    Ok(())
}

/// Validate a shard count used for routing hints: strictly positive.
pub fn validate_shard_count(name: &str, count: u32) -> Result<()> {
    if count == 0 {
        return Err(Error::validation(format!("{} must be positive", name)));
    }
    Ok(())
}
