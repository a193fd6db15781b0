use bangumi_core::error::ApiError;

pub const MAX_BATCH_IDS: usize = 100;
pub const MAX_BATCH_QUERIES: usize = 10;
pub const MAX_BATCH_SITES: usize = 20;
pub const MAX_LIMIT: usize = 1000;
pub const DEFAULT_LIMIT: usize = 100;

/// Reject empty or oversized batch inputs.
pub fn check_batch(field: &str, len: usize, max: usize) -> Result<(), ApiError> {
    if len == 0 {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    if len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} accepts at most {max} entries, got {len}"
        )));
    }
    Ok(())
}

/// Resolve an optional page size, enforcing `1..=MAX_LIMIT`.
pub fn check_limit(limit: Option<usize>, default: usize) -> Result<usize, ApiError> {
    limit.map_or(Ok(default), check_page_size)
}

pub fn check_page_size(n: usize) -> Result<usize, ApiError> {
    if (1..=MAX_LIMIT).contains(&n) {
        Ok(n)
    } else {
        Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {n}"
        )))
    }
}

pub fn check_year(year: Option<i32>) -> Result<(), ApiError> {
    match year {
        Some(y) if !(1900..=2100).contains(&y) => Err(ApiError::BadRequest(format!(
            "year must be between 1900 and 2100, got {y}"
        ))),
        _ => Ok(()),
    }
}
