//! Boundary checks applied before anything reaches the store.

pub const TITLE_MAX_CHARS: usize = 500;
pub const DESCRIPTION_MAX_CHARS: usize = 2000;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Title is required")]
    EmptyTitle,
    #[error("Title must be between 1 and 500 characters, got {0}")]
    TitleTooLong(usize),
    #[error("Description cannot exceed 2000 characters, got {0}")]
    DescriptionTooLong(usize),
    #[error("Priority must be between 1 (Low) and 3 (High), got {0}")]
    InvalidPriority(i32),
    #[error("Invalid page {page} with page size {page_size}")]
    InvalidPage { page: u64, page_size: u64 },
}

pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let length = title.chars().count();
    if length > TITLE_MAX_CHARS {
        return Err(ValidationError::TitleTooLong(length));
    }
    Ok(())
}

pub fn validate_description(description: Option<&str>) -> Result<(), ValidationError> {
    let Some(description) = description else {
        return Ok(());
    };
    let length = description.chars().count();
    if length > DESCRIPTION_MAX_CHARS {
        return Err(ValidationError::DescriptionTooLong(length));
    }
    Ok(())
}

/// Checks a 1-based page number and page size and returns the number of rows to skip.
pub fn page_offset(page: u64, page_size: u64) -> Result<u64, ValidationError> {
    let invalid = ValidationError::InvalidPage { page, page_size };
    if page == 0 || page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(invalid);
    }
    // Drivers bind offsets as signed 64-bit integers
    (page - 1)
        .checked_mul(page_size)
        .filter(|offset| i64::try_from(*offset).is_ok())
        .ok_or(invalid)
}
