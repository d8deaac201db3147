//! Local validation of mutation input.
//!
//! Everything here runs before a request is built, so invalid input never
//! reaches the network.

use crate::config::EngineConfig;
use crate::entities::{CommentDraft, CommentPatch, RatingDraft, RatingPatch};
use crate::error::ValidationError;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

pub fn validate_rating(value: u8) -> Result<(), ValidationError> {
    if (MIN_RATING..=MAX_RATING).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::RatingOutOfRange { value })
    }
}

pub fn validate_comment(text: &str, config: &EngineConfig) -> Result<(), ValidationError> {
    let len = text.trim().chars().count();
    if len < config.comment_min_chars {
        return Err(ValidationError::CommentTooShort {
            len,
            min: config.comment_min_chars,
        });
    }
    if len > config.comment_max_chars {
        return Err(ValidationError::CommentTooLong {
            len,
            max: config.comment_max_chars,
        });
    }
    Ok(())
}

/// Input that can be checked locally before submission.
pub trait Validate {
    fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError>;
}

impl Validate for RatingDraft {
    fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError> {
        validate_rating(self.rating)?;
        if let Some(comment) = &self.comment {
            // An attached note may be short, only the upper bound applies.
            let len = comment.trim().chars().count();
            if len > config.comment_max_chars {
                return Err(ValidationError::CommentTooLong {
                    len,
                    max: config.comment_max_chars,
                });
            }
        }
        Ok(())
    }
}

impl Validate for CommentDraft {
    fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError> {
        validate_comment(&self.comment, config)?;
        if let Some(rating) = self.rating {
            validate_rating(rating)?;
        }
        Ok(())
    }
}

impl Validate for RatingPatch {
    fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError> {
        if self.rating.is_none() && self.comment.is_none() {
            return Err(ValidationError::InvalidValue {
                field: "patch".to_string(),
                reason: "nothing to update".to_string(),
            });
        }
        if let Some(rating) = self.rating {
            validate_rating(rating)?;
        }
        if let Some(comment) = &self.comment {
            let len = comment.trim().chars().count();
            if len > config.comment_max_chars {
                return Err(ValidationError::CommentTooLong {
                    len,
                    max: config.comment_max_chars,
                });
            }
        }
        Ok(())
    }
}

impl Validate for CommentPatch {
    fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError> {
        if self.rating.is_none() && self.comment.is_none() {
            return Err(ValidationError::InvalidValue {
                field: "patch".to_string(),
                reason: "nothing to update".to_string(),
            });
        }
        if let Some(comment) = &self.comment {
            validate_comment(comment, config)?;
        }
        if let Some(rating) = self.rating {
            validate_rating(rating)?;
        }
        Ok(())
    }
}
