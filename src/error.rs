//! Input-validation errors.
//!
//! These are the only failures that short-circuit a request. Everything
//! else in the pipeline degrades to a fallback instead of failing.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("grocery list is empty")]
    EmptyGroceryList,

    #[error("invalid marketplace identifier: '{0}'")]
    InvalidMarketplaceId(String),

    #[error("invalid routing rule: {0}")]
    InvalidRoutingRule(String),

    #[error("invalid mapping: {0}")]
    InvalidMapping(String),
}
