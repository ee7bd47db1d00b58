//! Review stage: pure text transforms and field validation.
//!
//! ```text
//! keystrokes ─▶ date_mask ─┐
//!                          ├─▶ ReviewForm ─validate─▶ ValidatedReviewPayload
//! certidões text ─▶ certidoes::parse (live preview)  └─▶ FieldErrors
//! ```

pub mod certidoes;
pub mod date_mask;
pub mod form;

pub use form::{FieldErrors, ReviewField, ReviewForm};
