//! URL handling module for Sat-Harvest
//!
//! Feed pages reference each other through absolute or relative links whose
//! query strings may be encoded differently from one page to the next. This
//! module gives every link a single canonical form so that link identity (the
//! visited set) is a plain string comparison.

mod normalize;

pub use normalize::{normalize_link, normalize_url};
