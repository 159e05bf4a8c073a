//! Utility functions for common operations.
//!
//! - **Text processing**: terminal-safe titles and width-aware truncation
//! - **URL validation**: scheme checks for configured category feeds

mod text;
mod feed_url;

pub use self::text::{strip_control_chars, truncate_to_width};
pub use self::feed_url::{validate_feed_url, FeedUrlError};
