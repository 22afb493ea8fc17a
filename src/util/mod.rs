//! Small text helpers shared by the feed pipeline.
//!
//! - **Control characters**: strip terminal escape sequences from feed-supplied text
//! - **Whitespace**: collapse padded strings before strict parsing

mod text;

pub use text::{collapse_whitespace, strip_control_chars};
