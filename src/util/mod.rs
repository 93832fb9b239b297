//! Utility functions shared by the ingestion pipeline.
//!
//! - **Link validation**: shape checks, cache-key normalisation, site names,
//!   and a private-host policy to prevent SSRF when fetching third-party URLs
//! - **Text processing**: sanitising and trimming scraped text
//!
//! # Examples
//!
//! ```
//! use gleaner::util::{is_valid_link, normalize_link};
//!
//! assert!(is_valid_link("https://example.com/feed.xml"));
//! assert!(!is_valid_link("javascript:void(0)"));
//! assert_eq!(normalize_link("https://Example.com/a#top"), "https://example.com/a");
//! ```

mod text;
mod url_validator;

pub use text::{clean_text, collapse_whitespace, strip_control_chars, truncate_chars};
pub use url_validator::{
    ensure_public_host, is_valid_link, normalize_link, site_name_from_link, validate_link,
    LinkError,
};
