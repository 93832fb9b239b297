//! Feed listing: the fan-out source for batch sync.
//!
//! - [`parser`] turns RSS, Atom or JSON Feed bytes into [`RawFeedEntry`] values
//!   using `feed-rs`.
//! - [`lister`] fetches a feed through a [`Fetcher`](crate::fetch::Fetcher)
//!   and hands back its entries.

mod lister;
mod parser;

use crate::fetch::FetchError;
use crate::util::LinkError;
use thiserror::Error;

pub use lister::{retrieve_articles_from_feed, retrieve_feed};
pub use parser::{parse_feed, FeedInfo, ParsedFeed, RawFeedEntry};

/// Errors that make a feed unusable as a whole.
#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("Invalid feed link: {0}")]
    InvalidLink(#[from] LinkError),
    #[error("Feed unreachable: {0}")]
    Unreachable(#[source] FetchError),
    #[error("Feed parse error: {0}")]
    Parse(String),
}
