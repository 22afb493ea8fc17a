//! Incremental refresh of feeds the caller already holds.
//!
//! Each feed is re-fetched from its `feed_url` with its stored `etag` and
//! `last_modified` as conditional headers, then the fresh parse is merged
//! into it in place (see [`Feed::merge`]). The `updated` flag and the
//! new-entry window on each feed describe only the latest call.

use futures::stream::{self, StreamExt};

use super::fetcher::{FetchFailure, FetchOutcome, Fetcher, RequestOptions};
use super::model::Feed;
use super::parser::FeedError;

/// What an update did to one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A fresh copy was fetched and merged; `new_entries` may be zero
    Merged { new_entries: usize },
    /// The server answered 304; the feed is untouched
    NotModified,
    /// The fetch failed; the feed is untouched
    Failed(FetchFailure),
}

/// Re-fetches `feed` and merges any changes into it.
///
/// # Errors
///
/// - [`FeedError::MissingFeedUrl`] if the feed has never been fetched
/// - [`FeedError::NoParserAvailable`] if the fresh body is not a feed
pub async fn update_one(fetcher: &Fetcher, feed: &mut Feed) -> Result<UpdateOutcome, FeedError> {
    feed.reset_update_state();

    let url = feed.feed_url.clone().ok_or(FeedError::MissingFeedUrl)?;
    let options = RequestOptions::conditional_for(feed);

    match fetcher.fetch_and_parse(&url, &options).await? {
        FetchOutcome::Fetched(fresh) => {
            let new_entries = feed.merge(fresh);
            tracing::debug!(
                url = %url,
                new_entries = new_entries,
                updated = feed.is_updated(),
                "Merged feed update"
            );
            Ok(UpdateOutcome::Merged { new_entries })
        }
        FetchOutcome::NotModified => Ok(UpdateOutcome::NotModified),
        FetchOutcome::Failed(failure) => Ok(UpdateOutcome::Failed(failure)),
    }
}

/// Updates every feed in `feeds` through the fetcher's rolling window.
///
/// # Arguments
///
/// * `fetcher` - Client whose [`FetchOptions`](super::FetchOptions) bound the window
/// * `feeds` - Feeds previously fetched or restored from saved state, merged in place
///
/// # Returns
///
/// One result per feed, aligned with `feeds` by index even though updates
/// complete out of order.
///
/// # Behavior
///
/// - Each feed's update flag and new-entry window are cleared before its fetch
/// - At most `max_in_flight` requests run at once; the next feed starts as one finishes
/// - Each feed is borrowed mutably by exactly one in-flight update, so no locking
/// - A feed without `feed_url` gets `Err(FeedError::MissingFeedUrl)` and the rest continue
pub async fn update_all(
    fetcher: &Fetcher,
    feeds: &mut [Feed],
) -> Vec<Result<UpdateOutcome, FeedError>> {
    let window = fetcher.options().max_in_flight.max(1);

    let mut results: Vec<(usize, Result<UpdateOutcome, FeedError>)> =
        stream::iter(feeds.iter_mut().enumerate())
            .map(move |(index, feed)| async move { (index, update_one(fetcher, feed).await) })
            .buffer_unordered(window)
            .collect()
            .await;

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
