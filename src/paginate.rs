//! Pagination Walker
//!
//! Turns a token-paged listing capability into a lazy stream of items. The
//! walker is not restartable: it owns the listing closure and stops for good
//! once the provider returns no continuation token or a page fails.

use futures::stream::{self, Stream, TryStreamExt};
use std::future::Future;

/// Result of one listing call
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Walk every page of a listing.
///
/// Items of earlier pages are yielded first; nothing is deduplicated. An
/// empty continuation token ends the walk like an absent one. A failing page
/// is yielded as the last element, unmodified.
pub fn walk<T, E, F, Fut>(list_page: F) -> impl Stream<Item = Result<T, E>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    stream::unfold((list_page, Cursor::Start), |(mut list_page, cursor)| async move {
        let token = match cursor {
            Cursor::Done => return None,
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };

        match list_page(token).await {
            Ok(page) => {
                let next = match page.next_token {
                    Some(token) if !token.is_empty() => Cursor::Next(token),
                    _ => Cursor::Done,
                };
                tracing::debug!("Fetched page with {} items", page.items.len());
                Some((Ok(page.items), (list_page, next)))
            }
            Err(e) => Some((Err(e), (list_page, Cursor::Done))),
        }
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok::<T, E>)))
    .try_flatten()
}

/// Fetch all items (auto-paginate)
pub async fn collect_all<T, E, F, Fut>(list_page: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    walk(list_page).try_collect().await
}
