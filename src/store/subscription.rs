//! Live snapshots on top of a store's change feed.
//!
//! Each subscription runs in its own task: it fetches once, then re-fetches
//! whenever a relevant [`Change`] arrives (or the feed lagged) and forwards a
//! snapshot only when it differs from the previous one. Dropping the
//! [`Subscription`] aborts the task, so nothing fetched under a stale key can
//! reach the receiver afterwards.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::Stream;
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, warn};

use super::{Change, DocRef, Document, Query, Store, StoreResult};

const SUBSCRIPTION_BUFFER: usize = 16;

pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    /// Next snapshot, or `None` once the subscription ended.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn cancel(self) {
        // abort happens in Drop
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

fn spawn_watch<T, R, F, Fut>(store: Store, relevant: R, fetch: F) -> Subscription<T>
where
    T: Clone + PartialEq + Send + 'static,
    R: Fn(&Change) -> bool + Send + 'static,
    F: Fn(Store) -> Fut + Send + 'static,
    Fut: Future<Output = StoreResult<T>> + Send,
{
    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    // subscribe before the first fetch so no write slips in between
    let mut changes = store.changes();

    let task = tokio::spawn(async move {
        let mut last: Option<T> = None;
        loop {
            match fetch(store.clone()).await {
                Ok(snapshot) => {
                    if last.as_ref() != Some(&snapshot) {
                        last = Some(snapshot.clone());
                        if tx.send(snapshot).await.is_err() {
                            return;
                        }
                    }
                }
                Err(err) => warn!(error = %err, "subscription fetch failed"),
            }

            loop {
                match changes.recv().await {
                    Ok(change) if relevant(&change) => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "change feed lagged, refetching");
                        break;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }
    });

    Subscription { rx, task }
}

/// Follows one document; yields `None` while it does not exist.
pub fn watch_document(store: &Store, doc: DocRef) -> Subscription<Option<Document>> {
    let target = doc.clone();
    spawn_watch(
        store.clone(),
        move |change| change.touches(&target),
        move |store| {
            let doc = doc.clone();
            async move { store.get(&doc).await }
        },
    )
}

pub fn watch_query(store: &Store, query: Query) -> Subscription<Vec<Document>> {
    let filter = query.clone();
    spawn_watch(
        store.clone(),
        move |change| filter.affected_by(change),
        move |store| {
            let query = query.clone();
            async move { store.query(&query).await }
        },
    )
}
