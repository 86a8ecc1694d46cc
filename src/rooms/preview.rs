//! Most recent message per rendered room.

use std::{collections::HashMap, hash::Hash};

use futures_util::future::select_all;
use tracing::warn;

use crate::{
    model::Message,
    store::{watch_query, DocRef, Direction, Document, Query, Store, Subscription, MESSAGES, ROOMS},
};

/// Latest message of one room.
pub struct LastMessage {
    sub: Subscription<Vec<Document>>,
}

impl LastMessage {
    /// `Some(None)` while the room has no (readable) message, `None` once the
    /// subscription ended.
    pub async fn next(&mut self) -> Option<Option<Message>> {
        let docs = self.sub.next().await?;
        Some(docs.first().and_then(|doc| {
            doc.decode()
                .inspect_err(|err| warn!(error = %err, "unreadable message"))
                .ok()
        }))
    }
}

pub fn watch_last_message(store: &Store, room_id: &str) -> LastMessage {
    let messages = DocRef::new(ROOMS, room_id).child(MESSAGES);
    LastMessage {
        sub: watch_query(
            store,
            Query::collection(messages)
                .order_by("timestamp", Direction::Descending)
                .limit(1),
        ),
    }
}

/// Subscriptions kept open per key. Syncing to a new key set keeps the ones
/// still wanted, opens the missing ones and drops the rest.
pub struct KeyedSubscriptions<K, S> {
    subs: HashMap<K, S>,
}

impl<K, S> Default for KeyedSubscriptions<K, S> {
    fn default() -> Self {
        KeyedSubscriptions { subs: HashMap::new() }
    }
}

impl<K: Eq + Hash + Clone, S> KeyedSubscriptions<K, S> {
    /// Returns the keys whose subscriptions were dropped.
    pub fn sync<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>, mut open: impl FnMut(&K) -> S) -> Vec<K>
    where
        K: 'a,
    {
        let mut kept = HashMap::with_capacity(self.subs.len());
        for key in keys {
            if kept.contains_key(key) {
                continue;
            }
            let sub = self.subs.remove(key).unwrap_or_else(|| open(key));
            kept.insert(key.clone(), sub);
        }

        let dropped = self.subs.keys().cloned().collect();
        self.subs = kept;
        dropped
    }

    pub fn remove(&mut self, key: &K) -> Option<S> {
        self.subs.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.subs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut S)> {
        self.subs.iter_mut()
    }
}

/// Previews for the rooms currently on screen.
pub struct Previews {
    store: Store,
    subs: KeyedSubscriptions<String, LastMessage>,
    latest: HashMap<String, Option<Message>>,
}

impl Previews {
    pub fn new(store: Store) -> Self {
        Previews {
            store,
            subs: KeyedSubscriptions::default(),
            latest: HashMap::new(),
        }
    }

    pub fn sync(&mut self, room_ids: &[String]) {
        let store = &self.store;
        let dropped = self.subs.sync(room_ids, |id| watch_last_message(store, id));
        for id in dropped {
            self.latest.remove(&id);
        }
    }

    /// Waits for a new latest message in any room and returns that room's id.
    /// `None` when nothing is subscribed.
    pub async fn changed(&mut self) -> Option<String> {
        if self.subs.is_empty() {
            return None;
        }

        let pending = self
            .subs
            .iter_mut()
            .map(|(id, sub)| Box::pin(async move { (id.clone(), sub.next().await) }));
        let ((id, latest), _, rest) = select_all(pending).await;
        drop(rest);

        match latest {
            Some(message) => {
                self.latest.insert(id.clone(), message);
            }
            None => {
                self.subs.remove(&id);
                self.latest.remove(&id);
            }
        }
        Some(id)
    }

    pub fn latest(&self, room_id: &str) -> Option<&Message> {
        self.latest.get(room_id)?.as_ref()
    }

    pub fn preview(&self, room_id: &str) -> Option<String> {
        self.latest(room_id)?.preview()
    }
}
