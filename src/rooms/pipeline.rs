//! Live room list for the sidebar.
//!
//! Three stages feed each other: the user's record yields room ids
//! ([`RoomIds`]), the ids yield room documents ([`RoomDocs`]), and the
//! documents plus the search text yield the rendered list
//! ([`filter_rooms`]). [`RoomList`] owns all three and re-keys them.

use std::future;

use tracing::debug;

use crate::{
    model::RoomEntry,
    store::{
        watch_document, watch_query, DocRef, Document, Query, Store, Subscription, ROOMS, USERS,
    },
};

/// Room ids listed in `users/{uid}.rooms`.
pub struct RoomIds {
    sub: Subscription<Option<Document>>,
}

impl RoomIds {
    /// Next id list. Snapshots without a `rooms` array are skipped.
    pub async fn next(&mut self) -> Option<Vec<String>> {
        loop {
            let snapshot = self.sub.next().await?;
            if let Some(ids) = snapshot.as_ref().and_then(room_ids_of) {
                return Some(ids);
            }
        }
    }
}

fn room_ids_of(user: &Document) -> Option<Vec<String>> {
    let rooms = user.data.get("rooms")?.as_array()?;
    Some(
        rooms
            .iter()
            .filter_map(|room| serde_json::from_value::<DocRef>(room.clone()).ok())
            .map(|room| room.id().to_owned())
            .collect(),
    )
}

pub fn watch_room_ids(store: &Store, uid: &str) -> Option<RoomIds> {
    if uid.is_empty() {
        return None;
    }
    Some(RoomIds {
        sub: watch_document(store, DocRef::new(USERS, uid)),
    })
}

/// Room documents for a fixed id set.
pub struct RoomDocs {
    sub: Subscription<Vec<Document>>,
}

impl RoomDocs {
    pub async fn next(&mut self) -> Option<Vec<RoomEntry>> {
        let docs = self.sub.next().await?;
        Some(docs.iter().map(RoomEntry::from).collect())
    }
}

/// `None` for an empty id list: there is nothing to ask the store.
pub fn watch_rooms(store: &Store, ids: &[String]) -> Option<RoomDocs> {
    if ids.is_empty() {
        return None;
    }
    Some(RoomDocs {
        sub: watch_query(store, Query::collection(ROOMS).where_id_in(ids.to_vec())),
    })
}

/// Rooms whose name contains `search`, ignoring case, in input order.
pub fn filter_rooms(rooms: &[RoomEntry], search: &str) -> Vec<RoomEntry> {
    let needle = search.to_lowercase();
    rooms
        .iter()
        .filter(|room| room.data.display_name().to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

async fn next_ids(stage: &mut Option<RoomIds>) -> Option<Vec<String>> {
    match stage {
        Some(stage) => stage.next().await,
        None => future::pending().await,
    }
}

async fn next_rooms(stage: &mut Option<RoomDocs>) -> Option<Vec<RoomEntry>> {
    match stage {
        Some(stage) => stage.next().await,
        None => future::pending().await,
    }
}

enum Step {
    Ids(Option<Vec<String>>),
    Rooms(Option<Vec<RoomEntry>>),
}

pub struct RoomList {
    store: Store,
    uid: Option<String>,
    ids_stage: Option<RoomIds>,
    room_ids: Vec<String>,
    rooms_stage: Option<RoomDocs>,
    rooms: Vec<RoomEntry>,
    search: String,
    filtered: Vec<RoomEntry>,
}

impl RoomList {
    pub fn new(store: Store) -> Self {
        RoomList {
            store,
            uid: None,
            ids_stage: None,
            room_ids: vec![],
            rooms_stage: None,
            rooms: vec![],
            search: String::new(),
            filtered: vec![],
        }
    }

    /// Follows another user. Everything derived from the previous one is
    /// dropped along with its subscriptions.
    pub fn set_user(&mut self, uid: Option<&str>) {
        if self.uid.as_deref() == uid {
            return;
        }
        debug!(?uid, "room list user changed");
        self.uid = uid.map(str::to_owned);
        self.ids_stage = uid.and_then(|uid| watch_room_ids(&self.store, uid));
        self.rooms_stage = None;
        self.room_ids.clear();
        self.rooms.clear();
        self.refilter();
    }

    pub fn set_search(&mut self, search: &str) {
        if self.search != search {
            self.search = search.to_owned();
            self.refilter();
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn room_ids(&self) -> &[String] {
        &self.room_ids
    }

    pub fn rooms(&self) -> &[RoomEntry] {
        &self.rooms
    }

    pub fn filtered(&self) -> &[RoomEntry] {
        &self.filtered
    }

    /// Waits for either subscription to deliver and applies it. `None` once
    /// both stages are gone.
    pub async fn changed(&mut self) -> Option<()> {
        if self.ids_stage.is_none() && self.rooms_stage.is_none() {
            return None;
        }

        let step = tokio::select! {
            ids = next_ids(&mut self.ids_stage) => Step::Ids(ids),
            rooms = next_rooms(&mut self.rooms_stage) => Step::Rooms(rooms),
        };

        match step {
            Step::Ids(Some(ids)) => self.apply_ids(ids),
            Step::Ids(None) => self.ids_stage = None,
            Step::Rooms(Some(rooms)) => self.apply_rooms(rooms),
            Step::Rooms(None) => self.rooms_stage = None,
        }
        Some(())
    }

    fn apply_ids(&mut self, ids: Vec<String>) {
        if ids == self.room_ids {
            return;
        }
        self.rooms_stage = watch_rooms(&self.store, &ids);
        self.room_ids = ids;
        if self.rooms_stage.is_none() {
            self.rooms.clear();
            self.refilter();
        }
    }

    fn apply_rooms(&mut self, rooms: Vec<RoomEntry>) {
        self.rooms = rooms;
        self.refilter();
    }

    fn refilter(&mut self) {
        self.filtered = filter_rooms(&self.rooms, &self.search);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use super::*;
    use crate::{
        model::RoomData,
        store::{DocumentStore, FieldUpdate},
        testing::{identity_user, FakeIdentity, TestBackend},
    };

    fn room(id: &str, name: Option<&str>) -> RoomEntry {
        RoomEntry {
            id: id.to_owned(),
            data: RoomData { name: name.map(str::to_owned), members: vec![] },
        }
    }

    async fn backend() -> TestBackend {
        TestBackend::new(FakeIdentity::new(identity_user("u1", Some("Ada")))).await
    }

    async fn user_with_rooms(store: &Store, uid: &str, rooms: &[&DocRef]) {
        let rooms: Vec<String> = rooms.iter().map(|r| r.to_string()).collect();
        store
            .set(&DocRef::new(USERS, uid), json!({ "name": uid, "google_uid": uid, "rooms": rooms }))
            .await
            .unwrap();
    }

    async fn settle(list: &mut RoomList) {
        while let Ok(Some(())) = timeout(Duration::from_millis(150), list.changed()).await {}
    }

    #[test]
    fn filter_is_case_insensitive_and_keeps_order() {
        let rooms = vec![room("1", Some("Team Chat")), room("2", Some("family")), room("3", Some("TEAMWORK"))];

        let ids = |rooms: Vec<RoomEntry>| rooms.into_iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(filter_rooms(&rooms, "team")), vec!["1", "3"]);
        assert_eq!(ids(filter_rooms(&rooms, "AMI")), vec!["2"]);
        assert_eq!(ids(filter_rooms(&rooms, "")), vec!["1", "2", "3"]);
        assert!(filter_rooms(&rooms, "zzz").is_empty());
    }

    #[test]
    fn nameless_rooms_match_only_empty_search() {
        let rooms = vec![room("1", None), room("2", Some("general"))];
        assert_eq!(filter_rooms(&rooms, "").len(), 2);
        assert_eq!(filter_rooms(&rooms, "gen").len(), 1);
        assert_eq!(filter_rooms(&rooms, "gen")[0].id, "2");
    }

    #[tokio::test]
    async fn no_uid_means_no_subscription() {
        let backend = backend().await;
        assert!(watch_room_ids(&backend.store, "").is_none());
    }

    #[tokio::test]
    async fn empty_id_list_issues_no_query() {
        let backend = backend().await;
        assert!(watch_rooms(&backend.store, &[]).is_none());

        let mut list = RoomList::new(backend.store.clone());
        user_with_rooms(&backend.store, "u1", &[]).await;
        list.set_user(Some("u1"));
        settle(&mut list).await;

        assert!(list.rooms().is_empty());
        assert_eq!(backend.flaky.queries(), 0);
    }

    #[tokio::test]
    async fn room_ids_skip_records_without_rooms() {
        let backend = backend().await;
        let doc = DocRef::new(USERS, "u1");
        backend.store.set(&doc, json!({ "name": "Ada" })).await.unwrap();

        let mut ids = watch_room_ids(&backend.store, "u1").unwrap();
        backend
            .store
            .update(&doc, vec![FieldUpdate::set("rooms", json!(["rooms/a", "rooms/b"]))])
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(1), ids.next()).await.unwrap().unwrap();
        assert_eq!(first, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn pipeline_follows_membership_and_search() {
        let backend = backend().await;
        let store = &backend.store;
        let team = store.add(ROOMS, json!({ "name": "Team" })).await.unwrap();
        let family = store.add(ROOMS, json!({ "name": "Family" })).await.unwrap();
        user_with_rooms(store, "u1", &[&team]).await;

        let mut list = RoomList::new(store.clone());
        list.set_user(Some("u1"));
        settle(&mut list).await;
        assert_eq!(list.room_ids(), [team.id().to_owned()]);
        assert_eq!(list.filtered().len(), 1);

        store
            .update(&DocRef::new(USERS, "u1"), vec![FieldUpdate::array_union("rooms", vec![json!(family.to_string())])])
            .await
            .unwrap();
        settle(&mut list).await;
        assert_eq!(list.rooms().len(), 2);

        list.set_search("fam");
        let names: Vec<&str> = list.filtered().iter().map(|r| r.data.display_name()).collect();
        assert_eq!(names, vec!["Family"]);

        store
            .update(&family, vec![FieldUpdate::set("name", "Relatives")])
            .await
            .unwrap();
        settle(&mut list).await;
        assert!(list.filtered().is_empty());
    }

    #[tokio::test]
    async fn switching_user_drops_old_subscriptions() {
        let backend = backend().await;
        let store = &backend.store;
        let mine = store.add(ROOMS, json!({ "name": "Mine" })).await.unwrap();
        let theirs = store.add(ROOMS, json!({ "name": "Theirs" })).await.unwrap();
        user_with_rooms(store, "u1", &[&mine]).await;
        user_with_rooms(store, "u2", &[&theirs]).await;

        let mut list = RoomList::new(store.clone());
        list.set_user(Some("u1"));
        settle(&mut list).await;
        list.set_user(Some("u2"));
        settle(&mut list).await;
        assert_eq!(list.room_ids(), [theirs.id().to_owned()]);

        // writes under the old keys must not reach the list any more
        store
            .update(&DocRef::new(USERS, "u1"), vec![FieldUpdate::set("rooms", json!([]))])
            .await
            .unwrap();
        store.update(&mine, vec![FieldUpdate::set("name", "Renamed")]).await.unwrap();
        assert!(timeout(Duration::from_millis(200), list.changed()).await.is_err());
        assert_eq!(list.rooms()[0].data.display_name(), "Theirs");
    }

    #[tokio::test]
    async fn signing_out_clears_the_list() {
        let backend = backend().await;
        let store = &backend.store;
        let team = store.add(ROOMS, json!({ "name": "Team" })).await.unwrap();
        user_with_rooms(store, "u1", &[&team]).await;

        let mut list = RoomList::new(store.clone());
        list.set_user(Some("u1"));
        settle(&mut list).await;
        assert_eq!(list.filtered().len(), 1);

        list.set_user(None);
        assert!(list.filtered().is_empty());
        assert_eq!(list.changed().await, None);
    }
}
