use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{DocRef, Document};

/// Profile returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub uid: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub email: Option<String>,
    /// Credential for later profile calls on behalf of this user.
    pub id_token: Option<String>,
}

/// Application-side record stored at `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub name: String,
    pub google_uid: String,
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub rooms: Vec<DocRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomData {
    pub name: Option<String>,
    pub members: Vec<DocRef>,
}

impl RoomData {
    /// Reads a room body leniently: a missing or non-string name becomes
    /// `None` and unparseable member references are skipped.
    pub fn from_value(data: &Value) -> Self {
        let name = data.get("name").and_then(Value::as_str).map(str::to_owned);
        let members = data
            .get("members")
            .and_then(Value::as_array)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| serde_json::from_value(m.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        RoomData { name, members }
    }

    /// Name used for display and search; absent names count as empty.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomEntry {
    pub id: String,
    pub data: RoomData,
}

impl From<&Document> for RoomEntry {
    fn from(doc: &Document) -> Self {
        RoomEntry {
            id: doc.id().to_owned(),
            data: RoomData::from_value(&doc.data),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    /// Unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    /// `"sender: content"`, or nothing for an empty message.
    pub fn preview(&self) -> Option<String> {
        (!self.content.is_empty()).then(|| format!("{}: {}", self.name, self.content))
    }
}
