use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    Change, DocRef, Direction, Document, DocumentStore, FieldUpdate, Filter, Query, StoreError,
    StoreResult, apply_updates,
};

const CHANGE_CHANNEL_SIZE: usize = 256;

const CREATE_TABLE: &str = r#"CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (collection, id)
)"#;

/// Document store keeping every document as JSON text in one SQLite table.
pub struct SqliteStore {
    pool: SqlitePool,
    changes: broadcast::Sender<Change>,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// A private database living as long as the store; one connection, since
    /// every SQLite memory connection is its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);

        Ok(SqliteStore { pool, changes })
    }

    fn publish(&self, doc: &DocRef) {
        // nobody listening is fine
        let _ = self.changes.send(Change {
            collection: doc.collection().to_owned(),
            id: doc.id().to_owned(),
        });
    }
}

fn parse(doc: &DocRef, data: &str) -> StoreResult<Value> {
    serde_json::from_str(data).map_err(|source| StoreError::Malformed {
        path: doc.to_string(),
        source,
    })
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    match filter {
        Filter::IdIn(ids) => {
            builder.push(" AND id IN (SELECT value FROM json_each(");
            builder.push_bind(Value::from(ids.clone()).to_string());
            builder.push("))");
        }
        Filter::FieldEq(field, value) => {
            builder.push(" AND json_extract(data, ");
            builder.push_bind(json_path(field));
            builder.push(")");
            match value {
                Value::Null => {
                    builder.push(" IS NULL");
                }
                Value::Bool(b) => {
                    builder.push(" = ").push_bind(i64::from(*b));
                }
                Value::Number(n) => match n.as_i64() {
                    Some(i) => {
                        builder.push(" = ").push_bind(i);
                    }
                    None => {
                        builder.push(" = ").push_bind(n.as_f64());
                    }
                },
                Value::String(s) => {
                    builder.push(" = ").push_bind(s.clone());
                }
                other => {
                    builder.push(" = ").push_bind(other.to_string());
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, doc: &DocRef) -> StoreResult<Option<Document>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection=? AND id=?")
                .bind(doc.collection())
                .bind(doc.id())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(data,)| {
            Ok(Document {
                reference: doc.clone(),
                data: parse(doc, &data)?,
            })
        })
        .transpose()
    }

    async fn set(&self, doc: &DocRef, data: Value) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO documents (collection,id,data) VALUES (?,?,?) \
             ON CONFLICT(collection,id) DO UPDATE SET data=excluded.data",
        )
        .bind(doc.collection())
        .bind(doc.id())
        .bind(data.to_string())
        .execute(&self.pool)
        .await?;

        self.publish(doc);
        Ok(())
    }

    async fn add(&self, collection: &str, data: Value) -> StoreResult<DocRef> {
        let doc = DocRef::new(collection, Uuid::now_v7().simple().to_string());
        sqlx::query("INSERT INTO documents (collection,id,data) VALUES (?,?,?)")
            .bind(doc.collection())
            .bind(doc.id())
            .bind(data.to_string())
            .execute(&self.pool)
            .await?;

        self.publish(&doc);
        Ok(doc)
    }

    async fn update(&self, doc: &DocRef, updates: Vec<FieldUpdate>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection=? AND id=?")
                .bind(doc.collection())
                .bind(doc.id())
                .fetch_optional(&mut *tx)
                .await?;
        let Some((data,)) = row else {
            return Err(StoreError::NotFound(doc.clone()));
        };

        let mut data = parse(doc, &data)?;
        apply_updates(&mut data, updates);

        sqlx::query("UPDATE documents SET data=? WHERE collection=? AND id=?")
            .bind(data.to_string())
            .bind(doc.collection())
            .bind(doc.id())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.publish(doc);
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT id, data FROM documents WHERE collection = ");
        builder.push_bind(query.collection.clone());

        if let Some(filter) = &query.filter {
            push_filter(&mut builder, filter);
        }

        match &query.order_by {
            Some((field, direction)) => {
                builder.push(" ORDER BY json_extract(data, ");
                builder.push_bind(json_path(field));
                builder.push(match direction {
                    Direction::Ascending => ") ASC, id",
                    Direction::Descending => ") DESC, id",
                });
            }
            None => {
                builder.push(" ORDER BY id");
            }
        }

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<(String, String)> = builder.build_query_as().fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(id, data)| {
                let reference = DocRef::new(query.collection.clone(), id);
                let data = parse(&reference, &data)?;
                Ok(Document { reference, data })
            })
            .collect()
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}
