//! Redis sink
//!
//! Layout under a configurable prefix:
//! - `{prefix}:event:{id}`: JSON-encoded [`StoredEvent`], with `EX` when a TTL applies
//! - `{prefix}:idx:scope:{scope}`, `{prefix}:idx:origin:{origin}`,
//!   `{prefix}:idx:name:{name}`: sets of row ids
//! - `{prefix}:expiry`: sorted set of TTL'd row ids scored by expiry (unix seconds)
//! - `{prefix}:refs:{id}`: index sets a TTL'd row belongs to
//!
//! Ingest is a non-transactional pipeline. Index sets never expire on their
//! own: every sink call first sweeps rows whose expiry has passed out of all
//! of their index sets, and ids a query finds without a row are dropped the
//! same way.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use myko_common::{AggregatedRecord, EventFilter, EventSink, MykoError, Result, StoredEvent};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::{debug, instrument, warn};

/// Upper bound on expired rows removed per sweep
const SWEEP_BATCH: usize = 256;

/// Redis-backed event store
pub struct RedisSink {
    /// Reconnecting connection handle
    connection: ConnectionManager,
    /// Key prefix
    prefix: String,
    /// TTL applied to every ingested row
    default_ttl: Option<Duration>,
}

impl RedisSink {
    /// Connect to Redis
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| MykoError::Config(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| MykoError::Backend(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            prefix: "myko".to_string(),
            default_ttl: None,
        })
    }

    /// Use a custom key prefix
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Expire every ingested row after `ttl`
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Get a connection handle.
    ///
    /// The manager re-establishes a dropped connection on the call after a
    /// failure, so a restarted server is picked up by the next flush retry.
    fn get_connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Row ids matching every present filter field
    async fn matching_ids(
        &self,
        conn: &mut ConnectionManager,
        filter: &EventFilter,
    ) -> Result<Vec<String>> {
        let keys = filter_index_keys(&self.prefix, filter);
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        conn.sinter(&keys)
            .await
            .map_err(|e| MykoError::Backend(format!("Redis SINTER failed: {}", e)))
    }

    /// Load rows by id, returning live rows and ids whose row has expired
    async fn load_rows(
        &self,
        conn: &mut ConnectionManager,
        ids: &[String],
    ) -> Result<(Vec<StoredEvent>, Vec<String>)> {
        if ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let keys: Vec<String> = ids.iter().map(|id| row_key(&self.prefix, id)).collect();
        // Explicit MGET: `AsyncCommands::mget` issues GET for a single key.
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(conn)
            .await
            .map_err(|e| MykoError::Backend(format!("Redis MGET failed: {}", e)))?;

        let mut rows = Vec::with_capacity(values.len());
        let mut dangling = Vec::new();
        for (id, value) in ids.iter().zip(values) {
            match value {
                Some(json) => rows.push(serde_json::from_str::<StoredEvent>(&json)?),
                None => dangling.push(id.clone()),
            }
        }
        Ok((rows, dangling))
    }

    /// Drop rows whose expiry has passed from every index set they joined
    async fn sweep_expired(&self, conn: &mut ConnectionManager, now: DateTime<Utc>) -> Result<()> {
        let ids: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(expiry_key(&self.prefix))
            .arg("-inf")
            .arg(now.timestamp())
            .arg("LIMIT")
            .arg(0)
            .arg(SWEEP_BATCH)
            .query_async(conn)
            .await
            .map_err(|e| MykoError::Backend(format!("Redis ZRANGEBYSCORE failed: {}", e)))?;

        if !ids.is_empty() {
            debug!(count = ids.len(), "Sweeping expired rows from indexes");
            self.forget_rows(conn, &ids).await?;
        }
        Ok(())
    }

    /// Remove rows and every trace of them: index memberships, refs and expiry
    async fn forget_rows(&self, conn: &mut ConnectionManager, ids: &[String]) -> Result<()> {
        let mut lookup = redis::pipe();
        for id in ids {
            lookup.smembers(refs_key(&self.prefix, id));
        }
        let memberships: Vec<Vec<String>> = lookup
            .query_async(conn)
            .await
            .map_err(|e| MykoError::Backend(format!("Redis SMEMBERS failed: {}", e)))?;

        let mut pipe = redis::pipe();
        for (id, indexes) in ids.iter().zip(memberships) {
            for index in indexes {
                pipe.srem(index, id).ignore();
            }
            pipe.del(row_key(&self.prefix, id)).ignore();
            pipe.del(refs_key(&self.prefix, id)).ignore();
            pipe.zrem(expiry_key(&self.prefix), id).ignore();
        }
        pipe.query_async::<_, ()>(conn)
            .await
            .map_err(|e| MykoError::Backend(format!("Redis cleanup failed: {}", e)))
    }
}

#[async_trait]
impl EventSink for RedisSink {
    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn ingest(&self, records: &[AggregatedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let mut pipe = redis::pipe();

        for record in records {
            let row = StoredEvent::from_record(record, now, self.default_ttl)?;
            let id = row.id.to_string();
            let key = row_key(&self.prefix, &id);
            let json = serde_json::to_string(&row)?;
            let indexes = row_index_keys(&self.prefix, &row);

            match (self.default_ttl, row.expires_at) {
                (Some(ttl), Some(expires_at)) => {
                    pipe.set_ex(&key, json, ttl.as_secs().max(1)).ignore();
                    pipe.zadd(expiry_key(&self.prefix), &id, expires_at.timestamp())
                        .ignore();
                    pipe.sadd(refs_key(&self.prefix, &id), &indexes).ignore();
                }
                _ => {
                    pipe.set(&key, json).ignore();
                }
            }
            for index in &indexes {
                pipe.sadd(index, &id).ignore();
            }
        }

        let mut conn = self.get_connection();
        pipe.query_async::<_, ()>(&mut conn).await.map_err(|e| {
            warn!("Redis ingest error: {}", e);
            MykoError::Backend(format!("Redis ingest failed: {}", e))
        })?;
        debug!(rows = records.len(), "Ingested rows");

        if self.default_ttl.is_some() {
            // Rows are already persisted; a failed sweep is retried next call.
            if let Err(e) = self.sweep_expired(&mut conn, now).await {
                warn!(error = %e, "Expired row sweep failed");
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        let mut conn = self.get_connection();
        self.sweep_expired(&mut conn, Utc::now()).await?;

        let ids = self.matching_ids(&mut conn, filter).await?;
        let (mut rows, dangling) = self.load_rows(&mut conn, &ids).await?;

        if !dangling.is_empty() {
            debug!(count = dangling.len(), "Pruning index members of expired rows");
            self.forget_rows(&mut conn, &dangling).await?;
            // Rows ingested without refs are still listed in the filter's sets.
            for index in filter_index_keys(&self.prefix, filter) {
                conn.srem::<_, _, ()>(&index, &dangling)
                    .await
                    .map_err(|e| MykoError::Backend(format!("Redis SREM failed: {}", e)))?;
            }
        }

        rows.retain(|row| filter.matches(row));
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn delete(&self, filter: &EventFilter) -> Result<u64> {
        let mut conn = self.get_connection();
        self.sweep_expired(&mut conn, Utc::now()).await?;

        let ids = self.matching_ids(&mut conn, filter).await?;
        let (rows, dangling) = self.load_rows(&mut conn, &ids).await?;

        if !rows.is_empty() {
            let mut pipe = redis::pipe();
            for row in &rows {
                let id = row.id.to_string();
                pipe.del(row_key(&self.prefix, &id)).ignore();
                pipe.del(refs_key(&self.prefix, &id)).ignore();
                pipe.zrem(expiry_key(&self.prefix), &id).ignore();
                for index in row_index_keys(&self.prefix, row) {
                    pipe.srem(index, &id).ignore();
                }
            }
            pipe.query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| MykoError::Backend(format!("Redis delete failed: {}", e)))?;
        }
        if !dangling.is_empty() {
            self.forget_rows(&mut conn, &dangling).await?;
        }

        debug!(deleted = rows.len(), "Deleted rows");
        Ok(rows.len() as u64)
    }
}

fn row_key(prefix: &str, id: &str) -> String {
    format!("{}:event:{}", prefix, id)
}

fn refs_key(prefix: &str, id: &str) -> String {
    format!("{}:refs:{}", prefix, id)
}

fn expiry_key(prefix: &str) -> String {
    format!("{}:expiry", prefix)
}

fn index_key(prefix: &str, field: &str, value: &str) -> String {
    format!("{}:idx:{}:{}", prefix, field, value)
}

/// Index sets a row is a member of
fn row_index_keys(prefix: &str, row: &StoredEvent) -> Vec<String> {
    let mut keys = Vec::with_capacity(3);
    if !row.scope.is_empty() {
        keys.push(index_key(prefix, "scope", &row.scope));
    }
    keys.push(index_key(prefix, "origin", &row.origin));
    keys.push(index_key(prefix, "name", &row.name));
    keys
}

/// Index sets whose intersection answers the filter
fn filter_index_keys(prefix: &str, filter: &EventFilter) -> Vec<String> {
    [
        ("scope", &filter.scope),
        ("origin", &filter.origin),
        ("name", &filter.name),
    ]
    .into_iter()
    .filter_map(|(field, value)| {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| index_key(prefix, field, v))
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use myko_common::Event;

    fn row(scope: &str) -> StoredEvent {
        let record = AggregatedRecord::from_event(scope, "api", &Event::new("lat", 1.0));
        StoredEvent::from_record(&record, Utc::now(), None).unwrap()
    }

    #[test]
    fn test_row_key() {
        assert_eq!(row_key("myko", "abc"), "myko:event:abc");
        assert_eq!(refs_key("myko", "abc"), "myko:refs:abc");
        assert_eq!(expiry_key("myko"), "myko:expiry");
    }

    #[test]
    fn test_row_index_keys() {
        let keys = row_index_keys("myko", &row("trace_1"));
        assert_eq!(
            keys,
            vec![
                "myko:idx:scope:trace_1",
                "myko:idx:origin:api",
                "myko:idx:name:lat"
            ]
        );

        // Unscoped rows are only reachable through origin.
        let keys = row_index_keys("myko", &row(""));
        assert_eq!(keys, vec!["myko:idx:origin:api", "myko:idx:name:lat"]);
    }

    #[test]
    fn test_filter_index_keys() {
        let filter = EventFilter::by_origin("api").with_name("lat");
        assert_eq!(
            filter_index_keys("m", &filter),
            vec!["m:idx:origin:api", "m:idx:name:lat"]
        );

        let filter = EventFilter {
            scope: Some("t1".into()),
            origin: Some(String::new()),
            name: None,
        };
        assert_eq!(filter_index_keys("m", &filter), vec!["m:idx:scope:t1"]);
        assert!(filter_index_keys("m", &EventFilter::default()).is_empty());
    }

    #[test]
    fn test_row_encoding_keeps_expiry() {
        let record = AggregatedRecord::from_event("t1", "api", &Event::new("lat", 2.5));
        let stored =
            StoredEvent::from_record(&record, Utc::now(), Some(Duration::from_secs(30))).unwrap();

        let json = serde_json::to_string(&stored).unwrap();
        let decoded: StoredEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, stored);
        assert!(decoded.expires_at.is_some());
    }

    // Live tests, run with `REDIS_URL=redis://localhost:6379 cargo test -- --ignored`.

    async fn live_sink() -> Option<(RedisSink, ConnectionManager)> {
        let url = std::env::var("REDIS_URL").ok()?;
        let prefix = format!("myko-test-{}", uuid::Uuid::new_v4());
        let sink = RedisSink::connect(&url).await.unwrap().with_prefix(&prefix);
        let conn = sink.get_connection();
        Some((sink, conn))
    }

    fn record(scope: &str, origin: &str, name: &str, value: f64) -> AggregatedRecord {
        AggregatedRecord::from_event(scope, origin, &Event::new(name, value))
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_redis_ingest_query_delete() {
        let Some((sink, mut conn)) = live_sink().await else {
            return;
        };
        let prefix = sink.prefix.clone();

        sink.ingest(&[
            record("t1", "api", "lat", 10.0),
            record("t1", "api", "cnt", 1.0),
            record("", "api", "lat", 5.0),
            record("t2", "web", "lat", 7.0),
        ])
        .await
        .unwrap();

        // Single-key intersection exercises the explicit MGET path.
        let rows = sink.query(&EventFilter::by_scope("t2")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].origin, "web");

        let rows = sink
            .query(&EventFilter::by_origin("api").with_name("lat"))
            .await
            .unwrap();
        let mut values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        values.sort_by(f64::total_cmp);
        assert_eq!(values, vec![5.0, 10.0]);

        assert_eq!(sink.delete(&EventFilter::by_scope("t1")).await.unwrap(), 2);
        assert!(sink.query(&EventFilter::by_scope("t1")).await.unwrap().is_empty());

        // Deleted rows leave no members behind in the other index sets.
        let api: Vec<String> = conn.smembers(index_key(&prefix, "origin", "api")).await.unwrap();
        assert_eq!(api.len(), 1);
        let cnt: u64 = conn.scard(index_key(&prefix, "name", "cnt")).await.unwrap();
        assert_eq!(cnt, 0);

        assert_eq!(sink.delete(&EventFilter::by_origin("api")).await.unwrap(), 1);
        assert_eq!(sink.delete(&EventFilter::by_origin("web")).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_redis_expired_rows_leave_every_index() {
        let Some((sink, mut conn)) = live_sink().await else {
            return;
        };
        let sink = sink.with_ttl(Duration::from_secs(1));
        let prefix = sink.prefix.clone();

        sink.ingest(&[record("t1", "api", "lat", 10.0)]).await.unwrap();
        let rows = sink.query(&EventFilter::by_scope("t1")).await.unwrap();
        assert_eq!(rows.len(), 1);
        let id = rows[0].id.to_string();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        // Querying one index must clean the row out of all three.
        assert!(sink.query(&EventFilter::by_scope("t1")).await.unwrap().is_empty());
        for (field, value) in [("scope", "t1"), ("origin", "api"), ("name", "lat")] {
            let members: u64 = conn.scard(index_key(&prefix, field, value)).await.unwrap();
            assert_eq!(members, 0, "{field}");
        }
        let refs: bool = conn.exists(refs_key(&prefix, &id)).await.unwrap();
        assert!(!refs);
        let pending: u64 = conn.zcard(expiry_key(&prefix)).await.unwrap();
        assert_eq!(pending, 0);
    }
}
