//! RedisTimeSeries client over a multiplexed `redis` connection

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Cmd, FromRedisValue, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::store::{KeyValueStore, TimeSeriesStore};
use crate::types::{Aggregation, CompactionRule, DataPoint, SeriesEntry, SeriesOptions};
use crate::{Result, TsdbError};

/// Connection settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Redis client sharing one multiplexed connection across callers. The
/// connection is opened on first use and reopened after a transport failure.
#[derive(Debug)]
pub struct RedisTsClient {
    client: Client,
    options: ClientOptions,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisTsClient {
    /// Accepts `redis://[[user]:password@]host[:port][/db]`; does not connect
    pub fn open(url: &str, options: ClientOptions) -> Result<Self> {
        let client =
            Client::open(url).map_err(|e| TsdbError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self {
            client,
            options,
            conn: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let timeout = self.options.connect_timeout;
        let conn = tokio::time::timeout(timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| TsdbError::Timeout(timeout))??;
        info!("Connected to store");

        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        let mut conn = self.connection().await?;
        let reply: redis::RedisResult<T> = cmd.query_async(&mut conn).await;

        match reply {
            Ok(value) => Ok(value),
            Err(e) => {
                let err = TsdbError::from(e);
                if err.is_unavailable() {
                    debug!(error = %err, "Dropping store connection");
                    *self.conn.lock().await = None;
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl TimeSeriesStore for RedisTsClient {
    #[instrument(skip(self, options))]
    async fn create_series(&self, key: &str, options: &SeriesOptions) -> Result<()> {
        let mut cmd = redis::cmd("TS.CREATE");
        cmd.arg(key);
        if let Some(retention) = options.retention {
            cmd.arg("RETENTION").arg(retention.as_millis() as u64);
        }
        cmd.arg("DUPLICATE_POLICY")
            .arg(options.duplicate_policy.as_str());
        if !options.labels.is_empty() {
            cmd.arg("LABELS");
            for (name, value) in &options.labels {
                cmd.arg(name).arg(value);
            }
        }

        self.query(&cmd).await
    }

    #[instrument(skip(self))]
    async fn create_compaction_rule(&self, rule: &CompactionRule) -> Result<()> {
        let mut cmd = redis::cmd("TS.CREATERULE");
        cmd.arg(&rule.source)
            .arg(&rule.dest)
            .arg("AGGREGATION")
            .arg(rule.aggregation.as_str())
            .arg(rule.bucket_ms);
        self.query(&cmd).await
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn append_many(&self, entries: &[SeriesEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut cmd = redis::cmd("TS.MADD");
        for entry in entries {
            cmd.arg(&entry.key).arg(entry.timestamp_ms).arg(entry.value);
        }

        // A rejected sample comes back as an error inside the reply array
        let accepted: Vec<i64> = self.query(&cmd).await.map_err(|e| match e {
            TsdbError::TypeConversion(detail) => TsdbError::Command(format!(
                "batch of {} samples rejected: {}",
                entries.len(),
                detail
            )),
            other => other,
        })?;
        Ok(accepted.len())
    }

    #[instrument(skip(self))]
    async fn range_aggregate(
        &self,
        key: &str,
        from_ms: i64,
        to_ms: Option<i64>,
        aggregation: Aggregation,
        bucket_ms: i64,
    ) -> Result<Vec<DataPoint>> {
        let mut cmd = redis::cmd("TS.RANGE");
        cmd.arg(key).arg(from_ms);
        match to_ms {
            Some(to) => cmd.arg(to),
            None => cmd.arg("+"),
        };
        cmd.arg("AGGREGATION")
            .arg(aggregation.as_str())
            .arg(bucket_ms);

        let rows: Vec<(i64, f64)> = self.query(&cmd).await?;
        Ok(rows
            .into_iter()
            .map(|(timestamp, value)| DataPoint::new(timestamp, value))
            .collect())
    }

    async fn latest(&self, key: &str) -> Result<Option<DataPoint>> {
        let mut cmd = redis::cmd("TS.GET");
        cmd.arg(key);

        let reply: Vec<Value> = self.query(&cmd).await?;
        match reply.as_slice() {
            [] => Ok(None),
            [timestamp, value] => Ok(Some(DataPoint::new(
                i64::from_redis_value(timestamp)?,
                f64::from_redis_value(value)?,
            ))),
            other => Err(TsdbError::Protocol(format!(
                "TS.GET returned {} elements",
                other.len()
            ))),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisTsClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(&cmd).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_ms(ttl));
        }
        self.query(&cmd).await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX").arg("PX").arg(ttl_ms(ttl));
        let reply: Option<String> = self.query(&cmd).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.query(&cmd).await?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<()> {
        let _: String = self.query(&redis::cmd("PING")).await?;
        Ok(())
    }
}

/// Redis rejects a zero expiry
fn ttl_ms(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok};

    /// Remove one complete command from the front of `buf`
    fn take_command(buf: &mut Vec<u8>) -> Option<Vec<String>> {
        let text = std::str::from_utf8(buf).ok()?;
        let mut lines = text.split("\r\n");
        let count: usize = lines.next()?.strip_prefix('*')?.parse().ok()?;

        let mut used = text.find("\r\n")? + 2;
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            let header = lines.next()?;
            let len: usize = header.strip_prefix('$')?.parse().ok()?;
            let data = lines.next()?;
            if data.len() != len {
                return None;
            }
            used += header.len() + 2 + len + 2;
            parts.push(data.to_string());
        }
        if used > buf.len() {
            return None;
        }

        buf.drain(..used);
        Some(parts)
    }

    /// Serve canned replies chosen by command name. Connection setup
    /// commands are acknowledged.
    async fn fake_server(reply: fn(&[String]) -> &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    loop {
                        while let Some(cmd) = take_command(&mut buf) {
                            let out: &[u8] = if cmd[0].eq_ignore_ascii_case("CLIENT") {
                                b"+OK\r\n"
                            } else {
                                reply(&cmd)
                            };
                            if socket.write_all(out).await.is_err() {
                                return;
                            }
                        }
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                });
            }
        });

        addr
    }

    fn client_for(addr: SocketAddr) -> RedisTsClient {
        RedisTsClient::open(&format!("redis://{}", addr), ClientOptions::default()).unwrap()
    }

    #[test]
    fn test_open_validates_url() {
        assert_ok!(RedisTsClient::open("redis://redis:6379", ClientOptions::default()));
        assert_ok!(RedisTsClient::open(
            "redis://:secret@localhost/2",
            ClientOptions::default()
        ));
        let err = assert_err!(RedisTsClient::open("http://localhost", ClientOptions::default()));
        assert!(matches!(err, TsdbError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_create_series_reports_existing_key() {
        let addr = fake_server(|cmd: &[String]| -> &'static [u8] {
            match cmd[0].as_str() {
                "TS.CREATE" if cmd[1] == "exists" => b"-ERR TSDB: key already exists\r\n",
                _ => b"+OK\r\n",
            }
        })
        .await;
        let client = client_for(addr);

        assert_ok!(client.create_series("fresh", &SeriesOptions::default()).await);
        let err = client
            .create_series("exists", &SeriesOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TsdbError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_range_aggregate_parses_rows() {
        let addr = fake_server(|cmd: &[String]| -> &'static [u8] {
            match cmd[0].as_str() {
                "TS.RANGE" => b"*2\r\n*2\r\n:0\r\n$3\r\n1.5\r\n*2\r\n:3600000\r\n$4\r\n2.25\r\n",
                _ => b"-ERR unknown\r\n",
            }
        })
        .await;
        let client = client_for(addr);

        let points = client
            .range_aggregate("k", 0, None, Aggregation::Avg, 3_600_000)
            .await
            .unwrap();
        assert_eq!(
            points,
            vec![DataPoint::new(0, 1.5), DataPoint::new(3_600_000, 2.25)]
        );
    }

    #[tokio::test]
    async fn test_append_many_fails_on_any_rejection() {
        let addr = fake_server(|cmd: &[String]| -> &'static [u8] {
            match cmd[0].as_str() {
                "TS.MADD" => b"*2\r\n:1000\r\n-ERR TSDB: invalid value\r\n",
                _ => b"+OK\r\n",
            }
        })
        .await;
        let client = client_for(addr);

        let result = client
            .append_many(&[SeriesEntry::new("a", 1000, 1.0), SeriesEntry::new("b", 1000, 2.0)])
            .await;
        let err = assert_err!(result);
        assert!(matches!(err, TsdbError::Command(_)));
    }

    #[tokio::test]
    async fn test_key_value_commands() {
        let addr = fake_server(|cmd: &[String]| -> &'static [u8] {
            match cmd[0].as_str() {
                "GET" if cmd[1] == "missing" => b"$-1\r\n",
                "GET" => b"$5\r\nhello\r\n",
                "SET" if cmd.iter().any(|a| a == "NX") => b"$-1\r\n",
                "SET" => b"+OK\r\n",
                "DEL" => b":1\r\n",
                "PING" => b"+PONG\r\n",
                "TS.GET" if cmd[1] == "empty" => b"*0\r\n",
                "TS.GET" => b"*2\r\n:1000\r\n$3\r\n0.5\r\n",
                _ => b"-ERR unknown\r\n",
            }
        })
        .await;
        let client = client_for(addr);

        assert_eq!(client.get("missing").await.unwrap(), None);
        assert_eq!(client.get("k").await.unwrap().as_deref(), Some("hello"));
        assert_ok!(client.set("k", "v", Some(Duration::from_secs(1))).await);
        assert!(!client.set_nx("k", "v", Duration::from_secs(1)).await.unwrap());
        assert!(client.delete("k").await.unwrap());
        assert_ok!(client.ping().await);
        assert_eq!(client.latest("empty").await.unwrap(), None);
        assert_eq!(
            client.latest("series").await.unwrap(),
            Some(DataPoint::new(1000, 0.5))
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(addr).ping().await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_live_redis_round_trip() {
        // Requires Redis Stack; skipped without REDIS_URL
        let Ok(url) = std::env::var("REDIS_URL") else {
            return;
        };
        let client = RedisTsClient::open(&url, ClientOptions::default()).unwrap();
        let key = "lit-tsdb-test:series";
        let _ = client.delete(key).await;

        assert_ok!(client.create_series(key, &SeriesOptions::default()).await);
        client
            .append_many(&[SeriesEntry::new(key, 1000, 1.0), SeriesEntry::new(key, 1000, 9.0)])
            .await
            .unwrap();
        assert_eq!(client.latest(key).await.unwrap(), Some(DataPoint::new(1000, 1.0)));
        let _ = client.delete(key).await;
    }
}
