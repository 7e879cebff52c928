#![allow(dead_code)]

use anyhow::Context as _;
use futures::FutureExt as _;
use nabla_db_backup::config::DatabaseConfig;
use nabla_db_backup::store::PgDocumentStore;
use nabla_db_backup::{models, Connection};
use sqlx::Connection as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

/// Request as received by [`MockApi`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

/// One-shot HTTP server answering each connection with the next canned
/// response.
pub struct MockApi {
    pub base_url: String,
    requests: mpsc::UnboundedReceiver<RecordedRequest>,
}

impl MockApi {
    pub async fn start(responses: Vec<(u16, &str)>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind mock API")?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let responses: Vec<(u16, String)> = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let _ = tx.send(request);
                let response = format!(
                    "HTTP/1.1 {status} MOCK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Ok(Self {
            base_url: format!("http://{addr}/v1"),
            requests: rx,
        })
    }

    pub async fn next_request(&mut self) -> RecordedRequest {
        self.requests.recv().await.expect("mock API received a request")
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    Some(RecordedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Database used by store tests; they are skipped without it.
pub fn test_database_url() -> Option<String> {
    std::env::var("NABLA_TEST_DATABASE_URL").ok()
}

/// Store in a fresh schema of the test database.
pub struct TestStore {
    pub connection: Connection,
    pub store: PgDocumentStore,
    schema: String,
    admin_database_url: String,
}

impl TestStore {
    pub async fn new(admin_database_url: &str) -> anyhow::Result<Self> {
        let schema = format!("test_{}", Uuid::new_v4().simple());
        let mut admin_conn = sqlx::PgConnection::connect(admin_database_url)
            .await
            .context("connect admin db for schema create")?;
        sqlx::query(&format!(r#"CREATE SCHEMA "{}""#, schema))
            .execute(&mut admin_conn)
            .await
            .context("create test schema")?;

        let config = DatabaseConfig {
            url: with_search_path(admin_database_url, &schema)?,
            pool_min_size: 0,
            pool_max_size: Some(4),
            ..DatabaseConfig::default()
        };
        let connection = Connection::connect(&config)
            .await
            .context("connect test pool")?;
        let store = PgDocumentStore::new(connection.pool().clone(), models::registry());
        store.migrate().await.context("migrate test schema")?;

        Ok(Self {
            connection,
            store,
            schema,
            admin_database_url: admin_database_url.to_string(),
        })
    }

    pub async fn cleanup(self) -> anyhow::Result<()> {
        self.connection.close().await;

        let mut admin_conn = sqlx::PgConnection::connect(&self.admin_database_url)
            .await
            .context("connect admin db for schema drop")?;
        sqlx::query(&format!(r#"DROP SCHEMA "{}" CASCADE"#, self.schema))
            .execute(&mut admin_conn)
            .await
            .context("drop test schema")?;
        Ok(())
    }
}

pub async fn with_test_store<F>(f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(
        &'a TestStore,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'a>,
    >,
{
    let Some(url) = test_database_url() else {
        eprintln!("NABLA_TEST_DATABASE_URL not set, skipping");
        return Ok(());
    };
    init_tracing();
    let store = TestStore::new(&url).await?;

    let result = std::panic::AssertUnwindSafe(f(&store)).catch_unwind().await;
    if let Err(e) = store.cleanup().await {
        eprintln!("test schema cleanup failed: {e:?}");
    }

    match result {
        Ok(r) => r,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn with_search_path(database_url: &str, schema: &str) -> anyhow::Result<String> {
    let mut url = Url::parse(database_url).context("parse database URL")?;
    url.query_pairs_mut()
        .append_pair("options", &format!("-c search_path={}", schema));
    Ok(url.to_string())
}

pub fn init_tracing() {
    use std::sync::OnceLock;
    use tracing_subscriber::prelude::*;
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "nabla_db_backup=info,sqlx=warn".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
