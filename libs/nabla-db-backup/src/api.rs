//! Remote backup API client
//!
//! JSON over HTTP. Every request carries the `x-nabla` API key (when one is
//! configured) and the configured `User-Agent`.

use crate::config::ApiConfig;
use crate::metrics::{endpoint_label, API_REQUESTS_TOTAL, API_REQUEST_DURATION_SECONDS};
use crate::models::{Backup, BackupQuery, BackupSchedule, NewBackup, NewSchedule, SchedulePatch};
use crate::{Error, Result};
use nabla_query::PageResult;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use validator::Validate;

pub const API_KEY_HEADER: &str = "x-nabla";

#[derive(Clone)]
pub struct BackupApiClient {
    client: Client,
    base_url: String,
    base_path: String,
    api_key: String,
    user_agent: String,
}

impl BackupApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = config.effective_base_url();
        let base_path = url::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("api.base_url is not a valid URL: {e}")))?
            .path()
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url,
            base_path,
            api_key: config.key.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, "application/json");
        if !self.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, &self.api_key);
        }
        request
    }

    pub fn create_backup_request(&self, backup: &NewBackup) -> Result<RequestBuilder> {
        backup.validate()?;
        Ok(self.request(Method::POST, "/backups").json(backup))
    }

    pub fn query_backups_request(&self, query: &BackupQuery) -> RequestBuilder {
        let mut path = String::from("/backups");
        let pairs = query.to_query_pairs();
        if !pairs.is_empty() {
            let query_params: Vec<String> = pairs
                .iter()
                .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
                .collect();
            path.push('?');
            path.push_str(&query_params.join("&"));
        }
        self.request(Method::GET, &path)
    }

    pub fn get_backup_request(&self, id: &str) -> RequestBuilder {
        self.request(
            Method::GET,
            &format!("/backups/{}", urlencoding::encode(id)),
        )
    }

    pub fn create_schedule_request(&self, schedule: &NewSchedule) -> Result<RequestBuilder> {
        schedule.validate()?;
        Ok(self
            .request(Method::POST, "/backups/schedules")
            .json(schedule))
    }

    pub fn list_schedules_request(&self) -> RequestBuilder {
        self.request(Method::GET, "/backups/schedules")
    }

    pub fn get_schedule_request(&self, id: &str) -> RequestBuilder {
        self.request(
            Method::GET,
            &format!("/backups/schedules/{}", urlencoding::encode(id)),
        )
    }

    pub fn update_schedule_request(
        &self,
        id: &str,
        patch: &SchedulePatch,
    ) -> Result<RequestBuilder> {
        if patch.is_empty() {
            return Err(Error::Validation(
                "schedule update needs at least one field".to_string(),
            ));
        }
        patch.validate()?;
        Ok(self
            .request(
                Method::PATCH,
                &format!("/backups/schedules/{}", urlencoding::encode(id)),
            )
            .json(patch))
    }

    pub fn delete_schedule_request(&self, id: &str) -> RequestBuilder {
        self.request(
            Method::DELETE,
            &format!("/backups/schedules/{}", urlencoding::encode(id)),
        )
    }

    /// Ask the service to record (and run) a backup.
    pub async fn create_backup(&self, backup: &NewBackup) -> Result<Backup> {
        let request = self.create_backup_request(backup)?;
        self.send_json(request).await
    }

    pub async fn query_backups(&self, query: &BackupQuery) -> Result<PageResult<Backup>> {
        self.send_json(self.query_backups_request(query)).await
    }

    pub async fn get_backup(&self, id: &str) -> Result<Backup> {
        self.send_json(self.get_backup_request(id)).await
    }

    pub async fn create_schedule(&self, schedule: &NewSchedule) -> Result<BackupSchedule> {
        let request = self.create_schedule_request(schedule)?;
        self.send_json(request).await
    }

    pub async fn list_schedules(&self) -> Result<Vec<BackupSchedule>> {
        self.send_json(self.list_schedules_request()).await
    }

    pub async fn get_schedule(&self, id: &str) -> Result<BackupSchedule> {
        self.send_json(self.get_schedule_request(id)).await
    }

    pub async fn update_schedule(&self, id: &str, patch: &SchedulePatch) -> Result<BackupSchedule> {
        let request = self.update_schedule_request(id, patch)?;
        self.send_json(request).await
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<()> {
        self.send(self.delete_schedule_request(id)).await?;
        Ok(())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = request.build()?;
        let method = request.method().as_str().to_string();
        let path = request.url().path().to_string();
        let endpoint = endpoint_label(path.strip_prefix(&self.base_path).unwrap_or(&path));

        let start = Instant::now();
        let result = self.client.execute(request).await;
        API_REQUEST_DURATION_SECONDS
            .with_label_values(&[&method, &endpoint])
            .observe(start.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                API_REQUESTS_TOTAL
                    .with_label_values(&[&method, &endpoint, "error"])
                    .inc();
                tracing::warn!(%method, %endpoint, error = %e, "Backup API request failed");
                return Err(e.into());
            }
        };

        let status = response.status();
        API_REQUESTS_TOTAL
            .with_label_values(&[&method, &endpoint, status.as_str()])
            .inc();
        tracing::debug!(
            %method,
            %endpoint,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Backup API request"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("{path}: {message}")));
        }
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// `message` of a JSON error body, or the body itself when it is plain text.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        Err(_) => Some(body.to_string()),
    }
}
