//! OneFS platform API (v11) client for SyncIQ objects.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ReplicationApi;
use crate::error::{ApiError, Result};
use crate::models::{Job, JobAction, JobRequest, Policy, PolicySpec, PolicyUpdate, Report, TargetPolicy};

const API_PREFIX: [&str; 3] = ["platform", "11", "sync"];

/// Connection settings for [`HttpArray`].
#[derive(Debug, Clone)]
pub struct HttpArrayConfig {
    /// Base URL of the cluster, e.g. `https://onefs.example.com:8080`.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Accept self-signed certificates. Common on lab clusters.
    pub insecure_skip_verify: bool,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout: Duration,
}

impl Default for HttpArrayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://localhost:8080".to_string(),
            username: "root".to_string(),
            password: String::new(),
            insecure_skip_verify: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// [`ReplicationApi`] over HTTPS with basic authentication.
#[derive(Debug, Clone)]
pub struct HttpArray {
    client: Client,
    base: Url,
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct PoliciesEnvelope<T> {
    #[serde(default = "Vec::new")]
    policies: Vec<T>,
}

#[derive(Deserialize)]
struct ReportsEnvelope {
    #[serde(default)]
    reports: Vec<Report>,
}

#[derive(Deserialize)]
struct CreatedId {
    id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobResponse {
    Envelope { jobs: Vec<Job> },
    Single(Job),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct CreatePolicyBody<'a> {
    #[serde(flatten)]
    spec: &'a PolicySpec,
    action: JobAction,
    schedule: &'static str,
}

/// Extracts a readable message from the array's error envelope.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.errors.is_empty() => envelope
            .errors
            .iter()
            .map(|e| {
                if e.code.is_empty() {
                    e.message.clone()
                } else {
                    format!("{}: {}", e.code, e.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.trim().to_string(),
    }
}

impl HttpArray {
    pub fn new(config: HttpArrayConfig) -> Result<Self> {
        let base = Url::parse(&config.endpoint).map_err(|e| ApiError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidEndpoint {
                endpoint: config.endpoint,
                reason: "not a base URL".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|source| ApiError::Http {
                path: config.endpoint.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base,
            username: config.username,
            password: config.password,
        })
    }

    /// Builds `<base>/platform/11/sync/<segments...>` with each segment escaped.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(API_PREFIX).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, path = url.path(), "SyncIQ API request");
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response> {
        let response = builder.send().await.map_err(|source| ApiError::Http {
            path: path.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T> {
        let bytes = response.bytes().await.map_err(|source| ApiError::Http {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn get_first_policy<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Option<T>> {
        let url = self.url(segments);
        let path = url.path().to_string();
        let response = match self.send(self.request(Method::GET, url), &path).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let envelope: PoliciesEnvelope<T> = Self::decode(response, &path).await?;
        Ok(envelope.policies.into_iter().next())
    }
}

#[async_trait]
impl ReplicationApi for HttpArray {
    async fn get_policy(&self, name: &str) -> Result<Option<Policy>> {
        self.get_first_policy(&["policies", name]).await
    }

    async fn get_target_policy(&self, name: &str) -> Result<Option<TargetPolicy>> {
        self.get_first_policy(&["target", "policies", name]).await
    }

    async fn create_policy(&self, spec: &PolicySpec) -> Result<String> {
        let url = self.url(&["policies"]);
        let path = url.path().to_string();
        let body = CreatePolicyBody {
            spec,
            action: JobAction::Sync,
            schedule: "when-source-modified",
        };
        let response = self
            .send(self.request(Method::POST, url).json(&body), &path)
            .await?;
        let created: CreatedId = Self::decode(response, &path).await?;
        Ok(created.id)
    }

    async fn delete_policy(&self, name: &str) -> Result<()> {
        let url = self.url(&["policies", name]);
        let path = url.path().to_string();
        self.send(self.request(Method::DELETE, url), &path).await?;
        Ok(())
    }

    async fn delete_target_policy(&self, id: &str) -> Result<()> {
        let url = self.url(&["target", "policies", id]);
        let path = url.path().to_string();
        self.send(self.request(Method::DELETE, url), &path).await?;
        Ok(())
    }

    async fn update_policy(&self, update: &PolicyUpdate) -> Result<()> {
        let url = self.url(&["policies", &update.id]);
        let path = url.path().to_string();
        self.send(self.request(Method::PUT, url).json(update), &path)
            .await?;
        Ok(())
    }

    async fn reset_policy(&self, name: &str) -> Result<()> {
        let url = self.url(&["policies", name, "reset"]);
        let path = url.path().to_string();
        self.send(
            self.request(Method::POST, url).json(&serde_json::json!({})),
            &path,
        )
        .await?;
        Ok(())
    }

    async fn submit_job(&self, request: &JobRequest) -> Result<Job> {
        let url = self.url(&["jobs"]);
        let path = url.path().to_string();
        let response = self
            .send(self.request(Method::POST, url).json(request), &path)
            .await?;
        let mut job = match Self::decode::<JobResponse>(response, &path).await? {
            JobResponse::Envelope { jobs } => {
                jobs.into_iter()
                    .next()
                    .ok_or_else(|| ApiError::EmptyResponse {
                        path: path.clone(),
                        what: "job",
                    })?
            }
            JobResponse::Single(job) => job,
        };
        if job.policy_name.is_empty() {
            job.policy_name = request.id.clone();
        }
        if job.action.is_none() {
            job.action = request.action;
        }
        Ok(job)
    }

    async fn get_report(&self, id: &str) -> Result<Report> {
        let url = self.url(&["reports", id]);
        let path = url.path().to_string();
        let response = self.send(self.request(Method::GET, url), &path).await?;
        let envelope: ReportsEnvelope = Self::decode(response, &path).await?;
        envelope
            .reports
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound {
                kind: "report",
                name: id.to_string(),
            })
    }

    async fn get_reports_by_policy(&self, name: &str, limit: usize) -> Result<Vec<Report>> {
        let url = self.url(&["reports"]);
        let path = url.path().to_string();
        let limit = limit.to_string();
        let builder = self
            .request(Method::GET, url)
            .query(&[("policy_name", name), ("reports_per_policy", limit.as_str())]);
        let response = self.send(builder, &path).await?;
        let envelope: ReportsEnvelope = Self::decode(response, &path).await?;
        Ok(envelope.reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(endpoint: &str) -> HttpArray {
        HttpArray::new(HttpArrayConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let err = HttpArray::new(HttpArrayConfig {
            endpoint: "not a url".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_url_building_escapes_names() {
        let array = array("https://cluster.local:8080");
        let url = array.url(&["policies", "pol one/two"]);
        assert_eq!(
            url.as_str(),
            "https://cluster.local:8080/platform/11/sync/policies/pol%20one%2Ftwo"
        );
    }

    #[test]
    fn test_url_building_with_trailing_slash() {
        let array = array("https://cluster.local:8080/");
        let url = array.url(&["target", "policies", "p1"]);
        assert_eq!(url.path(), "/platform/11/sync/target/policies/p1");
    }

    #[test]
    fn test_error_message_uses_envelope() {
        let body = r#"{"errors":[{"code":"AEC_NOT_FOUND","message":"Policy pol1 not found"}]}"#;
        assert_eq!(error_message(body), "AEC_NOT_FOUND: Policy pol1 not found");
        assert_eq!(error_message("  plain failure \n"), "plain failure");
    }

    #[test]
    fn test_create_body_flattens_spec() {
        let spec = PolicySpec {
            name: "pol1".to_string(),
            source_root_path: "/ifs/data/src".to_string(),
            target_path: "/ifs/data/dst".to_string(),
            target_host: "10.0.0.2".to_string(),
            job_delay: 300,
            enabled: true,
        };
        let body = CreatePolicyBody {
            spec: &spec,
            action: JobAction::Sync,
            schedule: "when-source-modified",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["name"], "pol1");
        assert_eq!(json["job_delay"], 300);
        assert_eq!(json["action"], "sync");
        assert_eq!(json["schedule"], "when-source-modified");
    }

    #[test]
    fn test_job_response_shapes() {
        let enveloped: JobResponse =
            serde_json::from_str(r#"{"jobs":[{"id":"12","policy_name":"pol1","state":"running"}]}"#)
                .unwrap();
        assert!(matches!(enveloped, JobResponse::Envelope { ref jobs } if jobs.len() == 1));

        let single: JobResponse = serde_json::from_str(r#"{"id":"pol1"}"#).unwrap();
        assert!(matches!(single, JobResponse::Single(ref job) if job.id == "pol1"));
    }

    #[test]
    fn test_policies_envelope_decodes_policy() {
        let envelope: PoliciesEnvelope<Policy> = serde_json::from_str(
            r#"{"policies":[{"id":"abc","name":"pol1","enabled":true,"job_delay":600,
                "last_job_state":"finished","action":"sync"}]}"#,
        )
        .unwrap();
        let policy = &envelope.policies[0];
        assert_eq!(policy.job_delay, 600);
        assert_eq!(policy.last_job_state, Some(crate::models::JobState::Finished));
    }

    /// Serves a single canned HTTP response on a local port and returns its endpoint.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_policy_not_found_maps_to_none() {
        let endpoint = serve_once(
            "404 Not Found",
            r#"{"errors":[{"code":"AEC_NOT_FOUND","message":"Policy pol1 not found"}]}"#,
        )
        .await;
        let policy = array(&endpoint).get_policy("pol1").await.unwrap();
        assert!(policy.is_none());
    }

    #[tokio::test]
    async fn test_target_policy_not_found_maps_to_none() {
        let endpoint = serve_once("404 Not Found", "").await;
        let target = array(&endpoint).get_target_policy("pol1").await.unwrap();
        assert!(target.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let endpoint = serve_once(
            "500 Internal Server Error",
            r#"{"errors":[{"code":"AEC_EXCEPTION","message":"busy"}]}"#,
        )
        .await;
        let err = array(&endpoint).get_policy("pol1").await.unwrap_err();
        assert!(!err.is_not_found());
        match err {
            ApiError::Status { status, message, path } => {
                assert_eq!(status, 500);
                assert_eq!(message, "AEC_EXCEPTION: busy");
                assert_eq!(path, "/platform/11/sync/policies/pol1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_reports_with_phase_actions_decode() {
        let endpoint = serve_once(
            "200 OK",
            r#"{"reports":[
                {"id":"r2","policy_name":"pol1","policy":{"name":"pol1","action":"resync_prep_restore"},"end_time":100,"state":"finished"},
                {"id":"r1","policy_name":"pol1","policy":{"name":"pol1","action":"sync"},"end_time":90,"state":"finished"}
            ]}"#,
        )
        .await;
        let reports = array(&endpoint)
            .get_reports_by_policy("pol1", 5)
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].policy.action, JobAction::Unknown);
        assert_eq!(reports[1].policy.action, JobAction::Sync);
    }
}
