use reqwest::Method;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::models::{ApplicationDraft, ApplicationRecord};

/// How a failed API call failed. Callers branch on the variant: only
/// `Transport` leaves it unknown whether the server saw the request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection-level failure: DNS, refused connection, TLS, timeout.
    #[error("network error: {0}")]
    Transport(String),
    /// The server answered with a non-2xx status.
    #[error("HTTP error! status: {0}")]
    Http(u16),
    /// A response arrived but could not be decoded.
    #[error("malformed response: {0}")]
    MalformedEnvelope(String),
    /// The server answered 2xx but reported failure in the payload.
    #[error("{0}")]
    Api(String),
}

/// Status and body of one HTTP exchange, before any decoding.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Wire seam for the API client. The real implementation wraps a blocking
/// reqwest client; tests substitute scripted responses.
pub trait Transport: Send + Sync {
    fn send(&self, method: Method, url: &str, body: Option<&Value>)
    -> Result<RawResponse, ApiError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, ApiError> {
        // The API is addressed anonymously: no cookies, no auth headers.
        let mut request = self
            .client
            .request(method, url)
            .header("Content-Type", "application/json");
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = request
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(RawResponse { status, body: text })
    }
}

/// Collapse the gateway envelope. Lambda-proxy style responses arrive as
/// `{"body": "<json text>"}` with the real payload serialized inside; direct
/// responses are already the payload and pass through untouched.
pub fn unwrap_envelope(value: Value) -> Result<Value, ApiError> {
    match value.get("body") {
        None | Some(Value::Null) => Ok(value),
        Some(Value::String(inner)) => serde_json::from_str(inner).map_err(|e| {
            ApiError::MalformedEnvelope(format!("envelope body is not valid JSON text: {e}"))
        }),
        Some(other) => Err(ApiError::MalformedEnvelope(format!(
            "envelope body should be a JSON string, got {}",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// What a create call yielded. Some deployments echo the stored record under
/// `application`, some under `item`, some return only an ack; in the last
/// case the caller refreshes the list to learn the assigned id.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(ApplicationRecord),
    Unknown,
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self::with_transport(&config.api_base_url, Arc::new(HttpTransport::new()))
    }

    pub fn with_transport(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    /// One API round trip: send, check status, decode JSON, collapse the
    /// envelope. Every operation funnels through here so failures classify
    /// uniformly. Non-2xx responses fail on status alone, their bodies are
    /// never decoded.
    fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        log::debug!("{method} {url}");
        let raw = self.transport.send(method, &url, body)?;
        if !(200..300).contains(&raw.status) {
            return Err(ApiError::Http(raw.status));
        }
        let value: Value = serde_json::from_str(&raw.body)
            .map_err(|e| ApiError::MalformedEnvelope(format!("response is not valid JSON: {e}")))?;
        unwrap_envelope(value)
    }

    /// Fetch every application. The server list is the source of truth; the
    /// result replaces any local cache wholesale.
    pub fn list(&self) -> Result<Vec<ApplicationRecord>, ApiError> {
        let payload = self.request(Method::GET, "/applications", None)?;
        let envelope: ListEnvelope = decode(payload)?;
        if !envelope.success {
            return Err(api_failure(envelope.error));
        }
        Ok(envelope.items.unwrap_or_default())
    }

    pub fn create(&self, draft: &ApplicationDraft) -> Result<CreateOutcome, ApiError> {
        let body = encode(draft)?;
        let payload = self.request(Method::POST, "/applications", Some(&body))?;
        let envelope: CreateEnvelope = decode(payload)?;
        if !envelope.success {
            return Err(api_failure(envelope.error));
        }
        Ok(match envelope.application.or(envelope.item) {
            Some(record) => CreateOutcome::Created(record),
            None => CreateOutcome::Unknown,
        })
    }

    pub fn update(&self, application_id: &str, draft: &ApplicationDraft) -> Result<(), ApiError> {
        let body = encode(draft)?;
        let endpoint = format!("/applications/{application_id}");
        let payload = self.request(Method::PUT, &endpoint, Some(&body))?;
        acknowledge(payload)
    }

    /// Delete by id. If the DELETE verb dies in transit (some gateway
    /// deployments never accept it), retry exactly once as a POST carrying a
    /// `_method` override. An HTTP status or payload failure means the
    /// server made a decision, so it is final and never retried; whatever
    /// the fallback attempt returns is final too.
    pub fn delete(&self, application_id: &str) -> Result<(), ApiError> {
        let endpoint = format!("/applications/{application_id}");
        match self.request(Method::DELETE, &endpoint, None) {
            Ok(payload) => acknowledge(payload),
            Err(ApiError::Transport(reason)) => {
                log::warn!("DELETE failed in transit ({reason}), retrying as POST override");
                let marker = json!({ "_method": "DELETE" });
                let payload = self.request(Method::POST, &endpoint, Some(&marker))?;
                acknowledge(payload)
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    items: Option<Vec<ApplicationRecord>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    application: Option<ApplicationRecord>,
    #[serde(default)]
    item: Option<ApplicationRecord>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AckEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

fn acknowledge(payload: Value) -> Result<(), ApiError> {
    let envelope: AckEnvelope = decode(payload)?;
    if !envelope.success {
        return Err(api_failure(envelope.error));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, ApiError> {
    serde_json::from_value(payload)
        .map_err(|e| ApiError::MalformedEnvelope(format!("unexpected response shape: {e}")))
}

fn encode<T: Serialize>(body: &T) -> Result<Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::MalformedEnvelope(format!("failed to encode request body: {e}")))
}

fn api_failure(error: Option<String>) -> ApiError {
    ApiError::Api(error.unwrap_or_else(|| "Unknown error".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<RawResponse, ApiError>>>,
        calls: Mutex<Vec<(Method, String, Option<Value>)>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<RawResponse, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(Method, String, Option<Value>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(
            &self,
            method: Method,
            url: &str,
            body: Option<&Value>,
        ) -> Result<RawResponse, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push((method, url.to_string(), body.cloned()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Transport("no scripted reply left".to_string())))
        }
    }

    fn ok(status: u16, body: &str) -> Result<RawResponse, ApiError> {
        Ok(RawResponse {
            status,
            body: body.to_string(),
        })
    }

    fn down(reason: &str) -> Result<RawResponse, ApiError> {
        Err(ApiError::Transport(reason.to_string()))
    }

    fn scripted_client(transport: &Arc<ScriptedTransport>) -> ApiClient {
        ApiClient::with_transport("https://api.test/prod", transport.clone())
    }

    #[test]
    fn test_unwrap_envelope_passes_plain_payloads_through() {
        let payload = json!({"success": true, "items": []});
        assert_eq!(unwrap_envelope(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn test_unwrap_envelope_parses_string_body() {
        let inner = json!({"success": true, "items": [{"applicationId": "a1"}]});
        let wrapped = json!({"statusCode": 200, "body": inner.to_string()});
        assert_eq!(unwrap_envelope(wrapped).unwrap(), inner);
    }

    #[test]
    fn test_unwrap_envelope_ignores_null_body() {
        let payload = json!({"success": true, "body": null});
        assert_eq!(unwrap_envelope(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn test_unwrap_envelope_rejects_non_string_body() {
        let err = unwrap_envelope(json!({"body": 42})).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope(_)), "{err}");
        let err = unwrap_envelope(json!({"body": {"success": true}})).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope(_)), "{err}");
    }

    #[test]
    fn test_unwrap_envelope_rejects_garbage_body_text() {
        let err = unwrap_envelope(json!({"body": "not json at all"})).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope(_)), "{err}");
    }

    #[test]
    fn test_non_2xx_fails_on_status_without_decoding_body() {
        let transport = ScriptedTransport::new(vec![ok(500, "<html>internal error</html>")]);
        let err = scripted_client(&transport).list().unwrap_err();
        assert!(matches!(err, ApiError::Http(500)), "{err}");
        assert_eq!(err.to_string(), "HTTP error! status: 500");
    }

    #[test]
    fn test_list_surfaces_payload_reported_failure() {
        let transport =
            ScriptedTransport::new(vec![ok(200, r#"{"success": false, "error": "boom"}"#)]);
        let err = scripted_client(&transport).list().unwrap_err();
        assert!(matches!(err, ApiError::Api(ref msg) if msg == "boom"), "{err}");
    }

    #[test]
    fn test_list_defaults_missing_error_text() {
        let transport = ScriptedTransport::new(vec![ok(200, r#"{"success": false}"#)]);
        let err = scripted_client(&transport).list().unwrap_err();
        assert_eq!(err.to_string(), "Unknown error");
    }

    #[test]
    fn test_list_tolerates_missing_items() {
        let transport = ScriptedTransport::new(vec![ok(200, r#"{"success": true}"#)]);
        assert_eq!(scripted_client(&transport).list().unwrap(), vec![]);
    }

    #[test]
    fn test_create_reads_echo_from_either_key() {
        let echoed = r#"{"success": true, "application": {"applicationId": "a9", "companyName": "Acme"}}"#;
        let transport = ScriptedTransport::new(vec![ok(200, echoed)]);
        let outcome = scripted_client(&transport)
            .create(&ApplicationDraft::new())
            .unwrap();
        match outcome {
            CreateOutcome::Created(record) => assert_eq!(record.application_id, "a9"),
            CreateOutcome::Unknown => panic!("expected an echoed record"),
        }

        let echoed = r#"{"success": true, "item": {"applicationId": "b4"}}"#;
        let transport = ScriptedTransport::new(vec![ok(200, echoed)]);
        let outcome = scripted_client(&transport)
            .create(&ApplicationDraft::new())
            .unwrap();
        assert!(matches!(
            outcome,
            CreateOutcome::Created(ref record) if record.application_id == "b4"
        ));
    }

    #[test]
    fn test_create_without_echo_is_unknown() {
        let transport = ScriptedTransport::new(vec![ok(200, r#"{"success": true}"#)]);
        let outcome = scripted_client(&transport)
            .create(&ApplicationDraft::new())
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Unknown);
    }

    #[test]
    fn test_delete_uses_delete_verb_when_it_works() {
        let transport = ScriptedTransport::new(vec![ok(200, r#"{"success": true}"#)]);
        scripted_client(&transport).delete("a1").unwrap();
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Method::DELETE);
        assert_eq!(calls[0].1, "https://api.test/prod/applications/a1");
        assert_eq!(calls[0].2, None);
    }

    #[test]
    fn test_delete_retries_exactly_once_as_post_override() {
        let transport = ScriptedTransport::new(vec![
            down("connection refused"),
            ok(200, r#"{"success": true}"#),
        ]);
        scripted_client(&transport).delete("a1").unwrap();
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, Method::DELETE);
        assert_eq!(calls[1].0, Method::POST);
        assert_eq!(calls[1].1, "https://api.test/prod/applications/a1");
        assert_eq!(calls[1].2, Some(json!({"_method": "DELETE"})));
    }

    #[test]
    fn test_delete_fallback_failure_is_final() {
        let transport = ScriptedTransport::new(vec![down("first"), down("second")]);
        let err = scripted_client(&transport).delete("a1").unwrap_err();
        assert!(matches!(err, ApiError::Transport(ref msg) if msg == "second"), "{err}");
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_delete_never_retries_http_failures() {
        let transport = ScriptedTransport::new(vec![ok(405, "")]);
        let err = scripted_client(&transport).delete("a1").unwrap_err();
        assert!(matches!(err, ApiError::Http(405)), "{err}");
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_delete_never_retries_payload_failures() {
        let transport =
            ScriptedTransport::new(vec![ok(200, r#"{"success": false, "error": "not found"}"#)]);
        let err = scripted_client(&transport).delete("a1").unwrap_err();
        assert!(matches!(err, ApiError::Api(ref msg) if msg == "not found"), "{err}");
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_base_url_trailing_slash_is_normalized() {
        let transport = ScriptedTransport::new(vec![ok(200, r#"{"success": true}"#)]);
        let client = ApiClient::with_transport("https://api.test/prod/", transport.clone());
        client.list().unwrap();
        assert_eq!(transport.calls()[0].1, "https://api.test/prod/applications");
    }

    // --- HTTP round trips ---

    fn start_server() -> (tokio::runtime::Runtime, MockServer) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        (rt, server)
    }

    fn http_client(server: &MockServer) -> ApiClient {
        ApiClient::with_transport(&server.uri(), Arc::new(HttpTransport::new()))
    }

    #[test]
    fn test_list_round_trip_over_http() {
        let (rt, server) = start_server();
        rt.block_on(
            Mock::given(method("GET"))
                .and(path("/applications"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "success": true,
                    "items": [{
                        "applicationId": "a1",
                        "companyName": "Acme",
                        "jobTitle": "Engineer",
                        "status": "Interview",
                        "dateApplied": "2025-06-01",
                    }],
                })))
                .mount(&server),
        );

        let records = http_client(&server).list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].application_id, "a1");
        assert_eq!(records[0].status, Status::Interview);
    }

    #[test]
    fn test_gateway_envelope_unwraps_over_http() {
        let (rt, server) = start_server();
        let inner = json!({"success": true, "items": []}).to_string();
        rt.block_on(
            Mock::given(method("GET"))
                .and(path("/applications"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"statusCode": 200, "body": inner})),
                )
                .mount(&server),
        );

        assert_eq!(http_client(&server).list().unwrap(), vec![]);
    }

    #[test]
    fn test_create_sends_every_submitted_field_over_http() {
        let (rt, server) = start_server();
        let draft = ApplicationDraft {
            company_name: "Acme".to_string(),
            job_title: "Engineer".to_string(),
            job_post_url: Some("https://acme.example/jobs/1".to_string()),
            status: Status::Applied,
            date_applied: "2025-06-01".to_string(),
            follow_up_date: Some("2025-06-15".to_string()),
            notes: Some("referred by Sam".to_string()),
        };
        rt.block_on(
            Mock::given(method("POST"))
                .and(path("/applications"))
                .and(body_json(json!({
                    "companyName": "Acme",
                    "jobTitle": "Engineer",
                    "jobPostUrl": "https://acme.example/jobs/1",
                    "status": "Applied",
                    "dateApplied": "2025-06-01",
                    "followUpDate": "2025-06-15",
                    "notes": "referred by Sam",
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "success": true,
                    "application": {
                        "applicationId": "a1",
                        "companyName": "Acme",
                        "jobTitle": "Engineer",
                        "jobPostUrl": "https://acme.example/jobs/1",
                        "status": "Applied",
                        "dateApplied": "2025-06-01",
                        "followUpDate": "2025-06-15",
                        "notes": "referred by Sam",
                    },
                })))
                .expect(1)
                .mount(&server),
        );

        let outcome = http_client(&server).create(&draft).unwrap();
        let CreateOutcome::Created(record) = outcome else {
            panic!("expected an echoed record");
        };
        assert_eq!(record.application_id, "a1");
        assert_eq!(record.draft(), draft);
    }

    #[test]
    fn test_update_sends_camel_case_json_over_http() {
        let (rt, server) = start_server();
        let draft = ApplicationDraft {
            company_name: "Acme Corp".to_string(),
            job_title: "Engineer".to_string(),
            job_post_url: None,
            status: Status::Interview,
            date_applied: "2025-06-01".to_string(),
            follow_up_date: None,
            notes: None,
        };
        rt.block_on(
            Mock::given(method("PUT"))
                .and(path("/applications/a1"))
                .and(body_json(json!({
                    "companyName": "Acme Corp",
                    "jobTitle": "Engineer",
                    "status": "Interview",
                    "dateApplied": "2025-06-01",
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
                .expect(1)
                .mount(&server),
        );

        http_client(&server).update("a1", &draft).unwrap();
    }

    #[test]
    fn test_http_failure_maps_to_status_over_http() {
        let (rt, server) = start_server();
        rt.block_on(
            Mock::given(method("GET"))
                .and(path("/applications"))
                .respond_with(ResponseTemplate::new(502))
                .mount(&server),
        );

        let err = http_client(&server).list().unwrap_err();
        assert!(matches!(err, ApiError::Http(502)), "{err}");
    }

    #[test]
    fn test_unreachable_host_classifies_as_transport() {
        let client =
            ApiClient::with_transport("http://127.0.0.1:1", Arc::new(HttpTransport::new()));
        let err = client.list().unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)), "{err}");
    }
}
