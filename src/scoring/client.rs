//! Core `ScoringClient` trait and the REST implementation.
//!
//! `ApiScoringClient` posts a take to `{base_url}/sessions/{sessionId}/attempts`
//! as `multipart/form-data` with three parts:
//!
//! | Part         | Kind | Content                                  |
//! |--------------|------|------------------------------------------|
//! | `sessionId`  | text | session identifier                       |
//! | `scenarioId` | text | scenario identifier                      |
//! | `audio`      | file | `recording.wav`, `audio/wav`             |
//!
//! Connection details come from [`ApiConfig`]; the bearer token is read from
//! the shared [`AuthSession`] on every request.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use thiserror::Error;

use crate::audio::{WavAudio, WAV_MIME};
use crate::auth::AuthSession;
use crate::config::ApiConfig;
use crate::scoring::response::AttemptResult;

/// File name attached to the `audio` part.
pub const UPLOAD_FILE_NAME: &str = "recording.wav";

/// Shown when the server gives no usable message.
pub const FALLBACK_MESSAGE: &str = "Failed to submit your attempt. Please try again.";

// ---------------------------------------------------------------------------
// UploadError
// ---------------------------------------------------------------------------

/// Every way a submission can fail, each carrying a message fit for the user.
///
/// No variant is retried automatically; the take stays intact so the caller
/// can offer "try again".
#[derive(Debug, Error)]
pub enum UploadError {
    /// The configured base URL cannot address the endpoint.
    #[error("invalid scoring service URL: {0}")]
    InvalidUrl(String),

    /// Connection, DNS or TLS failure.
    #[error("could not reach the scoring service: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout.
    #[error("the scoring service did not respond in time")]
    Timeout,

    /// Non-2xx status.  `message` is the server's own text when it sent one.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// 2xx status but the body is not a score reply.
    #[error("unexpected response from the scoring service: {0}")]
    MalformedResponse(String),
}

impl UploadError {
    /// HTTP status for server-side failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UploadError::Timeout
        } else {
            UploadError::Network(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ScoringClient trait
// ---------------------------------------------------------------------------

/// Async interface for submitting takes.
///
/// Implementors must be `Send + Sync` so they can be held behind
/// `Arc<dyn ScoringClient>`.
#[async_trait]
pub trait ScoringClient: Send + Sync {
    async fn submit_attempt(
        &self,
        session_id: &str,
        scenario_id: &str,
        wav: &WavAudio,
    ) -> Result<AttemptResult, UploadError>;
}

// ---------------------------------------------------------------------------
// ApiScoringClient
// ---------------------------------------------------------------------------

pub struct ApiScoringClient {
    client: reqwest::Client,
    base_url: String,
    auth: AuthSession,
}

impl ApiScoringClient {
    /// Build a client whose token comes from `config.token`.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self::with_auth(config, AuthSession::new(config.token.clone()))
    }

    /// Build a client that reads its token from a shared session.
    ///
    /// The HTTP client is pre-configured with `config.timeout_secs`; a
    /// default client is used if the builder fails.
    pub fn with_auth(config: &ApiConfig, auth: AuthSession) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.clone(),
            auth,
        }
    }

    /// `{base_url}/sessions/{session_id}/attempts`, with the id
    /// percent-encoded as a single path segment.
    pub fn attempts_url(&self, session_id: &str) -> Result<Url, UploadError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| UploadError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| UploadError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["sessions", session_id, "attempts"]);
        Ok(url)
    }
}

#[async_trait]
impl ScoringClient for ApiScoringClient {
    async fn submit_attempt(
        &self,
        session_id: &str,
        scenario_id: &str,
        wav: &WavAudio,
    ) -> Result<AttemptResult, UploadError> {
        let url = self.attempts_url(session_id)?;

        let audio = Part::bytes(wav.as_bytes().to_vec())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(WAV_MIME)?;
        let form = Form::new()
            .text("sessionId", session_id.to_string())
            .text("scenarioId", scenario_id.to_string())
            .part("audio", audio);

        let mut req = self.client.post(url.clone()).multipart(form);
        if let Some(token) = self.auth.token() {
            req = req.bearer_auth(token);
        }

        log::info!(
            "submitting attempt: session={session_id} scenario={scenario_id} ({} bytes)",
            wav.len()
        );
        let response = req.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        let result = interpret_response(status, &body);
        match &result {
            Ok(r) => log::info!("attempt scored: total={}", r.scores.total),
            Err(e) => log::warn!("attempt submission to {url} failed ({status}): {e}"),
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Response interpretation
// ---------------------------------------------------------------------------

/// Turn a raw status + body into a result or a normalized error.
pub fn interpret_response(status: u16, body: &[u8]) -> Result<AttemptResult, UploadError> {
    if (200..300).contains(&status) {
        return serde_json::from_slice::<AttemptResult>(body)
            .map_err(|e| UploadError::MalformedResponse(e.to_string()));
    }

    let message = server_message(body).unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
    Err(UploadError::Server { status, message })
}

/// Extract `message` (string or list of strings) or `error` from a JSON
/// error body.
fn server_message(body: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    let text = match &json["message"] {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        _ => json["error"].as_str().unwrap_or_default().to_string(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode_wav;

    use axum::body::Bytes;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::sync::mpsc;

    const SCORE_JSON: &str = r#"{"scores":{"pronunciation":80,"accuracy":85,"fluency":70,"completeness":95,"total":82}}"#;

    fn config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.into(),
            token: Some("test-token".into()),
            timeout_secs: 5,
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    // ---- interpret_response --------------------------------------------------

    #[test]
    fn success_body_parses() {
        let r = interpret_response(201, SCORE_JSON.as_bytes()).unwrap();
        assert_eq!(r.scores.total, 82.0);
    }

    #[test]
    fn error_message_is_passed_through_verbatim() {
        let err = interpret_response(400, br#"{"message":"Audio is too short"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Audio is too short");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn error_message_list_is_joined() {
        let err =
            interpret_response(422, br#"{"message":["sessionId missing","audio missing"]}"#)
                .unwrap_err();
        assert_eq!(err.to_string(), "sessionId missing, audio missing");
    }

    #[test]
    fn error_field_is_used_when_message_absent() {
        let err = interpret_response(401, br#"{"error":"Unauthorized"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized");
    }

    #[test]
    fn empty_or_non_json_error_body_uses_fallback() {
        for body in [&b""[..], b"<html>Bad Gateway</html>", br#"{"message":"  "}"#] {
            let err = interpret_response(502, body).unwrap_err();
            assert_eq!(err.to_string(), FALLBACK_MESSAGE);
        }
    }

    #[test]
    fn missing_scores_is_malformed() {
        let err = interpret_response(200, br#"{"transcription":"hi"}"#).unwrap_err();
        assert!(matches!(err, UploadError::MalformedResponse(_)), "{err}");
    }

    // ---- URL building ------------------------------------------------------

    #[test]
    fn attempts_url_appends_segments() {
        let client = ApiScoringClient::from_config(&config("https://host.test/api/"));
        let url = client.attempts_url("abc-123").unwrap();
        assert_eq!(url.as_str(), "https://host.test/api/sessions/abc-123/attempts");
    }

    #[test]
    fn attempts_url_encodes_session_id() {
        let client = ApiScoringClient::from_config(&config("https://host.test"));
        let url = client.attempts_url("a/b c").unwrap();
        assert_eq!(url.as_str(), "https://host.test/sessions/a%2Fb%20c/attempts");
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let client = ApiScoringClient::from_config(&config("not a url"));
        assert!(matches!(
            client.attempts_url("x"),
            Err(UploadError::InvalidUrl(_))
        ));
    }

    #[test]
    fn client_is_object_safe() {
        let client: Box<dyn ScoringClient> =
            Box::new(ApiScoringClient::from_config(&ApiConfig::default()));
        drop(client);
    }

    // ---- against a local server ---------------------------------------------

    #[tokio::test]
    async fn posts_multipart_with_bearer_token() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/api/sessions/:id/attempts",
            post(move |Path(id): Path<String>, headers: HeaderMap, body: Bytes| {
                let tx = tx.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let content_type = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let _ = tx.send((id, auth, content_type, body));
                    (
                        StatusCode::CREATED,
                        Json(serde_json::from_str::<serde_json::Value>(SCORE_JSON).unwrap()),
                    )
                }
            }),
        );
        let base = serve(app).await;

        let client = ApiScoringClient::from_config(&config(&base));
        let wav = encode_wav(&[0.0; 160]);
        let result = client.submit_attempt("sess-1", "scn-9", &wav).await.unwrap();
        assert_eq!(result.scores.fluency, 70.0);

        let (id, auth, content_type, body) = rx.recv().await.unwrap();
        assert_eq!(id, "sess-1");
        assert_eq!(auth.as_deref(), Some("Bearer test-token"));
        assert!(content_type.unwrap().starts_with("multipart/form-data"));

        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("name=\"sessionId\"\r\n\r\nsess-1"), "{text}");
        assert!(text.contains("name=\"scenarioId\"\r\n\r\nscn-9"), "{text}");
        assert!(text.contains("name=\"audio\"; filename=\"recording.wav\""), "{text}");
        assert!(text.contains("Content-Type: audio/wav"), "{text}");
        assert!(text.contains("RIFF"), "{text}");
    }

    #[tokio::test]
    async fn no_token_means_no_authorization_header() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/api/sessions/:id/attempts",
            post(move |headers: HeaderMap| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(headers.contains_key("authorization"));
                    (
                        StatusCode::OK,
                        Json(serde_json::from_str::<serde_json::Value>(SCORE_JSON).unwrap()),
                    )
                }
            }),
        );
        let base = serve(app).await;

        let mut cfg = config(&base);
        cfg.token = None;
        let client = ApiScoringClient::from_config(&cfg);
        client
            .submit_attempt("s", "c", &encode_wav(&[]))
            .await
            .unwrap();
        assert!(!rx.recv().await.unwrap());
    }

    #[tokio::test]
    async fn bad_request_surfaces_server_message() {
        let app = Router::new().route(
            "/api/sessions/:id/attempts",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "message": "Recording is silent" })),
                )
            }),
        );
        let base = serve(app).await;

        let client = ApiScoringClient::from_config(&config(&base));
        let err = client
            .submit_attempt("s", "c", &encode_wav(&[0.1; 16]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Recording is silent");
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn server_error_without_body_uses_fallback() {
        let app = Router::new().route(
            "/api/sessions/:id/attempts",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = serve(app).await;

        let client = ApiScoringClient::from_config(&config(&base));
        let err = client
            .submit_attempt("s", "c", &encode_wav(&[0.1; 16]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), FALLBACK_MESSAGE);
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiScoringClient::from_config(&config(&format!("http://{addr}")));
        let err = client
            .submit_attempt("s", "c", &encode_wav(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Network(_)), "{err}");
    }

    #[tokio::test]
    async fn token_follows_auth_session() {
        use crate::auth::AuthEvent;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/api/sessions/:id/attempts",
            post(move |headers: HeaderMap| {
                let tx = tx.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let _ = tx.send(auth);
                    (
                        StatusCode::OK,
                        Json(serde_json::from_str::<serde_json::Value>(SCORE_JSON).unwrap()),
                    )
                }
            }),
        );
        let base = serve(app).await;

        let auth = AuthSession::default();
        let client = ApiScoringClient::with_auth(&config(&base), auth.clone());
        auth.apply(&AuthEvent::LoggedIn {
            token: "fresh".into(),
        });

        client
            .submit_attempt("s", "c", &encode_wav(&[]))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().as_deref(), Some("Bearer fresh"));
    }
}
