//! Clinic backend client: bearer-authenticated JSON over HTTP.
//!
//! Every response body is decoded into the typed records of
//! `psyportal_core::types`; a body that does not fit is a `Payload` error,
//! never a partially-filled value.

use std::time::Duration;

use async_trait::async_trait;
use psyportal_core::config::ApiConfig;
use psyportal_core::error::{PortalError, Result};
use psyportal_core::session::Session;
use psyportal_core::traits::Backend;
use psyportal_core::types::{
    Answer, Assignment, AuthResponse, ChatMessage, Patient, PatientProfile, PatientStatus,
    PendingAssignment,
};
use serde::de::DeserializeOwned;

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PortalError::Http(format!("Client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PortalError::Http(format!("{what}: failed to read body: {e}")))?;
        if !status.is_success() {
            return Err(PortalError::Api {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("⚠️ Rejected malformed {what} payload: {e}");
            PortalError::Payload(format!("{what}: {e}"))
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, session: &Session, what: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(session.token())
            .send()
            .await
            .map_err(|e| PortalError::Http(format!("{what} failed: {e}")))?;
        Self::decode(response, what).await
    }

    async fn post(
        &self,
        path: &str,
        session: &Session,
        body: Option<serde_json::Value>,
        what: &str,
    ) -> Result<reqwest::Response> {
        let mut req = self.client.post(self.url(path)).bearer_auth(session.token());
        if let Some(body) = body {
            req = req.json(&body);
        }
        req.send()
            .await
            .map_err(|e| PortalError::Http(format!("{what} failed: {e}")))
    }

    async fn post_expect_ok(
        &self,
        path: &str,
        session: &Session,
        body: Option<serde_json::Value>,
        what: &str,
    ) -> Result<()> {
        let response = self.post(path, session, body, what).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PortalError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Exchange an access code for a patient session.
    pub async fn validate_access_code(&self, code: &str) -> Result<Patient> {
        let code = code.trim();
        if code.is_empty()
            || !code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PortalError::Auth(format!("Invalid access code format: '{code}'")));
        }

        let response = self
            .client
            .get(self.url(&format!("/auth/{code}")))
            .send()
            .await
            .map_err(|e| PortalError::Http(format!("auth failed: {e}")))?;

        match Self::decode::<AuthResponse>(response, "auth").await {
            Ok(auth) => {
                tracing::info!("🔑 Access code accepted for patient {}", auth.patient_code);
                Ok(Patient::from(auth))
            }
            Err(PortalError::Api { status, .. }) if (400..500).contains(&status) => {
                Err(PortalError::Auth("Access code rejected".into()))
            }
            Err(e) => Err(e),
        }
    }

    /// Full assignment schedule for the dashboard.
    pub async fn assignments(&self, session: &Session) -> Result<Vec<Assignment>> {
        let path = format!("/assignments/patient/{}", session.patient().access_code);
        self.get(&path, session, "assignments").await
    }

    /// Submit a completed questionnaire. The body is the bare answer list.
    pub async fn submit_assignment(
        &self,
        session: &Session,
        assignment_id: i64,
        answers: &[Answer],
    ) -> Result<()> {
        let body = serde_json::to_value(answers)?;
        self.post_expect_ok(
            &format!("/assignments/{assignment_id}/submit"),
            session,
            Some(body),
            "submit",
        )
        .await?;
        tracing::info!("📝 Submitted answers for assignment {assignment_id}");
        Ok(())
    }

    pub async fn send_message(&self, session: &Session, content: &str) -> Result<ChatMessage> {
        let body = serde_json::json!({
            "patient_id": session.patient_id(),
            "content": content,
            "is_from_patient": true,
        });
        let response = self.post("/messages", session, Some(body), "send message").await?;
        Self::decode(response, "send message").await
    }

    pub async fn status(&self, session: &Session) -> Result<PatientStatus> {
        self.get("/patient/status", session, "status").await
    }

    pub async fn profile(&self, session: &Session) -> Result<PatientProfile> {
        self.get("/patient/me", session, "profile").await
    }

    /// Ask the backend to push a test notification to the registered token.
    pub async fn test_push(&self, session: &Session) -> Result<()> {
        self.post_expect_ok("/notifications/test", session, None, "test push")
            .await
    }

    pub async fn logout(&self, session: &Session) -> Result<()> {
        self.post_expect_ok("/logout", session, None, "logout").await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn pending_assignments(&self, session: &Session) -> Result<Vec<PendingAssignment>> {
        self.get("/assignments/pending", session, "pending assignments")
            .await
    }

    async fn messages(&self, session: &Session) -> Result<Vec<ChatMessage>> {
        let path = format!("/messages/{}", session.patient_id());
        self.get(&path, session, "messages").await
    }

    async fn register_push_token(&self, session: &Session, token: &str) -> Result<bool> {
        let body = serde_json::json!({ "token": token });
        let response = self
            .post("/patient/fcm-token", session, Some(body), "register push token")
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status.is_client_error() {
            tracing::warn!("⚠️ Backend refused push token ({status})");
            Ok(false)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PortalError::Registration(format!("{status}: {body}")))
        }
    }

    async fn heartbeat(&self, session: &Session) -> Result<()> {
        self.post_expect_ok("/heartbeat", session, None, "heartbeat")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};

    async fn serve(app: Router) -> HttpBackend {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        HttpBackend::new(&ApiConfig {
            base_url: format!("http://{addr}/"),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn session() -> Session {
        Session::new(Patient {
            id: 7,
            patient_code: "P-7".into(),
            access_code: "ABC123".into(),
            psychologist_name: "Dr. Ruiz".into(),
            psychologist_schedule: "9-18".into(),
            token: "tok-7".into(),
        })
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_pending_assignments_sends_bearer() {
        let app = Router::new().route(
            "/assignments/pending",
            get(|headers: HeaderMap| async move {
                if bearer(&headers) != "Bearer tok-7" {
                    return (StatusCode::UNAUTHORIZED, Json(serde_json::json!([])));
                }
                (
                    StatusCode::OK,
                    Json(serde_json::json!([
                        {"id": 101, "assignment_id": 1, "status": "sent",
                         "questionnaire": {"id": 9, "title": "Mood check"}}
                    ])),
                )
            }),
        );
        let backend = serve(app).await;
        let pending = backend.pending_assignments(&session()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 101);
        assert_eq!(pending[0].title(), "Mood check");
    }

    #[tokio::test]
    async fn test_messages_path_uses_patient_id() {
        let app = Router::new().route(
            "/messages/{id}",
            get(|Path(id): Path<i64>| async move {
                Json(serde_json::json!([
                    {"id": 1, "patient_id": id, "content": "hi", "is_from_patient": false}
                ]))
            }),
        );
        let backend = serve(app).await;
        let messages = backend.messages(&session()).await.unwrap();
        assert_eq!(messages[0].patient_id, 7);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let app = Router::new().route(
            "/messages/{id}",
            get(|| async { Json(serde_json::json!([{"id": "not-a-number"}])) }),
        );
        let backend = serve(app).await;
        let err = backend.messages(&session()).await.unwrap_err();
        assert!(matches!(err, PortalError::Payload(_)));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let app = Router::new().route(
            "/assignments/pending",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let backend = serve(app).await;
        let err = backend.pending_assignments(&session()).await.unwrap_err();
        assert!(matches!(err, PortalError::Api { status: 500, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_register_push_token_outcomes() {
        let app = Router::new().route(
            "/patient/fcm-token",
            post(|Json(body): Json<serde_json::Value>| async move {
                match body["token"].as_str() {
                    Some("good") => StatusCode::OK,
                    Some("bad") => StatusCode::UNPROCESSABLE_ENTITY,
                    _ => StatusCode::BAD_GATEWAY,
                }
            }),
        );
        let backend = serve(app).await;
        let s = session();
        assert!(backend.register_push_token(&s, "good").await.unwrap());
        assert!(!backend.register_push_token(&s, "bad").await.unwrap());
        let err = backend.register_push_token(&s, "other").await.unwrap_err();
        assert!(matches!(err, PortalError::Registration(_)));
    }

    #[tokio::test]
    async fn test_validate_access_code() {
        let app = Router::new().route(
            "/auth/{code}",
            get(|Path(code): Path<String>| async move {
                if code == "ABC123" {
                    (
                        StatusCode::OK,
                        Json(serde_json::json!({
                            "id": 7, "patient_code": "P-7", "access_code": code,
                            "psychologist_name": "Dr. Ruiz", "access_token": "tok-7"
                        })),
                    )
                } else {
                    (StatusCode::NOT_FOUND, Json(serde_json::json!({"detail": "no"})))
                }
            }),
        );
        let backend = serve(app).await;
        let patient = backend.validate_access_code("ABC123").await.unwrap();
        assert_eq!(patient.token, "tok-7");
        assert_eq!(patient.psychologist_schedule, "Available 9:00 - 18:00");

        let err = backend.validate_access_code("WRONG").await.unwrap_err();
        assert!(matches!(err, PortalError::Auth(_)));

        let err = backend.validate_access_code("../admin").await.unwrap_err();
        assert!(matches!(err, PortalError::Auth(_)));
    }

    #[tokio::test]
    async fn test_submit_assignment_posts_answer_list() {
        let received = std::sync::Arc::new(std::sync::Mutex::new(None::<(i64, serde_json::Value)>));
        let sink = received.clone();
        let app = Router::new().route(
            "/assignments/{id}/submit",
            post(
                move |Path(id): Path<i64>, headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                    let sink = sink.clone();
                    async move {
                        if bearer(&headers) != "Bearer tok-7" {
                            return StatusCode::UNAUTHORIZED;
                        }
                        *sink.lock().unwrap() = Some((id, body));
                        StatusCode::OK
                    }
                },
            ),
        );
        let backend = serve(app).await;
        let answers = vec![
            Answer {
                question_index: 0,
                question_text: "Mood today".into(),
                answer: serde_json::json!(4),
            },
            Answer {
                question_index: 1,
                question_text: "Sleep".into(),
                answer: serde_json::json!("Often"),
            },
        ];
        backend.submit_assignment(&session(), 42, &answers).await.unwrap();

        let (id, body) = received.lock().unwrap().take().unwrap();
        assert_eq!(id, 42);
        assert_eq!(
            body,
            serde_json::json!([
                {"question_index": 0, "question_text": "Mood today", "answer": 4},
                {"question_index": 1, "question_text": "Sleep", "answer": "Often"}
            ])
        );
    }

    #[tokio::test]
    async fn test_submit_assignment_rejection_is_an_error() {
        let app = Router::new().route(
            "/assignments/{id}/submit",
            post(|| async { (StatusCode::BAD_REQUEST, "already completed") }),
        );
        let backend = serve(app).await;
        let err = backend.submit_assignment(&session(), 42, &[]).await.unwrap_err();
        assert!(matches!(err, PortalError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_send_message_posts_patient_payload() {
        let app = Router::new().route(
            "/messages",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(serde_json::json!({
                    "id": 55,
                    "patient_id": body["patient_id"],
                    "content": body["content"],
                    "is_from_patient": body["is_from_patient"],
                }))
            }),
        );
        let backend = serve(app).await;
        let sent = backend.send_message(&session(), "hola").await.unwrap();
        assert_eq!(sent.id, 55);
        assert_eq!(sent.content, "hola");
        assert!(sent.is_from_patient);
    }
}
