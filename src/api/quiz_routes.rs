use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use super::quiz_websocket;
use crate::error::QuizError;
use crate::quiz::{Audience, QuizServer};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    quiz_id: String,
    teacher_id: String,
}

/// Every HTTP and WebSocket route under `/quiz`
pub fn routes(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    quiz_websocket_route(server.clone())
        .or(quiz_health_check(server.clone()))
        .or(create_session_route(server.clone()))
        .or(session_snapshot_route(server))
}

pub fn quiz_websocket_route(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("quiz")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_quiz_server(server))
        .map(|ws: warp::ws::Ws, server: Arc<QuizServer>| {
            ws.on_upgrade(move |websocket| quiz_websocket::handle_quiz_websocket(websocket, server))
        })
}

pub fn quiz_health_check(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("quiz" / "health")
        .and(warp::get())
        .and(with_quiz_server(server))
        .and_then(|server: Arc<QuizServer>| async move {
            let active = server.active_sessions().await;
            Ok::<_, Infallible>(warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "QuizWave Session Server",
                "version": env!("CARGO_PKG_VERSION"),
                "activeSessions": active
            })))
        })
}

pub fn create_session_route(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("quiz" / "sessions")
        .and(warp::post())
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::json())
        .and(with_quiz_server(server))
        .and_then(create_session)
}

pub fn session_snapshot_route(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("quiz" / "sessions" / String)
        .and(warp::get())
        .and(with_quiz_server(server))
        .and_then(session_snapshot)
}

async fn create_session(
    request: CreateSessionRequest,
    server: Arc<QuizServer>,
) -> Result<Response, Infallible> {
    match server
        .create_session(&request.quiz_id, &request.teacher_id)
        .await
    {
        Ok(created) => Ok(
            warp::reply::with_status(warp::reply::json(&created), StatusCode::CREATED)
                .into_response(),
        ),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn session_snapshot(session_id: String, server: Arc<QuizServer>) -> Result<Response, Infallible> {
    match server.snapshot(&session_id, Audience::Teacher).await {
        Ok(snapshot) => Ok(warp::reply::json(&snapshot).into_response()),
        Err(e) => Ok(error_reply(&e)),
    }
}

pub fn status_for(err: &QuizError) -> StatusCode {
    match err {
        QuizError::Validation(_) => StatusCode::BAD_REQUEST,
        QuizError::NotFound(_) => StatusCode::NOT_FOUND,
        QuizError::InvalidState(_) => StatusCode::CONFLICT,
        QuizError::PinExhaustion { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(err: &QuizError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(error = %err, code = err.code(), "Request failed");
    }
    let body = warp::reply::json(&serde_json::json!({
        "error": err.to_string(),
        "code": err.code(),
        "retryable": err.is_retryable()
    }));
    warp::reply::with_status(body, status).into_response()
}

fn with_quiz_server(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = (Arc<QuizServer>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || server.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::quiz::model::fixtures::{quiz, true_false};
    use crate::store::{InMemoryQuizSource, MemorySink, SummaryQueue};

    async fn server() -> Arc<QuizServer> {
        let source = Arc::new(InMemoryQuizSource::new());
        source.insert(quiz(vec![true_false("q", true)])).await;
        let queue = SummaryQueue::new(Arc::new(MemorySink::new()), 0);
        Arc::new(QuizServer::new(source, queue, EngineConfig::default()))
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&QuizError::validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&QuizError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&QuizError::invalid_state("x")), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&QuizError::PinExhaustion { attempts: 3 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&QuizError::internal("x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_health_reports_active_sessions() {
        let server = server().await;
        server.create_session("quiz-1", "t").await.unwrap();

        let resp = warp::test::request()
            .method("GET")
            .path("/quiz/health")
            .reply(&routes(server))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["activeSessions"], 1);
    }

    #[tokio::test]
    async fn test_create_then_fetch_session() {
        let server = server().await;
        let filter = routes(server);

        let resp = warp::test::request()
            .method("POST")
            .path("/quiz/sessions")
            .json(&serde_json::json!({"quizId": "quiz-1", "teacherId": "t"}))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        let session_id = created["sessionId"].as_str().unwrap().to_string();
        assert_eq!(created["gamePin"].as_str().unwrap().len(), 6);

        let resp = warp::test::request()
            .method("GET")
            .path(&format!("/quiz/sessions/{session_id}"))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let snapshot: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(snapshot["status"], "waiting");
        assert_eq!(snapshot["currentQuestionIndex"], -1);
    }

    #[tokio::test]
    async fn test_unknown_quiz_is_404() {
        let resp = warp::test::request()
            .method("POST")
            .path("/quiz/sessions")
            .json(&serde_json::json!({"quizId": "missing", "teacherId": "t"}))
            .reply(&routes(server().await))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "not_found");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn test_ended_session_is_409() {
        let server = server().await;
        let created = server.create_session("quiz-1", "t").await.unwrap();
        server.end(&created.session_id).await.unwrap();

        let resp = warp::test::request()
            .method("GET")
            .path(&format!("/quiz/sessions/{}", created.session_id))
            .reply(&routes(server))
            .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
