use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::analysis::{AnalysisService, NO_AUDIO_TRANSCRIPT};
use crate::config::megabytes;
use crate::error::AnalysisError;
use crate::payload::{AnalysisPayload, AudioPayload, TranscriptResponse};

/// 各路由共享的状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnalysisService>,
    /// 请求体上限（MB），用于错误提示
    pub body_limit_mb: usize,
}

/// 构建 HTTP 路由
pub fn router(state: AppState) -> Router {
    let body_limit = megabytes(state.body_limit_mb);

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/visuals", post(handle_visuals))
        .route("/api/audio", post(handle_audio))
        .route("/api/transcribe", post(handle_transcribe))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// 把请求体解析失败映射为统一错误；超出上限时返回 413
fn reject(state: &AppState, rejection: JsonRejection) -> AnalysisError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("请求体超过上限 {}MB", state.body_limit_mb);
        AnalysisError::PayloadTooLarge {
            limit_mb: state.body_limit_mb,
        }
    } else {
        AnalysisError::InvalidRequest(rejection.body_text())
    }
}

/// 健康检查 Handler
pub async fn health_check() -> &'static str {
    "OK"
}

/// 综合分析：画面 + 转写
pub async fn handle_analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisPayload>, JsonRejection>,
) -> Result<ResponseJson<Value>, AnalysisError> {
    let Json(payload) = payload.map_err(|r| reject(&state, r))?;
    info!("收到综合分析请求");
    let result = state.service.analyze_combined(&payload).await?;
    Ok(ResponseJson(result))
}

/// 视觉分支
pub async fn handle_visuals(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisPayload>, JsonRejection>,
) -> Result<ResponseJson<Value>, AnalysisError> {
    let Json(payload) = payload.map_err(|r| reject(&state, r))?;
    info!("收到视觉分析请求");
    let result = state.service.analyze_visuals(&payload).await?;
    Ok(ResponseJson(result))
}

/// 音频分支
pub async fn handle_audio(
    State(state): State<AppState>,
    payload: Result<Json<AudioPayload>, JsonRejection>,
) -> Result<ResponseJson<Value>, AnalysisError> {
    let Json(payload) = payload.map_err(|r| reject(&state, r))?;
    info!("收到音频分析请求");
    let result = state.service.analyze_audio(payload.audio.as_deref()).await?;
    Ok(ResponseJson(result))
}

/// 只做转写；没有音频时返回固定文本
pub async fn handle_transcribe(
    State(state): State<AppState>,
    payload: Result<Json<AudioPayload>, JsonRejection>,
) -> Result<ResponseJson<TranscriptResponse>, AnalysisError> {
    let Json(payload) = payload.map_err(|r| reject(&state, r))?;
    let text = match payload.audio.as_deref().filter(|a| !a.trim().is_empty()) {
        Some(audio) => {
            info!("收到转写请求");
            state.service.transcribe(audio).await?
        }
        None => NO_AUDIO_TRANSCRIPT.to_string(),
    };
    Ok(ResponseJson(TranscriptResponse { text }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::data_uri;
    use crate::error::ErrorBody;
    use crate::provider::mock::MockProvider;
    use crate::wav::{encode_wav, PcmBuffer};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::json;
    use tower::ServiceExt;

    fn app(provider: Arc<MockProvider>, body_limit_mb: usize) -> Router {
        let service = Arc::new(AnalysisService::new(provider, &ServerConfig::default()));
        router(AppState {
            service,
            body_limit_mb,
        })
    }

    fn post_json(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn wav_uri() -> String {
        data_uri::encode(data_uri::WAV_MIME, &encode_wav(&PcmBuffer::mono(8_000, vec![0.1; 80])))
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Arc::new(MockProvider::default()), 50)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyze_without_frames_is_400() {
        let response = app(Arc::new(MockProvider::default()), 50)
            .oneshot(post_json("/api/analyze", json!({ "duration": 3.0 }).to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = serde_json::from_value(read_json(response).await).unwrap();
        assert!(!body.error.is_empty());
    }

    #[tokio::test]
    async fn test_silent_video_still_analyzes() {
        let provider = Arc::new(MockProvider::default().with_reply(r#"{"meta":{"product_name":"Soap"}}"#));
        let body = json!({
            "framesWithTime": [
                { "image": "data:image/jpeg;base64,AA==", "timestamp": "0:00" },
                { "image": "data:image/jpeg;base64,AA==", "timestamp": "0:02" },
                { "image": "data:image/jpeg;base64,AA==", "timestamp": "0:05" },
                { "image": "data:image/jpeg;base64,AA==", "timestamp": "0:07" }
            ],
            "duration": 10.0
        });
        let response = app(provider.clone(), 50)
            .oneshot(post_json("/api/analyze", body.to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["meta"]["product_name"], "Soap");
        let system = provider.requests()[0]["messages"][0]["content"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(system.contains(NO_AUDIO_TRANSCRIPT));
    }

    #[tokio::test]
    async fn test_malformed_provider_reply_is_500() {
        let provider = Arc::new(MockProvider::default().with_reply("```json\n{broken"));
        let body = json!({ "frames": ["data:image/jpeg;base64,AA=="], "duration": 1.0 });
        let response = app(provider, 50)
            .oneshot(post_json("/api/analyze", body.to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = serde_json::from_value(read_json(response).await).unwrap();
        assert!(body.error.contains("JSON"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let big = "A".repeat(2 * 1024 * 1024);
        let body = json!({ "frames": [big] });
        let response = app(Arc::new(MockProvider::default()), 1)
            .oneshot(post_json("/api/visuals", body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_invalid_json_is_400() {
        let response = app(Arc::new(MockProvider::default()), 50)
            .oneshot(post_json("/api/visuals", "{not json".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_transcribe_without_audio() {
        let response = app(Arc::new(MockProvider::default()), 50)
            .oneshot(post_json("/api/transcribe", "{}".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({ "text": NO_AUDIO_TRANSCRIPT }));
    }

    #[tokio::test]
    async fn test_transcribe_returns_text_and_removes_temp_file() {
        let provider = Arc::new(MockProvider::default().with_transcript("hello"));
        let response = app(provider.clone(), 50)
            .oneshot(post_json("/api/transcribe", json!({ "audio": wav_uri() }).to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["text"], "hello");
        assert!(provider.audio_paths().iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn test_transcribe_failure_is_500_and_cleans_up() {
        let provider = Arc::new(MockProvider::default().failing_transcription());
        let response = app(provider.clone(), 50)
            .oneshot(post_json("/api/transcribe", json!({ "audio": wav_uri() }).to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(provider.audio_paths().len(), 1);
        assert!(!provider.audio_paths()[0].exists());
    }

    #[tokio::test]
    async fn test_audio_route_without_audio_is_400() {
        let response = app(Arc::new(MockProvider::default()), 50)
            .oneshot(post_json("/api/audio", "{}".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
