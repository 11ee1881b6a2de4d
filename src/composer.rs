use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

use crate::payload::{AnalysisPayload, AudioPayload, TranscriptResponse};
use crate::report::{merge_partials, parse_json_reply, AnalysisResult, AudioPartial, VisionPartial};

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("请求分析服务失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("分析服务返回错误 {status}: {body}")]
    Status { status: u16, body: String },
    #[error("无法解析分析服务返回的 JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 分析服务客户端
#[derive(Clone)]
pub struct AnalysisClient {
    client: reqwest::Client,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ComposeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ComposeError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("❌ [分析请求] {} 返回错误状态: {} - {}", path, status, text);
            return Err(ComposeError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_value(parse_json_reply(&text)?)?)
    }

    /// 综合模式：一次请求 `/api/analyze`
    pub async fn analyze_combined(&self, payload: &AnalysisPayload) -> Result<AnalysisResult, ComposeError> {
        let start = Instant::now();
        info!("⏳ [分析请求] 综合模式...");
        let result = self.post("/api/analyze", payload).await?;
        info!("✅ [分析请求] 综合模式完成，耗时: {:.2}秒", start.elapsed().as_secs_f64());
        Ok(result)
    }

    /// 拆分模式：视觉与音频两路并发，任一路失败则整体失败
    pub async fn analyze_split(&self, payload: &AnalysisPayload) -> Result<AnalysisResult, ComposeError> {
        let start = Instant::now();
        info!("⏳ [分析请求] 拆分模式（视觉 + 音频并发）...");

        let visual_body = AnalysisPayload {
            audio: None,
            ..payload.clone()
        };
        let visuals = self.post::<_, VisionPartial>("/api/visuals", &visual_body);
        let audio = async {
            match payload.audio_uri() {
                Some(uri) => {
                    let body = AudioPayload {
                        audio: Some(uri.to_string()),
                    };
                    self.post::<_, AudioPartial>("/api/audio", &body).await
                }
                None => Ok(AudioPartial::default()),
            }
        };

        let (vision, audio) = tokio::try_join!(visuals, audio)?;
        info!("✅ [分析请求] 拆分模式完成，耗时: {:.2}秒", start.elapsed().as_secs_f64());
        Ok(merge_partials(vision, audio))
    }

    /// 只转写
    pub async fn transcribe(&self, audio_uri: &str) -> Result<String, ComposeError> {
        let body = AudioPayload {
            audio: Some(audio_uri.to_string()),
        };
        let response: TranscriptResponse = self.post("/api/transcribe", &body).await?;
        Ok(response.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisService;
    use crate::config::ServerConfig;
    use crate::data_uri;
    use crate::handler::{router, AppState};
    use crate::payload::Frame;
    use crate::provider::mock::MockProvider;
    use crate::wav::{encode_wav, PcmBuffer};
    use serde_json::json;
    use std::sync::Arc;

    async fn spawn_proxy(provider: Arc<MockProvider>) -> AnalysisClient {
        let service = Arc::new(AnalysisService::new(provider, &ServerConfig::default()));
        let app = router(AppState {
            service,
            body_limit_mb: 50,
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        AnalysisClient::new(format!("http://{}/", addr), Duration::from_secs(10)).unwrap()
    }

    fn payload(with_audio: bool) -> AnalysisPayload {
        AnalysisPayload {
            frames: None,
            frames_with_time: Some(vec![
                Frame {
                    image: "data:image/jpeg;base64,AA==".to_string(),
                    timestamp: "0:00".to_string(),
                },
                Frame {
                    image: "data:image/jpeg;base64,AA==".to_string(),
                    timestamp: "0:05".to_string(),
                },
            ]),
            audio: with_audio.then(|| {
                data_uri::encode(
                    data_uri::WAV_MIME,
                    &encode_wav(&PcmBuffer::mono(8_000, vec![0.2; 160])),
                )
            }),
            duration: Some(10.0),
        }
    }

    // 两路并发时回复顺序不确定，所以用同一份包含两路字段的回复
    const BOTH_BRANCHES: &str = r#"{
        "production_analysis": { "camera_gear": "Smartphone (UGC)" },
        "content_xray_visuals": { "ethnicity": "South Asian", "language": "visual guess" },
        "scene_by_scene": [ { "timecode": "0:00", "segment": "Hook", "visual": "Close-up" } ],
        "meta": { "product_name": "Soap", "quality_score": 8 },
        "content_xray_audio": { "language": "Kannada", "script": "..." },
        "strategy": { "one_liner": "Clean fast" },
        "brand_takeaways": ["Lead with the product"]
    }"#;

    #[tokio::test]
    async fn test_split_mode_merges_both_branches() {
        let provider = Arc::new(
            MockProvider::default()
                .with_transcript("namaskara")
                .with_reply(BOTH_BRANCHES)
                .with_reply(BOTH_BRANCHES),
        );
        let client = spawn_proxy(provider.clone()).await;

        let result = client.analyze_split(&payload(true)).await.unwrap();
        assert_eq!(result.meta["product_name"], "Soap");
        assert_eq!(result.production_analysis["camera_gear"], "Smartphone (UGC)");
        assert_eq!(
            result.content_xray,
            json!({ "ethnicity": "South Asian", "language": "Kannada", "script": "..." })
        );
        assert_eq!(result.scenes().len(), 1);
        assert_eq!(result.takeaways(), vec!["Lead with the product".to_string()]);
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_split_mode_without_audio_skips_audio_call() {
        let provider = Arc::new(MockProvider::default().with_reply(BOTH_BRANCHES));
        let client = spawn_proxy(provider.clone()).await;

        let result = client.analyze_split(&payload(false)).await.unwrap();
        assert_eq!(provider.requests().len(), 1);
        assert!(provider.audio_paths().is_empty());
        assert_eq!(result.meta, crate::report::default_meta());
        assert_eq!(result.brand_takeaways, json!([]));
        assert_eq!(result.content_xray["ethnicity"], "South Asian");
    }

    #[tokio::test]
    async fn test_split_mode_fails_when_audio_branch_fails() {
        let provider = Arc::new(MockProvider::default().failing_transcription());
        let client = spawn_proxy(provider).await;

        let err = client.analyze_split(&payload(true)).await.unwrap_err();
        match err {
            ComposeError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_2xx_error_includes_body() {
        let provider = Arc::new(MockProvider::default().with_failure("quota exceeded"));
        let client = spawn_proxy(provider).await;

        let err = client.analyze_combined(&payload(false)).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_combined_mode_returns_full_result() {
        let provider = Arc::new(
            MockProvider::default()
                .with_reply(r#"{"meta":{"product_name":"Soap"},"critique":{"missed_opportunities":["Add subtitles"]},"custom":1}"#),
        );
        let client = spawn_proxy(provider).await;

        let result = client.analyze_combined(&payload(false)).await.unwrap();
        assert_eq!(result.field("meta", "product_name").as_deref(), Some("Soap"));
        assert_eq!(result.missed_opportunities(), vec!["Add subtitles".to_string()]);
        assert_eq!(result.extra["custom"], 1);
    }

    #[tokio::test]
    async fn test_transcribe_round_trip() {
        let provider = Arc::new(MockProvider::default().with_transcript("hello there"));
        let client = spawn_proxy(provider).await;

        let audio = payload(true).audio.unwrap();
        assert_eq!(client.transcribe(&audio).await.unwrap(), "hello there");
    }
}
