use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::data_uri;
use crate::error::AnalysisError;
use crate::payload::{AnalysisPayload, Frame};
use crate::prompts;
use crate::provider::{ChatMessage, ChatRequest, ContentPart, ModelProvider, ProviderError, ResponseFormat};
use crate::report::parse_json_reply;

/// 没有音频时写入提示词的转写文本
pub const NO_AUDIO_TRANSCRIPT: &str = "No audio detected.";
/// 转写失败时写入提示词的转写文本
pub const FAILED_TRANSCRIPT: &str = "Audio processing failed.";
/// 转写结果为空时的文本
pub const EMPTY_TRANSCRIPT: &str = "No spoken words.";

const COMBINED_MAX_TOKENS: u32 = 3500;
const VISUALS_MAX_TOKENS: u32 = 2000;
const AUDIO_MAX_TOKENS: u32 = 800;

/// 请求期间写到临时目录的音频文件，离开作用域时删除
///
/// 文件名带 UUID，并发请求之间不会冲突
pub struct TempAudioFile {
    path: PathBuf,
}

impl TempAudioFile {
    /// 解码 data URI 并写入 `<tmp>/upload_<uuid>.wav`
    pub async fn from_data_uri(uri: &str) -> Result<Self, AnalysisError> {
        let bytes = data_uri::decode(uri)
            .map_err(|e| AnalysisError::InvalidRequest(format!("音频数据无效: {}", e)))?;
        let path = std::env::temp_dir().join(format!("upload_{}.wav", uuid::Uuid::new_v4()));
        let file = Self { path };
        tokio::fs::write(&file.path, bytes)
            .await
            .map_err(|e| AnalysisError::ProviderTranscription(format!("写入临时音频文件失败: {}", e)))?;
        debug!("临时音频文件: {}", file.path.display());
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAudioFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                error!("删除临时音频文件失败: {} - {}", self.path.display(), e);
            }
        }
    }
}

/// 分析服务：组装提示词、调用模型服务、解析结果
pub struct AnalysisService {
    provider: Arc<dyn ModelProvider>,
    chat_model: String,
}

impl AnalysisService {
    pub fn new(provider: Arc<dyn ModelProvider>, config: &ServerConfig) -> Self {
        Self {
            provider,
            chat_model: config.chat_model.clone(),
        }
    }

    /// 转写一段 WAV data URI；空文本返回 `"No spoken words."`
    pub async fn transcribe(&self, audio_uri: &str) -> Result<String, AnalysisError> {
        let start = Instant::now();
        let temp = TempAudioFile::from_data_uri(audio_uri).await?;
        let text = self
            .provider
            .transcribe(temp.path(), prompts::TRANSCRIPTION_HINT)
            .await
            .map_err(|e| AnalysisError::ProviderTranscription(e.to_string()))?;
        info!("✅ [转写] 完成，耗时: {:.2}秒", start.elapsed().as_secs_f64());

        let text = text.trim();
        Ok(if text.is_empty() {
            EMPTY_TRANSCRIPT.to_string()
        } else {
            text.to_string()
        })
    }

    /// 综合分析使用的转写文本：没有音频或转写失败时退化为固定文本
    pub async fn transcript_or_fallback(&self, audio_uri: Option<&str>) -> String {
        let Some(uri) = audio_uri else {
            return NO_AUDIO_TRANSCRIPT.to_string();
        };
        match self.transcribe(uri).await {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️  [转写] 失败，使用占位文本继续分析: {}", e);
                FAILED_TRANSCRIPT.to_string()
            }
        }
    }

    /// 综合分析：先转写（转写文本要写进提示词），再带着画面发起一次对话补全
    pub async fn analyze_combined(&self, payload: &AnalysisPayload) -> Result<Value, AnalysisError> {
        let frames = payload.normalize_frames()?;
        info!("🎬 [综合分析] 处理 {} 帧", frames.len());

        let transcript = self.transcript_or_fallback(payload.audio_uri()).await;
        let request = self.frames_request(
            prompts::combined_system_prompt(&transcript),
            &frames,
            COMBINED_MAX_TOKENS,
        );
        self.complete_json(&request).await
    }

    /// 视觉分析：只看画面
    pub async fn analyze_visuals(&self, payload: &AnalysisPayload) -> Result<Value, AnalysisError> {
        let frames = payload.normalize_frames()?;
        info!("🎞️  [视觉分析] 处理 {} 帧", frames.len());

        let request = self.frames_request(
            prompts::VISUALS_SYSTEM_PROMPT.to_string(),
            &frames,
            VISUALS_MAX_TOKENS,
        );
        self.complete_json(&request).await
    }

    /// 音频分析：转写后分析脚本；这里转写失败直接报错
    pub async fn analyze_audio(&self, audio_uri: Option<&str>) -> Result<Value, AnalysisError> {
        let uri = audio_uri
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| AnalysisError::NoInput("未收到音频".to_string()))?;
        info!("🎵 [音频分析] 开始转写");

        let script = self.transcribe(uri).await?;
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![ChatMessage::system(prompts::audio_system_prompt(&script))],
            max_tokens: AUDIO_MAX_TOKENS,
            response_format: ResponseFormat::json_object(),
        };
        self.complete_json(&request).await
    }

    fn frames_request(&self, system: String, frames: &[Frame], max_tokens: u32) -> ChatRequest {
        let images = frames
            .iter()
            .map(|f| ContentPart::low_detail_image(f.image.clone()))
            .collect();

        ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![
                ChatMessage::system(system),
                ChatMessage::user_parts(images),
                ChatMessage::user(prompts::timestamps_message(frames)),
            ],
            max_tokens,
            response_format: ResponseFormat::json_object(),
        }
    }

    async fn complete_json(&self, request: &ChatRequest) -> Result<Value, AnalysisError> {
        let start = Instant::now();
        let raw = self.provider.complete(request).await.map_err(|e| {
            error!("❌ [模型分析] {} 调用失败: {}", self.provider.name(), e);
            match e {
                ProviderError::Status { status, body } => {
                    AnalysisError::ProviderAnalysis(format!("{}: {}", status, body))
                }
                other => AnalysisError::ProviderAnalysis(other.to_string()),
            }
        })?;

        let value = parse_json_reply(&raw).map_err(|e| {
            error!("❌ [模型分析] 返回内容无法解析为 JSON: {}", e);
            AnalysisError::MalformedResponse(e.to_string())
        })?;
        info!("✅ [模型分析] 完成，耗时: {:.2}秒", start.elapsed().as_secs_f64());
        Ok(value)
    }
}
