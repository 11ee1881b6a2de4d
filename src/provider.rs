use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ServerConfig;

/// 访问模型服务的凭证所在的环境变量
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("模型服务返回 {status}: {body}")]
    Status { status: u16, body: String },
    #[error("读取音频文件失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("模型服务返回了空内容")]
    EmptyResponse,
}

/// 对话补全请求
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    /// 低清晰度的图片输入，减少 token 消耗
    pub fn low_detail_image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: Some("low".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// 外部模型服务：语音转写 + 对话补全
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 转写一个 WAV 文件，返回原始文本（可能为空）
    async fn transcribe(&self, audio_path: &Path, prompt: &str) -> Result<String, ProviderError>;

    /// 发起对话补全，返回第一条回复的原始文本
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError>;
}

/// OpenAI 兼容接口
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    transcription_model: String,
}

#[derive(Deserialize)]
struct TranscriptionBody {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct CompletionBody {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, config: &ServerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("创建 HTTP 客户端失败")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            transcription_model: config.transcription_model.clone(),
        })
    }

    /// 从环境变量读取凭证并创建客户端；凭证缺失或为空时直接失败
    pub fn from_env(config: &ServerConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .with_context(|| format!("未找到 {} 环境变量，无法访问模型服务", API_KEY_ENV))?;
        Self::new(api_key, config)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, audio_path: &Path, prompt: &str) -> Result<String, ProviderError> {
        let start = Instant::now();
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone())
            .text("prompt", prompt.to_string());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let body: TranscriptionBody = Self::check_status(response).await?.json().await?;

        debug!(
            model = %self.transcription_model,
            latency_ms = start.elapsed().as_millis() as u64,
            "转写完成"
        );
        Ok(body.text)
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let body: CompletionBody = Self::check_status(response).await?.json().await?;

        debug!(
            model = %request.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "对话补全完成"
        );

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_wire_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                ChatMessage::system("sys"),
                ChatMessage::user_parts(vec![ContentPart::low_detail_image("data:image/jpeg;base64,AA==")]),
                ChatMessage::user("Timestamps: 0:00"),
            ],
            max_tokens: 100,
            response_format: ResponseFormat::json_object(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"], json!({ "type": "json_object" }));
        assert_eq!(value["messages"][0], json!({ "role": "system", "content": "sys" }));
        assert_eq!(
            value["messages"][1]["content"][0],
            json!({
                "type": "image_url",
                "image_url": { "url": "data:image/jpeg;base64,AA==", "detail": "low" }
            })
        );
        assert_eq!(value["messages"][2]["content"], "Timestamps: 0:00");
    }

    #[test]
    fn test_from_env_requires_api_key() {
        // 环境变量是进程级状态，本模块只有这一个用例修改它
        let previous = std::env::var_os(API_KEY_ENV);
        let config = ServerConfig::default();

        std::env::remove_var(API_KEY_ENV);
        let missing = OpenAiProvider::from_env(&config).err().unwrap();
        assert!(missing.to_string().contains("OPENAI_API_KEY"));

        std::env::set_var(API_KEY_ENV, "  \t ");
        let blank = OpenAiProvider::from_env(&config).err().unwrap();
        assert!(blank.to_string().contains("OPENAI_API_KEY"));

        std::env::set_var(API_KEY_ENV, "sk-test");
        assert!(OpenAiProvider::from_env(&config).is_ok());

        match previous {
            Some(value) => std::env::set_var(API_KEY_ENV, value),
            None => std::env::remove_var(API_KEY_ENV),
        }
    }
}
