use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame_sampler::MediaDecodeError;

/// 分析链路的错误分类
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 请求中没有任何帧（或音频接口没有音频）
    #[error("{0}")]
    NoInput(String),
    /// 视频或音频解码失败
    #[error("媒体解码失败: {0}")]
    MediaDecode(String),
    /// 语音转写调用失败
    #[error("语音转写失败: {0}")]
    ProviderTranscription(String),
    /// 对话补全调用失败
    #[error("模型分析失败: {0}")]
    ProviderAnalysis(String),
    /// 模型返回的内容不是合法 JSON
    #[error("模型返回的 JSON 无法解析: {0}")]
    MalformedResponse(String),
    /// 请求体超过上限
    #[error("请求体过大，上限为 {limit_mb}MB")]
    PayloadTooLarge { limit_mb: usize },
    /// 请求体格式错误
    #[error("请求格式错误: {0}")]
    InvalidRequest(String),
}

impl AnalysisError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::NoInput(_) | AnalysisError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AnalysisError::MediaDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AnalysisError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AnalysisError::ProviderTranscription(_)
            | AnalysisError::ProviderAnalysis(_)
            | AnalysisError::MalformedResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MediaDecodeError> for AnalysisError {
    fn from(e: MediaDecodeError) -> Self {
        AnalysisError::MediaDecode(e.to_string())
    }
}

/// 错误响应体 `{ "error": "..." }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
