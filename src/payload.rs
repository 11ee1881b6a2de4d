use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// 单个关键帧：JPEG data URI + 时间码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// JPEG data URI
    pub image: String,
    /// 时间码（`"12s"` 或 `"0:12"`）
    pub timestamp: String,
}

/// 分析请求体
///
/// `framesWithTime` 与 `frames` 二选一，前者优先
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    /// 不带时间码的帧（时间码由服务端推导）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<String>>,
    /// 已带时间码的帧
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_with_time: Option<Vec<Frame>>,
    /// WAV data URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// 视频时长（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl AnalysisPayload {
    /// 统一为带时间码的帧列表
    ///
    /// 裸帧按 `floor(i / n * duration)` 秒标注；没有时长时统一标为 `"0:00"`
    pub fn normalize_frames(&self) -> Result<Vec<Frame>, AnalysisError> {
        if let Some(frames) = self.frames_with_time.as_ref().filter(|f| !f.is_empty()) {
            return Ok(frames.clone());
        }

        if let Some(frames) = self.frames.as_ref().filter(|f| !f.is_empty()) {
            let count = frames.len() as f64;
            let duration = self.duration.filter(|d| *d > 0.0);
            return Ok(frames
                .iter()
                .enumerate()
                .map(|(i, image)| Frame {
                    image: image.clone(),
                    timestamp: match duration {
                        Some(d) => format!("{}s", ((i as f64 / count) * d).floor() as u64),
                        None => "0:00".to_string(),
                    },
                })
                .collect());
        }

        Err(AnalysisError::NoInput("未收到任何视频帧".to_string()))
    }

    /// 非空的音频 data URI
    pub fn audio_uri(&self) -> Option<&str> {
        self.audio.as_deref().filter(|a| !a.trim().is_empty())
    }
}

/// `/api/audio` 与 `/api/transcribe` 的请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

/// `/api/transcribe` 的响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub text: String,
}
