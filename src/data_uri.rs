use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

pub const JPEG_MIME: &str = "image/jpeg";
pub const WAV_MIME: &str = "audio/wav";

#[derive(Debug, Error)]
pub enum DataUriError {
    #[error("base64 解码失败: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("数据为空")]
    Empty,
}

/// 将二进制内容编码为 `data:<mime>;base64,<payload>`
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// 解码 data URI；不带 `;base64,` 前缀时按纯 base64 处理
pub fn decode(uri: &str) -> Result<Vec<u8>, DataUriError> {
    let payload = match uri.rfind(";base64,") {
        Some(pos) => &uri[pos + ";base64,".len()..],
        None => uri,
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(DataUriError::Empty);
    }
    Ok(STANDARD.decode(payload)?)
}
