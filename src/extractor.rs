use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

use crate::audio_extractor::{AudioClip, AudioExtractor};
use crate::config::ExtractConfig;
use crate::data_uri;
use crate::frame_sampler::{FrameSampler, FrameSet};
use crate::payload::{AnalysisPayload, Frame};
use crate::timestamp::format_min_sec;

/// 一次提取的结果
#[derive(Debug, Clone)]
pub struct ExtractedMedia {
    pub frames: FrameSet,
    /// 没有音轨或解码失败时为 None
    pub audio: Option<AudioClip>,
}

impl ExtractedMedia {
    /// 视频时长（秒）
    pub fn duration(&self) -> f64 {
        self.frames.duration
    }

    /// 第 i 帧标注为 `M:SS`，取 `i * duration / n`
    pub fn frames_with_time(&self) -> Vec<Frame> {
        let count = self.frames.frames.len();
        let duration = self.duration();
        self.frames
            .frames
            .iter()
            .enumerate()
            .map(|(i, frame)| Frame {
                image: frame.image.clone(),
                timestamp: format_min_sec(i as f64 * (duration / count as f64)),
            })
            .collect()
    }

    /// 把采样帧写成 `<dir>/frame_<i>.jpg`，与简报中的 `frame #i` 对应
    pub fn write_frames(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).with_context(|| format!("创建目录失败: {}", dir.display()))?;

        self.frames
            .frames
            .iter()
            .enumerate()
            .map(|(i, frame)| -> Result<PathBuf> {
                let jpeg = data_uri::decode(&frame.image).context("解码采样帧失败")?;
                let path = dir.join(format!("frame_{}.jpg", i));
                std::fs::write(&path, jpeg).with_context(|| format!("写入文件失败: {}", path.display()))?;
                Ok(path)
            })
            .collect()
    }

    /// 组装为分析请求体
    pub fn to_payload(&self) -> AnalysisPayload {
        AnalysisPayload {
            frames: None,
            frames_with_time: Some(self.frames_with_time()),
            audio: self.audio.as_ref().map(|clip| clip.data_uri.clone()),
            duration: Some(self.duration()),
        }
    }
}

/// 提取关键帧和音频
///
/// 帧采样与音频解码在阻塞线程池上并行执行；帧采样失败即整体失败，音频失败只会让 `audio` 为空
pub async fn extract_media(input_video_path: impl AsRef<Path>, config: &ExtractConfig) -> Result<ExtractedMedia> {
    let input_video_path: PathBuf = input_video_path.as_ref().to_path_buf();

    let total_start = Instant::now();
    info!("🎬 [媒体提取] 开始处理视频: {}", input_video_path.display());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. 获取视频信息
    let info_start = Instant::now();
    let sampler = FrameSampler::new(&input_video_path, config.frame_width, config.jpeg_quality)?;
    let video_info = sampler.probe().map_err(|e| {
        error!("❌ [媒体提取] 获取视频信息失败: {}", e);
        e
    })?;
    info!(
        "✅ [媒体提取] 获取视频信息完成，耗时: {:.2}秒",
        info_start.elapsed().as_secs_f64()
    );
    info!("  • 分辨率: {}x{}", video_info.width, video_info.height);
    info!("  • 时长: {:.2}秒", video_info.duration);
    info!("  • 帧率: {:.2} fps", video_info.fps);

    // 2. 并行提取关键帧和音频
    info!(
        "⏳ [媒体提取] 正在采样 {} 帧并解码音频（最长 {:.0}秒）...",
        config.frame_count, config.max_audio_seconds
    );
    let frame_count = config.frame_count;
    let frames_task = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        sampler.extract(frame_count).map(|set| (set, start.elapsed()))
    });

    let audio_extractor = AudioExtractor::new(&input_video_path, config.max_audio_seconds);
    let audio_task = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        (audio_extractor.extract_clip(), start.elapsed())
    });

    let (frames_result, audio_result) = tokio::join!(frames_task, audio_task);

    let (frames, frames_elapsed) = frames_result.context("帧采样任务异常退出")?.map_err(|e| {
        error!("❌ [媒体提取] 采样视频帧失败: {}", e);
        e
    })?;
    let avg_frame_time = if frames.frames.is_empty() {
        0.0
    } else {
        frames_elapsed.as_millis() as f64 / frames.frames.len() as f64
    };
    info!(
        "✅ [媒体提取] 采样视频帧完成，耗时: {:.2}秒",
        frames_elapsed.as_secs_f64()
    );
    info!("  • 采样帧数: {} 帧", frames.frames.len());
    info!("  • 平均每帧耗时: {:.2}ms", avg_frame_time);

    let (audio, audio_elapsed) = audio_result.context("音频提取任务异常退出")?;
    match &audio {
        Some(clip) => {
            info!(
                "✅ [媒体提取] 音频提取完成，耗时: {:.2}秒",
                audio_elapsed.as_secs_f64()
            );
            info!("  • 音频时长: {:.2}秒 ({}Hz)", clip.duration, clip.sample_rate);
        }
        None => info!("🔇 [媒体提取] 无可用音频，继续仅画面分析"),
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "🎉 [媒体提取] 全部完成！总耗时: {:.2}秒",
        total_start.elapsed().as_secs_f64()
    );

    Ok(ExtractedMedia { frames, audio })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_sampler::SampledFrame;

    fn media(times: &[f64], duration: f64, audio: bool) -> ExtractedMedia {
        ExtractedMedia {
            frames: FrameSet {
                frames: times
                    .iter()
                    .map(|t| SampledFrame {
                        time: *t,
                        image: "data:image/jpeg;base64,AA==".to_string(),
                    })
                    .collect(),
                duration,
                width: 1920,
                height: 1080,
            },
            audio: audio.then(|| AudioClip {
                data_uri: "data:audio/wav;base64,UklGRg==".to_string(),
                duration: 1.0,
                sample_rate: 8_000,
            }),
        }
    }

    #[test]
    fn test_frames_with_time_uses_min_sec() {
        let stamps: Vec<String> = media(&[0.0, 25.0, 50.0, 75.0], 100.0, false)
            .frames_with_time()
            .into_iter()
            .map(|f| f.timestamp)
            .collect();
        assert_eq!(stamps, vec!["0:00", "0:25", "0:50", "1:15"]);
    }

    #[test]
    fn test_payload_carries_audio_and_duration() {
        let payload = media(&[0.0, 5.0], 10.0, true).to_payload();
        assert_eq!(payload.duration, Some(10.0));
        assert!(payload.audio_uri().is_some());
        assert_eq!(payload.normalize_frames().unwrap().len(), 2);

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("framesWithTime").is_some());
        assert!(json.get("frames").is_none());
    }

    #[test]
    fn test_silent_video_payload_has_no_audio() {
        let payload = media(&[0.0], 3.0, false).to_payload();
        assert!(payload.audio.is_none());
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("audio").is_none());
    }

    #[test]
    fn test_write_frames_numbers_files_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("frames");
        let paths = media(&[0.0, 5.0], 10.0, false).write_frames(&target).unwrap();

        assert_eq!(paths, vec![target.join("frame_0.jpg"), target.join("frame_1.jpg")]);
        assert_eq!(std::fs::read(&paths[1]).unwrap(), vec![0u8]);
    }

    #[tokio::test]
    async fn test_extract_silent_video_end_to_end() {
        let file = tempfile::Builder::new().suffix(".y4m").tempfile().unwrap();
        crate::frame_sampler::fixtures::write_y4m(file.path(), 64, 48, 10, 100);
        let config = ExtractConfig {
            frame_count: 4,
            frame_width: 32,
            ..ExtractConfig::default()
        };

        let media = extract_media(file.path(), &config).await.unwrap();
        assert!(media.audio.is_none());
        let stamps: Vec<String> = media.frames_with_time().into_iter().map(|f| f.timestamp).collect();
        assert_eq!(stamps, vec!["0:00", "0:02", "0:05", "0:07"]);
        assert!(media.to_payload().audio.is_none());
    }

    #[tokio::test]
    async fn test_missing_video_fails() {
        let result = extract_media("/definitely/not/here.mp4", &ExtractConfig::default()).await;
        assert!(result.is_err());
    }
}
