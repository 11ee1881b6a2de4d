use ffmpeg_next as ffmpeg;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::data_uri::{self, WAV_MIME};
use crate::frame_sampler::init_ffmpeg;
use crate::wav::{encode_wav, PcmBuffer};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("初始化 FFmpeg 失败: {0}")]
    Init(ffmpeg::Error),
    #[error("无法打开文件: {0}")]
    Open(ffmpeg::Error),
    #[error("未找到音频流")]
    NoAudioStream,
    #[error("音频解码失败: {0}")]
    Decode(#[from] ffmpeg::Error),
    #[error("音频轨道为空")]
    Empty,
}

/// 编码好的音频片段
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// WAV data URI
    pub data_uri: String,
    /// 实际保留的时长（秒）
    pub duration: f64,
    pub sample_rate: u32,
}

/// 音频提取器，从视频中提取单声道 PCM 并编码为 WAV
pub struct AudioExtractor {
    input_path: PathBuf,
    max_seconds: f64,
}

impl AudioExtractor {
    pub fn new(input_path: impl AsRef<Path>, max_seconds: f64) -> Self {
        Self {
            input_path: input_path.as_ref().to_path_buf(),
            max_seconds,
        }
    }

    /// 解码最佳音频流，重采样为单声道 f32，截断到 `max_seconds`
    pub fn extract_pcm(&self) -> Result<PcmBuffer, AudioError> {
        init_ffmpeg().map_err(AudioError::Init)?;

        let mut ictx = ffmpeg::format::input(&self.input_path).map_err(AudioError::Open)?;
        let (stream_index, parameters) = {
            let stream = ictx
                .streams()
                .best(ffmpeg::media::Type::Audio)
                .ok_or(AudioError::NoAudioStream)?;
            (stream.index(), stream.parameters())
        };

        let mut decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
            .decoder()
            .audio()?;
        let sample_rate = decoder.rate();
        let mut resampler = decoder.resampler(
            ffmpeg::format::Sample::F32(ffmpeg::format::sample::Type::Packed),
            ffmpeg::ChannelLayout::MONO,
            sample_rate,
        )?;

        let max_samples = (self.max_seconds.max(0.0) * f64::from(sample_rate)) as usize;
        let mut samples = Vec::new();

        for (stream, packet) in ictx.packets() {
            if stream.index() != stream_index {
                continue;
            }
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            drain(&mut decoder, &mut resampler, &mut samples)?;
            if samples.len() >= max_samples {
                break;
            }
        }

        if samples.len() < max_samples {
            decoder.send_eof()?;
            drain(&mut decoder, &mut resampler, &mut samples)?;
        }

        if samples.is_empty() {
            return Err(AudioError::Empty);
        }

        let mut pcm = PcmBuffer::mono(sample_rate, samples);
        pcm.truncate_secs(self.max_seconds);
        debug!(
            "音频解码完成: {}Hz, {:.2}秒",
            pcm.sample_rate,
            pcm.duration_secs()
        );
        Ok(pcm)
    }

    /// 提取音频片段；没有音轨或解码失败时返回 None
    pub fn extract_clip(&self) -> Option<AudioClip> {
        match self.extract_pcm() {
            Ok(pcm) => {
                let wav = encode_wav(&pcm);
                Some(AudioClip {
                    data_uri: data_uri::encode(WAV_MIME, &wav),
                    duration: pcm.duration_secs(),
                    sample_rate: pcm.sample_rate,
                })
            }
            Err(e) => {
                warn!("⚠️  [音频提取] 跳过音频: {}", e);
                None
            }
        }
    }
}

fn drain(
    decoder: &mut ffmpeg::decoder::Audio,
    resampler: &mut ffmpeg::software::resampling::Context,
    out: &mut Vec<f32>,
) -> Result<(), AudioError> {
    let mut decoded = ffmpeg::frame::Audio::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        let mut mono = ffmpeg::frame::Audio::empty();
        resampler.run(&decoded, &mut mono)?;
        if mono.samples() > 0 {
            out.extend_from_slice(mono.plane::<f32>(0));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_no_clip() {
        let extractor = AudioExtractor::new("/definitely/not/here.mp4", 30.0);
        assert!(matches!(extractor.extract_pcm(), Err(AudioError::Open(_))));
        assert!(extractor.extract_clip().is_none());
    }

    #[test]
    fn test_non_media_file_yields_no_clip() {
        let file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        std::fs::write(file.path(), b"this is not a video").unwrap();
        let extractor = AudioExtractor::new(file.path(), 30.0);
        assert!(extractor.extract_clip().is_none());
    }

    #[test]
    fn test_video_without_audio_track_yields_no_clip() {
        let file = tempfile::Builder::new().suffix(".y4m").tempfile().unwrap();
        crate::frame_sampler::fixtures::write_y4m(file.path(), 64, 48, 10, 20);

        let extractor = AudioExtractor::new(file.path(), 30.0);
        assert!(matches!(extractor.extract_pcm(), Err(AudioError::NoAudioStream)));
        assert!(extractor.extract_clip().is_none());
    }

    #[test]
    fn test_wav_input_is_trimmed_to_cap() {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for i in 0..(8_000 * 3) {
            let v = ((i % 100) as i16 - 50) * 200;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let pcm = AudioExtractor::new(file.path(), 1.0).extract_pcm().unwrap();
        assert_eq!(pcm.channels.len(), 1);
        assert_eq!(pcm.sample_rate, 8_000);
        assert_eq!(pcm.len(), 8_000);
    }
}
