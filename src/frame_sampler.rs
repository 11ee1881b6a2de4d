use ffmpeg_next as ffmpeg;
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use crate::data_uri::{self, JPEG_MIME};

#[derive(Debug, Error)]
pub enum MediaDecodeError {
    #[error("初始化 FFmpeg 失败: {0}")]
    Init(ffmpeg::Error),
    #[error("无法打开视频文件 {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: ffmpeg::Error,
    },
    #[error("未找到视频流")]
    NoVideoStream,
    #[error("视频解码失败: {0}")]
    Decode(#[from] ffmpeg::Error),
    #[error("在 {time:.2}秒 处没有解码出任何帧")]
    NoFrameAt { time: f64 },
    #[error("帧数据不完整")]
    InvalidFrame,
    #[error("JPEG 编码失败: {0}")]
    Encode(#[from] image::ImageError),
}

static FFMPEG_LOG_LEVEL: Once = Once::new();

/// 初始化 FFmpeg，并把日志级别压到 ERROR，抑制警告和信息消息
pub(crate) fn init_ffmpeg() -> Result<(), ffmpeg::Error> {
    ffmpeg::init()?;
    FFMPEG_LOG_LEVEL.call_once(|| unsafe {
        ffmpeg::sys::av_log_set_level(ffmpeg::sys::AV_LOG_ERROR as i32);
    });
    Ok(())
}

/// 视频基本信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// 时长（秒），未知时为 0
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// 一个采样帧
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// 采样时间点（秒）
    pub time: f64,
    /// JPEG data URI
    pub image: String,
}

/// 一次采样的结果
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub frames: Vec<SampledFrame>,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// 均匀采样的时间点：`duration * i / count`，不含结尾
///
/// 时长为 0 或未知时所有时间点都是 0，不做去重
pub fn sample_times(duration: f64, count: usize) -> Vec<f64> {
    let duration = if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        0.0
    };
    (0..count)
        .map(|i| duration * i as f64 / count as f64)
        .collect()
}

/// 按目标宽度等比缩放后的尺寸
pub fn scaled_dimensions(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    let target_width = target_width.max(1);
    if width == 0 || height == 0 {
        return (target_width, target_width);
    }
    let scaled = (f64::from(height) * f64::from(target_width) / f64::from(width)).round();
    (target_width, (scaled as u32).max(1))
}

/// 以固定质量编码 JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(image)?;
    Ok(out)
}

/// 帧采样器：按时间点逐个 seek、解码、缩放并压缩为 JPEG
pub struct FrameSampler {
    input_path: PathBuf,
    frame_width: u32,
    jpeg_quality: u8,
}

impl FrameSampler {
    pub fn new(input_path: impl AsRef<Path>, frame_width: u32, jpeg_quality: u8) -> Result<Self, MediaDecodeError> {
        init_ffmpeg().map_err(MediaDecodeError::Init)?;

        Ok(Self {
            input_path: input_path.as_ref().to_path_buf(),
            frame_width,
            jpeg_quality,
        })
    }

    fn open(&self) -> Result<ffmpeg::format::context::Input, MediaDecodeError> {
        ffmpeg::format::input(&self.input_path).map_err(|source| MediaDecodeError::Open {
            path: self.input_path.display().to_string(),
            source,
        })
    }

    /// 获取视频信息
    pub fn probe(&self) -> Result<VideoInfo, MediaDecodeError> {
        let ictx = self.open()?;
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(MediaDecodeError::NoVideoStream)?;

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() > 0 {
            f64::from(rate.numerator()) / f64::from(rate.denominator())
        } else {
            0.0
        };

        Ok(VideoInfo {
            duration: container_duration(&ictx),
            width: decoder.width(),
            height: decoder.height(),
            fps,
        })
    }

    /// 采样 `count` 帧，按时间顺序返回
    ///
    /// 任何一帧失败都会让整个操作失败，不返回部分结果
    pub fn extract(&self, count: usize) -> Result<FrameSet, MediaDecodeError> {
        let mut ictx = self.open()?;

        let (stream_index, time_base, parameters) = {
            let stream = ictx
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or(MediaDecodeError::NoVideoStream)?;
            (stream.index(), stream.time_base(), stream.parameters())
        };
        let mut decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
            .decoder()
            .video()?;

        let duration = container_duration(&ictx);
        let (width, height) = (decoder.width(), decoder.height());
        let (out_width, out_height) = scaled_dimensions(width, height, self.frame_width);

        let mut scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            out_width,
            out_height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )?;

        let mut frames = Vec::with_capacity(count);
        for time in sample_times(duration, count) {
            let start = Instant::now();
            let decoded = decode_at(&mut ictx, &mut decoder, stream_index, time_base, time)?;

            let mut rgb_frame = ffmpeg::frame::Video::empty();
            scaler.run(&decoded, &mut rgb_frame)?;
            let jpeg = encode_jpeg(&frame_to_image(&rgb_frame)?, self.jpeg_quality)?;

            debug!(
                "采样帧 {:.2}s -> {}x{}, {} 字节, 耗时 {}ms",
                time,
                out_width,
                out_height,
                jpeg.len(),
                start.elapsed().as_millis()
            );
            frames.push(SampledFrame {
                time,
                image: data_uri::encode(JPEG_MIME, &jpeg),
            });
        }

        Ok(FrameSet {
            frames,
            duration,
            width,
            height,
        })
    }
}

fn container_duration(ictx: &ffmpeg::format::context::Input) -> f64 {
    let raw = ictx.duration();
    if raw <= 0 {
        return 0.0;
    }
    raw as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
}

/// seek 到目标时间之前最近的关键帧，解码到第一个不早于目标时间的帧
///
/// 读到文件末尾仍未到达目标时间时，返回最后解码出的帧
fn decode_at(
    ictx: &mut ffmpeg::format::context::Input,
    decoder: &mut ffmpeg::decoder::Video,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    target: f64,
) -> Result<ffmpeg::frame::Video, MediaDecodeError> {
    // 容忍半毫秒的时间戳误差
    const TOLERANCE: f64 = 0.0005;

    let position = (target * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
    ictx.seek(position, ..position)?;
    decoder.flush();

    let frame_time = |frame: &ffmpeg::frame::Video| {
        frame
            .timestamp()
            .map(|ts| ts as f64 * f64::from(time_base))
            .unwrap_or(target)
    };

    let mut last = None;
    let mut decoded = ffmpeg::frame::Video::empty();

    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        // 损坏的数据包直接跳过
        if decoder.send_packet(&packet).is_err() {
            continue;
        }
        while decoder.receive_frame(&mut decoded).is_ok() {
            if frame_time(&decoded) + TOLERANCE >= target {
                return Ok(decoded);
            }
            last = Some(std::mem::replace(&mut decoded, ffmpeg::frame::Video::empty()));
        }
    }

    decoder.send_eof()?;
    while decoder.receive_frame(&mut decoded).is_ok() {
        if frame_time(&decoded) + TOLERANCE >= target {
            return Ok(decoded);
        }
        last = Some(std::mem::replace(&mut decoded, ffmpeg::frame::Video::empty()));
    }

    last.ok_or(MediaDecodeError::NoFrameAt { time: target })
}

/// 将 RGB24 帧转换为 RgbImage（逐行拷贝，跳过行尾填充）
fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage, MediaDecodeError> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_len = width as usize * 3;

    let mut buf = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let row = data
            .get(start..start + row_len)
            .ok_or(MediaDecodeError::InvalidFrame)?;
        buf.extend_from_slice(row);
    }

    RgbImage::from_raw(width, height, buf).ok_or(MediaDecodeError::InvalidFrame)
}

/// 测试用的视频素材
#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;
    use std::path::Path;

    /// 写一个没有音轨的 YUV4MPEG2 视频：第 i 帧的亮度为 `i * 2`（灰度）
    pub fn write_y4m(path: &Path, width: usize, height: usize, fps: u32, frame_count: usize) {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path).unwrap());
        writeln!(file, "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 C420jpeg", width, height, fps).unwrap();

        let chroma = vec![128u8; (width / 2) * (height / 2)];
        for i in 0..frame_count {
            file.write_all(b"FRAME\n").unwrap();
            file.write_all(&vec![(i * 2).min(255) as u8; width * height]).unwrap();
            file.write_all(&chroma).unwrap();
            file.write_all(&chroma).unwrap();
        }
        file.flush().unwrap();
    }
}
