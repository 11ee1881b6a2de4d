/// 44 字节标准 RIFF/WAVE 头
pub const WAV_HEADER_LEN: usize = 44;

const PCM_FORMAT_TAG: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// 解码后的 PCM 浮点音频，按声道分开存放
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// 每个声道的采样数（取最短声道）
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / f64::from(self.sample_rate)
    }

    /// 截断到最多 `max_secs` 秒
    pub fn truncate_secs(&mut self, max_secs: f64) {
        let max_len = (max_secs.max(0.0) * f64::from(self.sample_rate)) as usize;
        for channel in &mut self.channels {
            channel.truncate(max_len);
        }
    }
}

/// 浮点采样量化为 16 位整数：先截断到 [-1, 1]，负半轴乘 32768，正半轴乘 32767
pub fn quantize(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// 把 PCM 缓冲编码为 16 位小端 WAV 容器（交错存放各声道）
pub fn encode_wav(buffer: &PcmBuffer) -> Vec<u8> {
    let num_channels = buffer.channels.len().max(1) as u16;
    let num_samples = buffer.len();
    let data_len = (num_samples * usize::from(num_channels) * 2) as u32;
    let block_align = num_channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = buffer.sample_rate * u32::from(block_align);

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    out.extend_from_slice(&num_channels.to_le_bytes());
    out.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for i in 0..num_samples {
        for channel in &buffer.channels {
            out.extend_from_slice(&quantize(channel[i]).to_le_bytes());
        }
    }

    out
}
