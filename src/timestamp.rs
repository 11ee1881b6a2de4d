/// 将秒数格式化为 `M:SS`（分钟不补零，秒补足两位）
pub fn format_min_sec(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// 将模型返回的时间码解析为整数秒
///
/// 支持 `"12s"`、`"0:12"`、`"12"`、`"0:12 start"` 等写法。时间码来自不可信的
/// 模型输出，任何解析失败都返回 0，不向上传播错误。
pub fn parse_timestamp(input: Option<&str>) -> u32 {
    let Some(raw) = input else {
        return 0;
    };

    let lowered = raw.trim().to_lowercase();
    let stripped = lowered
        .strip_suffix("start")
        .or_else(|| lowered.strip_suffix('s'))
        .unwrap_or(&lowered);
    let clean = stripped.trim();

    let seconds = if clean.contains(':') {
        let mut parts = clean.split(':');
        match (
            parts.next().and_then(parse_leading_int),
            parts.next().and_then(parse_leading_int),
        ) {
            (Some(minutes), Some(seconds)) => {
                match minutes.checked_mul(60).and_then(|m| m.checked_add(seconds)) {
                    Some(total) => total,
                    None => return 0,
                }
            }
            _ => return 0,
        }
    } else {
        match parse_leading_int(clean) {
            Some(seconds) => seconds,
            None => return 0,
        }
    };

    u32::try_from(seconds).unwrap_or(0)
}

/// 根据时间码找到最接近的采样帧下标
pub fn frame_index_for_time(seconds: u32, duration: f64, frame_count: usize) -> Option<usize> {
    if frame_count == 0 || !(duration > 0.0) {
        return None;
    }
    let index = (f64::from(seconds) / duration * frame_count as f64).floor();
    let index = if index < 0.0 { 0 } else { index as usize };
    Some(index.min(frame_count - 1))
}

/// 只取开头的整数部分（`"12-0"` -> 12），与宽松的时间码写法保持一致
fn parse_leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}
