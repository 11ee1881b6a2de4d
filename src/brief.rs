//! 把分析结果渲染成纯文本策略简报

use chrono::NaiveDate;

use crate::report::{AnalysisResult, Scene};
use crate::timestamp::{format_min_sec, frame_index_for_time, parse_timestamp};

const RULE: &str = "────────────────────────────────────────────────────────────";

/// 策略手册中的一行：做得好的 / 错过的机会
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybookRow {
    pub worked: Option<String>,
    pub missed: Option<String>,
}

/// 按下标配对 `brand_takeaways` 和 `critique.missed_opportunities`，两边都为空的行丢弃
pub fn playbook_rows(result: &AnalysisResult) -> Vec<PlaybookRow> {
    let worked = result.takeaways();
    let missed = result.missed_opportunities();
    let rows = worked.len().max(missed.len());

    (0..rows)
        .map(|i| PlaybookRow {
            worked: worked.get(i).filter(|s| !s.is_empty()).cloned(),
            missed: missed.get(i).filter(|s| !s.is_empty()).cloned(),
        })
        .filter(|row| row.worked.is_some() || row.missed.is_some())
        .collect()
}

/// 采样网格：视频时长与采样帧数，用于把场景时间码对应到缩略图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleGrid {
    pub duration: f64,
    pub frame_count: usize,
}

impl SampleGrid {
    /// 第 `index` 帧的采样时间
    pub fn frame_time(&self, index: usize) -> f64 {
        if self.frame_count == 0 {
            return 0.0;
        }
        index as f64 * (self.duration / self.frame_count as f64)
    }
}

/// 场景与最接近的采样帧下标
pub fn scene_frames(result: &AnalysisResult, grid: SampleGrid) -> Vec<(Scene, Option<usize>)> {
    result
        .scenes()
        .into_iter()
        .map(|scene| {
            let seconds = parse_timestamp(Some(&scene.timecode));
            let index = frame_index_for_time(seconds, grid.duration, grid.frame_count);
            (scene, index)
        })
        .collect()
}

/// 简短摘要：`Ad / Hook / Script`
pub fn clipboard_summary(result: &AnalysisResult) -> String {
    format!(
        "Ad: {}\nHook: {}\nScript: {}",
        or_dash(result.field("meta", "product_name")),
        or_dash(result.field("strategy", "hook_tactic")),
        or_dash(result.field("content_xray", "script")),
    )
}

/// 渲染完整简报；给出采样网格时，时间线每一行附上对应的缩略帧
pub fn render_brief(result: &AnalysisResult, date: NaiveDate, grid: Option<SampleGrid>) -> String {
    let f = |section: &str, key: &str| or_dash(result.field(section, key));

    let mut lines = vec![
        "CREATIVE STRATEGY BRIEF".to_string(),
        format!(
            "CAMPAIGN: {}  |  SCORE: {}  |  Generated: {}",
            result
                .field("meta", "product_name")
                .unwrap_or_else(|| "Ad Creative".to_string()),
            f("meta", "quality_score"),
            date.format("%Y-%m-%d")
        ),
        RULE.to_string(),
        String::new(),
        "1. EXECUTIVE SUMMARY".to_string(),
        "  [STRATEGIC CORE]".to_string(),
        format!("  HOOK:     {}", f("strategy", "hook_tactic")),
        format!("  WIN:      {}", f("strategy", "winning_factor")),
        format!("  CONCEPT:  \"{}\"", f("strategy", "one_liner")),
        "  [PRODUCTION & SIGNALS]".to_string(),
        format!("  LANGUAGE: {}", f("content_xray", "language")),
        format!("  GEAR:     {}", f("production_analysis", "camera_gear")),
        format!("  TONE:     {}", f("communication_profile", "voiceover_tone")),
        format!("  CTA:      {}", f("communication_profile", "cta_text")),
        String::new(),
        "2. STRATEGIC PLAYBOOK".to_string(),
    ];

    let rows = playbook_rows(result);
    if rows.is_empty() {
        lines.push("  (none)".to_string());
    }
    for row in rows {
        if let Some(worked) = row.worked {
            lines.push(format!("  + {worked}"));
        }
        if let Some(missed) = row.missed {
            lines.push(format!("  - {missed}"));
        }
    }

    lines.push(String::new());
    lines.push("3. NARRATIVE ARC".to_string());
    let scenes: Vec<(Scene, Option<String>)> = match grid {
        Some(grid) => scene_frames(result, grid)
            .into_iter()
            .map(|(scene, index)| {
                let thumb = index.map(|i| format!("  [frame #{} @ {}]", i, format_min_sec(grid.frame_time(i))));
                (scene, thumb)
            })
            .collect(),
        None => result.scenes().into_iter().map(|scene| (scene, None)).collect(),
    };
    if scenes.is_empty() {
        lines.push("  (none)".to_string());
    }
    for (scene, thumb) in scenes {
        lines.push(format!(
            "  {:<6} {:<8} {}{}",
            scene.timecode,
            scene.segment.to_uppercase(),
            scene.visual,
            thumb.unwrap_or_default()
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn or_dash(value: Option<String>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or_else(|| "-".to_string())
}
