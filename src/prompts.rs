//! 发给模型服务的提示词模板
//!
//! 提示词属于服务商配置，内容随模型调整；代码只依赖其中约定的 JSON 结构。

use crate::payload::Frame;

/// 转写提示：引导模型优先识别南印度语言
pub const TRANSCRIPTION_HINT: &str =
    "The audio is in Kannada, Tamil, or Telugu. Transcribe the regional language exactly as spoken.";

/// 综合分析（画面 + 转写文本）
pub fn combined_system_prompt(transcript: &str) -> String {
    format!(
        r##"You are a veteran creative director reviewing a video advertisement.
Base your analysis on the attached frames and on this transcript: "{transcript}".

Rules:
1. Language: if the transcript is Kannada, Tamil, Telugu or Malayalam, name it precisely. Never default to Hindi; when unsure answer "South Indian Regional".
2. Camera gear: vertical 9:16 footage is "Smartphone (UGC)".
3. Playbook: 6-8 entries in "brand_takeaways", 4-6 entries in "critique.missed_opportunities".
4. Timeline: 6-8 key moments in "scene_by_scene".

Reply with JSON only:
{{
  "meta": {{ "product_name": "string", "brand_name": "string", "industry_vertical": "string", "ad_type": "string", "quality_score": 1, "hero_insight": "string" }},
  "content_xray": {{ "ethnicity": "string", "script": "string", "audio_desc": "string", "text_overlay": "string", "language": "string" }},
  "production_analysis": {{ "camera_gear": "string", "color_grade": "string", "editing_pace": "string" }},
  "creative_intelligence": {{ "creator_persona": "string", "visual_style": "string", "color_palette": ["#RRGGBB"], "visual_density": "Minimalist | Balanced | Cluttered" }},
  "communication_profile": {{ "voiceover_tone": "string", "cta_type": "string", "cta_text": "string", "psychological_triggers": ["string"] }},
  "strategy": {{ "one_liner": "string", "hook_tactic": "string", "winning_factor": "string" }},
  "critique": {{ "missed_opportunities": ["string"] }},
  "brand_takeaways": ["string"],
  "scene_by_scene": [ {{ "timecode": "0:00", "segment": "Hook", "visual": "string", "audio": "string" }} ]
}}"##
    )
}

/// 纯视觉分析
pub const VISUALS_SYSTEM_PROMPT: &str = r##"You are a visual analysis engine for video advertisements.
Judge only technical and production signals visible in the frames.

Rules:
1. Camera gear: vertical 9:16 is "Smartphone (UGC)", horizontal or cinematic is "Pro".
2. Color: describe the grade, e.g. "Vibrant", "Muted", "B&W".
3. Scenes: break the visual narrative into segments.

Reply with JSON only:
{
  "production_analysis": { "camera_gear": "string", "color_grade": "string", "editing_pace": "string" },
  "creative_intelligence": { "creator_persona": "string", "visual_style": "string", "color_palette": ["#RRGGBB"], "visual_density": "string" },
  "content_xray_visuals": { "ethnicity": "string", "text_overlay": "string" },
  "scene_by_scene": [ { "timecode": "0:00", "segment": "Hook | Middle | End", "visual": "string" } ]
}"##;

/// 基于转写文本的策略分析
pub fn audio_system_prompt(script: &str) -> String {
    format!(
        r#"Analyze this advertisement script for strategy and language.
Script: "{script}"

Rules:
1. Be concise: short, punchy bullet points.
2. Language: identify Kannada, Tamil or Telugu when present.
3. Playbook: 4-5 high-impact points per list.

Reply with JSON only:
{{
  "meta": {{ "product_name": "string", "brand_name": "string", "ad_type": "string", "quality_score": 1, "hero_insight": "string" }},
  "content_xray_audio": {{ "language": "string", "script": "string", "audio_desc": "string" }},
  "communication_profile": {{ "voiceover_tone": "string", "cta_type": "string", "cta_text": "string", "psychological_triggers": ["string"] }},
  "strategy": {{ "one_liner": "string", "hook_tactic": "string", "winning_factor": "string" }},
  "critique": {{ "missed_opportunities": ["string"] }},
  "brand_takeaways": ["string"]
}}"#
    )
}

/// 把帧时间码拼成一条用户消息，要求模型按顺序对应
pub fn timestamps_message(frames: &[Frame]) -> String {
    let stamps: Vec<&str> = frames.iter().map(|f| f.timestamp.as_str()).collect();
    format!("Timestamps: {}. Map scenes to these strictly.", stamps.join(", "))
}
