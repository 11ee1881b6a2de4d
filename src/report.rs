use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// 完整的分析结果
///
/// 各区块的内容由模型决定，区块内部原样保留；缺失的区块为 null，序列化时省略。
/// 未知的顶层键放在 `extra` 里，序列化时原样输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content_xray: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub production_analysis: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub creative_intelligence: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub communication_profile: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub strategy: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub critique: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub brand_takeaways: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub scene_by_scene: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 视觉分支（`/api/visuals`）负责的区块
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionPartial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative_intelligence: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_xray_visuals: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_by_scene: Option<Value>,
}

/// 音频分支（`/api/audio`）负责的区块
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioPartial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_xray_audio: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_profile: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_takeaways: Option<Value>,
}

/// 音频分支没有给出 `meta` 时使用的占位
pub fn default_meta() -> Value {
    json!({ "product_name": "Ad Analysis", "quality_score": 7 })
}

/// 合并两个分支的结果
///
/// 字段归属：
/// - 音频：`meta`、`communication_profile`、`strategy`、`critique`、`brand_takeaways`
/// - 视觉：`production_analysis`、`creative_intelligence`、`scene_by_scene`
/// - 共有：`content_xray` = 视觉的 `content_xray_visuals`，再由音频的 `content_xray_audio` 覆盖同名键
///
/// 两个 `content_xray_*` 只有是对象时才参与合并，其他类型直接忽略
pub fn merge_partials(vision: VisionPartial, audio: AudioPartial) -> AnalysisResult {
    let mut content_xray = Map::new();
    for part in [vision.content_xray_visuals, audio.content_xray_audio].into_iter().flatten() {
        if let Value::Object(fields) = part {
            content_xray.extend(fields);
        }
    }

    AnalysisResult {
        meta: audio.meta.unwrap_or_else(default_meta),
        content_xray: Value::Object(content_xray),
        production_analysis: vision.production_analysis.unwrap_or_else(empty_object),
        creative_intelligence: vision.creative_intelligence.unwrap_or_else(empty_object),
        scene_by_scene: vision.scene_by_scene.unwrap_or_else(empty_array),
        communication_profile: audio.communication_profile.unwrap_or_else(empty_object),
        strategy: audio.strategy.unwrap_or_else(empty_object),
        critique: audio.critique.unwrap_or_else(empty_object),
        brand_takeaways: audio.brand_takeaways.unwrap_or_else(empty_array),
        extra: Map::new(),
    }
}

/// 去掉 Markdown 代码块标记（```json / ```）后解析 JSON
pub fn parse_json_reply(raw: &str) -> Result<Value, serde_json::Error> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    serde_json::from_str(cleaned.trim())
}

/// 场景时间线中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub timecode: String,
    pub segment: String,
    pub visual: String,
    pub audio: Option<String>,
}

impl AnalysisResult {
    /// 读取 `section.key` 的字符串值；非字符串的标量按 JSON 文本输出
    pub fn field(&self, section: &str, key: &str) -> Option<String> {
        let section = match section {
            "meta" => &self.meta,
            "content_xray" => &self.content_xray,
            "production_analysis" => &self.production_analysis,
            "creative_intelligence" => &self.creative_intelligence,
            "communication_profile" => &self.communication_profile,
            "strategy" => &self.strategy,
            "critique" => &self.critique,
            other => self.extra.get(other)?,
        };
        match section.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn takeaways(&self) -> Vec<String> {
        string_list(&self.brand_takeaways)
    }

    pub fn missed_opportunities(&self) -> Vec<String> {
        self.critique
            .get("missed_opportunities")
            .map(string_list)
            .unwrap_or_default()
    }

    pub fn scenes(&self) -> Vec<Scene> {
        let Some(items) = self.scene_by_scene.as_array() else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);
                Some(Scene {
                    timecode: text("timecode")?,
                    segment: text("segment").unwrap_or_default(),
                    visual: text("visual").unwrap_or_default(),
                    audio: text("audio").filter(|a| !a.is_empty()),
                })
            })
            .collect()
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}
