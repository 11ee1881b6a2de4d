use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

/// 服务端配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 监听地址
    pub bind: String,
    /// 请求体上限（MB），需容纳 base64 编码的帧和音频
    pub body_limit_mb: usize,
    /// OpenAI 兼容接口地址
    pub api_base_url: String,
    /// 对话补全模型
    pub chat_model: String,
    /// 语音转写模型
    pub transcription_model: String,
    /// 单次模型请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3001".to_string(),
            body_limit_mb: 50,
            api_base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            transcription_model: "whisper-1".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// MB 换算为字节，超出 usize 时取上限
pub fn megabytes(mb: usize) -> usize {
    mb.saturating_mul(1024 * 1024)
}

impl ServerConfig {
    pub fn body_limit_bytes(&self) -> usize {
        megabytes(self.body_limit_mb)
    }
}

/// 媒体提取配置
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// 采样帧数
    pub frame_count: usize,
    /// 缩放后的帧宽度（像素），高度按比例计算
    pub frame_width: u32,
    /// JPEG 质量（1-100）
    pub jpeg_quality: u8,
    /// 音频最长保留秒数
    pub max_audio_seconds: f64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            frame_count: 8,
            frame_width: 256,
            jpeg_quality: 30,
            max_audio_seconds: 30.0,
        }
    }
}

/// 全部配置
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub extract: ExtractConfig,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub frame_count: Option<usize>,
    pub frame_width: Option<u32>,
    pub max_audio_seconds: Option<f64>,
}

/// 从文件或环境变量读到的原始值，全部可选
#[derive(Debug, Clone, Default)]
struct PartialConfig {
    bind: Option<String>,
    body_limit_mb: Option<usize>,
    api_base_url: Option<String>,
    chat_model: Option<String>,
    transcription_model: Option<String>,
    request_timeout_secs: Option<u64>,
    frame_count: Option<usize>,
    frame_width: Option<u32>,
    jpeg_quality: Option<u8>,
    max_audio_seconds: Option<f64>,
    log_level: Option<String>,
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load(config_file: Option<&Path>, overrides: Overrides) -> Result<AppConfig> {
        // 显式指定的配置文件必须能读取；默认位置找不到则忽略
        let file = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_from_default_locations().unwrap_or_default(),
        };
        let env = Self::load_from_env();

        let defaults = AppConfig::default();
        let server = ServerConfig {
            bind: overrides
                .bind
                .or(env.bind)
                .or(file.bind)
                .unwrap_or(defaults.server.bind),
            body_limit_mb: env
                .body_limit_mb
                .or(file.body_limit_mb)
                .unwrap_or(defaults.server.body_limit_mb),
            api_base_url: env
                .api_base_url
                .or(file.api_base_url)
                .unwrap_or(defaults.server.api_base_url),
            chat_model: env
                .chat_model
                .or(file.chat_model)
                .unwrap_or(defaults.server.chat_model),
            transcription_model: env
                .transcription_model
                .or(file.transcription_model)
                .unwrap_or(defaults.server.transcription_model),
            request_timeout_secs: env
                .request_timeout_secs
                .or(file.request_timeout_secs)
                .unwrap_or(defaults.server.request_timeout_secs),
        };

        let extract = ExtractConfig {
            frame_count: overrides
                .frame_count
                .or(env.frame_count)
                .or(file.frame_count)
                .unwrap_or(defaults.extract.frame_count)
                .max(1),
            frame_width: overrides
                .frame_width
                .or(env.frame_width)
                .or(file.frame_width)
                .unwrap_or(defaults.extract.frame_width)
                .max(1),
            jpeg_quality: env
                .jpeg_quality
                .or(file.jpeg_quality)
                .unwrap_or(defaults.extract.jpeg_quality)
                .clamp(1, 100),
            max_audio_seconds: overrides
                .max_audio_seconds
                .or(env.max_audio_seconds)
                .or(file.max_audio_seconds)
                .unwrap_or(defaults.extract.max_audio_seconds),
        };

        Ok(AppConfig {
            server,
            extract,
            log_level: env.log_level.or(file.log_level),
        })
    }

    /// 从环境变量加载配置
    fn load_from_env() -> PartialConfig {
        fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            env::var(key).ok().and_then(|v| v.trim().parse().ok())
        }
        fn text(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        PartialConfig {
            // 平台通常只注入端口
            bind: text("ADSCOPE_BIND").or_else(|| text("PORT").map(|port| format!("0.0.0.0:{}", port))),
            body_limit_mb: parsed("ADSCOPE_BODY_LIMIT_MB"),
            api_base_url: text("ADSCOPE_API_BASE_URL"),
            chat_model: text("ADSCOPE_CHAT_MODEL"),
            transcription_model: text("ADSCOPE_TRANSCRIPTION_MODEL"),
            request_timeout_secs: parsed("ADSCOPE_REQUEST_TIMEOUT_SECS"),
            frame_count: parsed("ADSCOPE_FRAME_COUNT"),
            frame_width: parsed("ADSCOPE_FRAME_WIDTH"),
            jpeg_quality: parsed("ADSCOPE_JPEG_QUALITY"),
            max_audio_seconds: parsed("ADSCOPE_MAX_AUDIO_SECONDS"),
            log_level: text("ADSCOPE_LOG_LEVEL"),
        }
    }

    /// 从INI配置文件加载配置
    fn load_from_file(config_path: &Path) -> Result<PartialConfig> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let mut ini = configparser::ini::Ini::new();
        ini.load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;

        // 先读指定节，没有则回退到 [DEFAULT]
        fn get(ini: &configparser::ini::Ini, section: &str, key: &str) -> Option<String> {
            ini.get(section, key)
                .or_else(|| ini.get("DEFAULT", key))
                .filter(|v| !v.trim().is_empty())
        }
        fn parsed<T: std::str::FromStr>(ini: &configparser::ini::Ini, section: &str, key: &str) -> Option<T> {
            get(ini, section, key).and_then(|v| v.trim().parse().ok())
        }

        Ok(PartialConfig {
            bind: get(&ini, "server", "bind"),
            body_limit_mb: parsed(&ini, "server", "body_limit_mb"),
            api_base_url: get(&ini, "server", "api_base_url"),
            chat_model: get(&ini, "server", "chat_model"),
            transcription_model: get(&ini, "server", "transcription_model"),
            request_timeout_secs: parsed(&ini, "server", "request_timeout_secs"),
            frame_count: parsed(&ini, "extract", "frame_count"),
            frame_width: parsed(&ini, "extract", "frame_width"),
            jpeg_quality: parsed(&ini, "extract", "jpeg_quality"),
            max_audio_seconds: parsed(&ini, "extract", "max_audio_seconds"),
            log_level: get(&ini, "logging", "level"),
        })
    }

    /// 从默认位置加载配置文件
    fn load_from_default_locations() -> Result<PartialConfig> {
        // 1. 当前目录的 adscope.ini
        // 2. 当前目录的 .adscope.ini
        // 3. 用户主目录的 .adscope.ini
        // 4. /etc/adscope.ini
        let mut candidates = vec![PathBuf::from("adscope.ini"), PathBuf::from(".adscope.ini")];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".adscope.ini"));
        }
        candidates.push(PathBuf::from("/etc/adscope.ini"));

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_file(&candidate);
            }
        }

        Err(anyhow::anyhow!("未找到配置文件"))
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let server = ServerConfig::default();
        let extract = ExtractConfig::default();

        let mut ini = configparser::ini::Ini::new();
        ini.set("server", "bind", Some(server.bind));
        ini.set("server", "body_limit_mb", Some(server.body_limit_mb.to_string()));
        ini.set("server", "api_base_url", Some(server.api_base_url));
        ini.set("server", "chat_model", Some(server.chat_model));
        ini.set("server", "transcription_model", Some(server.transcription_model));
        ini.set("server", "request_timeout_secs", Some(server.request_timeout_secs.to_string()));
        ini.set("extract", "frame_count", Some(extract.frame_count.to_string()));
        ini.set("extract", "frame_width", Some(extract.frame_width.to_string()));
        ini.set("extract", "jpeg_quality", Some(extract.jpeg_quality.to_string()));
        ini.set("extract", "max_audio_seconds", Some(extract.max_audio_seconds.to_string()));
        ini.set("logging", "level", Some("info".to_string()));

        ini.write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}
