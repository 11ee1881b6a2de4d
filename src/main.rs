use adscope::{
    brief, extract_media,
    handler::{self, AppState},
    AnalysisClient, AnalysisService, AppConfig, ConfigLoader, OpenAiProvider, Overrides,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// 广告视频拆解工具 - 抽取关键帧和音频，交给多模态模型做创意分析
#[derive(Parser, Debug)]
#[command(name = "adscope")]
#[command(about = "广告视频拆解：抽帧、转写、生成创意策略分析", long_about = None)]
struct Args {
    /// 配置文件路径（可选，支持 .ini 格式）
    /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Web 服务模式：启动分析代理
    Serve {
        /// 监听地址（默认读取 ADSCOPE_BIND / PORT，否则 0.0.0.0:3001）
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// 抽取关键帧和音频，写出请求体 JSON
    Extract {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 输出 JSON 路径
        #[arg(short, long, default_value = "./payload.json")]
        output: PathBuf,

        /// 采样帧数
        #[arg(long)]
        frames: Option<usize>,

        /// 帧宽度（像素）
        #[arg(long)]
        width: Option<u32>,

        /// 音频最长秒数
        #[arg(long)]
        max_audio_seconds: Option<f64>,
    },
    /// 抽取后直接请求分析代理，输出结果 JSON 和文本简报
    Analyze {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 分析代理地址
        #[arg(long, default_value = "http://127.0.0.1:3001")]
        server: String,

        /// 结果 JSON 路径
        #[arg(short, long, default_value = "./analysis.json")]
        output: PathBuf,

        /// 使用综合接口 /api/analyze（默认拆分为视觉 + 音频两路）
        #[arg(long)]
        combined: bool,

        /// 采样帧数
        #[arg(long)]
        frames: Option<usize>,
    },
    /// 生成默认配置文件
    InitConfig {
        #[arg(short, long, default_value = "./adscope.ini")]
        output: PathBuf,
    },
}

fn init_tracing(config: &AppConfig) {
    // RUST_LOG 优先
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = match &args.command {
        Commands::Serve { bind } => Overrides {
            bind: bind.clone(),
            ..Overrides::default()
        },
        Commands::Extract {
            frames,
            width,
            max_audio_seconds,
            ..
        } => Overrides {
            frame_count: *frames,
            frame_width: *width,
            max_audio_seconds: *max_audio_seconds,
            ..Overrides::default()
        },
        Commands::Analyze { frames, .. } => Overrides {
            frame_count: *frames,
            ..Overrides::default()
        },
        Commands::InitConfig { .. } => Overrides::default(),
    };

    let config = ConfigLoader::load(args.config.as_deref(), overrides).context("加载配置失败")?;
    init_tracing(&config);

    match args.command {
        Commands::Serve { .. } => start_web_server(&config).await?,
        Commands::Extract { input, output, .. } => {
            let media = extract_media(&input, &config.extract)
                .await
                .context("抽取媒体失败")?;
            write_json(&output, &media.to_payload())?;
            println!("请求体已写入: {}", output.display());
        }
        Commands::Analyze {
            input,
            server,
            output,
            combined,
            ..
        } => {
            let media = extract_media(&input, &config.extract)
                .await
                .context("抽取媒体失败")?;
            let payload = media.to_payload();

            let client = AnalysisClient::new(
                server,
                Duration::from_secs(config.server.request_timeout_secs),
            )?;
            let result = if combined {
                client.analyze_combined(&payload).await
            } else {
                client.analyze_split(&payload).await
            }
            .context("分析失败")?;

            write_json(&output, &result)?;
            let frames_dir = output.parent().unwrap_or_else(|| Path::new(".")).join("frames");
            media.write_frames(&frames_dir)?;
            let grid = brief::SampleGrid {
                duration: media.duration(),
                frame_count: media.frames.frames.len(),
            };
            println!(
                "{}",
                brief::render_brief(&result, chrono::Local::now().date_naive(), Some(grid))
            );
            println!("缩略帧目录: {}\n", frames_dir.display());
            println!("{}", brief::clipboard_summary(&result));
            println!("\n分析结果已写入: {}", output.display());
        }
        Commands::InitConfig { output } => {
            ConfigLoader::create_default_config(&output)?;
            println!("默认配置已写入: {}", output.display());
        }
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("序列化 JSON 失败")?;
    std::fs::write(path, json).with_context(|| format!("写入文件失败: {}", path.display()))?;
    Ok(())
}

async fn start_web_server(config: &AppConfig) -> Result<()> {
    // 凭证缺失时直接退出，不等到第一个请求
    let provider = OpenAiProvider::from_env(&config.server)?;
    let service = Arc::new(AnalysisService::new(Arc::new(provider), &config.server));
    let app = handler::router(AppState {
        service,
        body_limit_mb: config.server.body_limit_mb,
    });

    let bind = config.server.bind.as_str();
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("绑定地址失败: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("可用端点:");
    tracing::info!("  • 健康检查: GET  http://{}/health", bind);
    tracing::info!("  • 综合分析: POST http://{}/api/analyze", bind);
    tracing::info!("  • 视觉分析: POST http://{}/api/visuals", bind);
    tracing::info!("  • 音频分析: POST http://{}/api/audio", bind);
    tracing::info!("  • 语音转写: POST http://{}/api/transcribe", bind);
    tracing::info!("  • 请求体上限: {}MB", config.server.body_limit_mb);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    axum::serve(listener, app)
        .await
        .context("启动服务器失败")?;

    Ok(())
}
