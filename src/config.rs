//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CARAVAN__*` 覆盖（双下划线表示嵌套，
//! 如 `CARAVAN__INTENT__ENABLE_FAST_LANE=false`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub intent: IntentSection,
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub stream: StreamSection,
}

/// [app] 段：应用名与上下文窗口
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 主 Prompt 中拼入的对话历史条数
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// 慢车道意图识别拼入的上下文条数
    #[serde(default = "default_intent_context_turns")]
    pub intent_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            history_window: default_history_window(),
            intent_context_turns: default_intent_context_turns(),
        }
    }
}

fn default_history_window() -> usize {
    5
}

fn default_intent_context_turns() -> usize {
    3
}

/// [intent] 段：快车道开关
#[derive(Debug, Clone, Deserialize)]
pub struct IntentSection {
    /// 关闭后所有输入都走 LLM 慢车道
    #[serde(default = "default_enable_fast_lane")]
    pub enable_fast_lane: bool,
}

impl Default for IntentSection {
    fn default() -> Self {
        Self {
            enable_fast_lane: default_enable_fast_lane(),
        }
    }
}

fn default_enable_fast_lane() -> bool {
    true
}

/// [tracker] 段：任务收集器行为
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSection {
    /// 子任务全部完成时是否逐级向上合拢父任务（false 时只合拢直接父任务）
    #[serde(default = "default_recursive_completion")]
    pub recursive_completion: bool,
    /// 通道型订阅者的队列容量，满后丢弃并告警
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            recursive_completion: default_recursive_completion(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_recursive_completion() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    64
}

/// [tools] 段：工具执行超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [stream] 段：流式输出
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    /// 流式回复时每段字符数（模拟打字效果）
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    6
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            intent: IntentSection::default(),
            tracker: TrackerSection::default(),
            tools: ToolsSection::default(),
            stream: StreamSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CARAVAN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CARAVAN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CARAVAN")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
