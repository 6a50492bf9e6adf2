//! 配置管理
//!
//! 支持配置文件加载、HMS_ 前缀环境变量覆盖和启动前验证

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use hms_core::{BedCategory, Department};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HmsConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// 存储配置
    pub store: StoreConfig,
    /// 分类器配置
    pub classifier: ClassifierConfig,
    /// 工作流配置
    pub workflow: WorkflowConfig,
    /// 初始资源池
    pub roster: RosterConfig,
}

/// 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务名称
    pub name: String,
    /// 日志级别
    pub log_level: String,
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 后端类型
    pub backend: StoreBackend,
    /// 连接字符串（postgres 后端）
    pub database_url: Option<String>,
    /// 最大连接数
    pub max_connections: u32,
}

/// 分类器模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    /// 离线规则分类，确定性输出
    Rules,
    /// 托管 LLM 分类
    Llm,
}

/// 分类器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 分类模式
    pub mode: ClassifierMode,
    /// chat completions 端点
    pub endpoint: String,
    /// 模型名称
    pub model: String,
    /// 存放 API 密钥的环境变量名
    pub api_key_env: String,
    /// 单次调用超时（毫秒）
    pub timeout_ms: u64,
}

/// 工作流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// 医生挑选策略: random / first-available / round-robin
    pub selection_strategy: String,
}

/// 医生初始条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSeed {
    pub name: String,
    pub department: Department,
}

/// 床位初始条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedSeed {
    pub room: i32,
    pub category: BedCategory,
}

/// 初始资源池配置（memory 后端启动时载入）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub doctors: Vec<DoctorSeed>,
    pub beds: Vec<BedSeed>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "hms-server".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: 5,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::Rules,
            endpoint: "https://api.groq.com/openai/v1".to_string(),
            model: "deepseek-r1-distill-llama-70b".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_ms: 20_000,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            selection_strategy: "random".to_string(),
        }
    }
}

impl Default for HmsConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            classifier: ClassifierConfig::default(),
            workflow: WorkflowConfig::default(),
            roster: RosterConfig::default(),
        }
    }
}

impl HmsConfig {
    /// 加载配置：默认值 ← 配置文件 ← HMS_ 环境变量
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("HMS").separator("__"));

        let config: HmsConfig = builder
            .build()
            .context("failed to read configuration sources")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        config.validate()?;
        info!("Configuration loaded ({} backend)", match config.store.backend {
            StoreBackend::Memory => "memory",
            StoreBackend::Postgres => "postgres",
        });
        Ok(config)
    }

    /// 启动前验证
    pub fn validate(&self) -> Result<()> {
        if self.store.max_connections == 0 {
            anyhow::bail!("store.max_connections must be positive");
        }
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            anyhow::bail!("store.database_url is required for the postgres backend");
        }
        if self.classifier.timeout_ms == 0 {
            anyhow::bail!("classifier.timeout_ms must be positive");
        }
        if self.classifier.mode == ClassifierMode::Llm {
            if self.classifier.endpoint.is_empty() {
                anyhow::bail!("classifier.endpoint is required in llm mode");
            }
            if self.classifier.model.is_empty() {
                anyhow::bail!("classifier.model is required in llm mode");
            }
            if self.classifier.api_key_env.is_empty() {
                anyhow::bail!("classifier.api_key_env is required in llm mode");
            }
        }
        match self.workflow.selection_strategy.as_str() {
            "random" | "first-available" | "round-robin" => {}
            other => anyhow::bail!("unknown selection strategy: {}", other),
        }
        Ok(())
    }
}
