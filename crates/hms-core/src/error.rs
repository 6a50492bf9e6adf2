//! 错误定义模块

use thiserror::Error;

/// 入院编排系统统一错误类型
#[derive(Error, Debug)]
pub enum HmsError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("分类器错误: {0}")]
    Classifier(String),

    #[error("分类器超时: {0}")]
    ClassifierTimeout(String),

    #[error("存储错误: {0}")]
    Store(String),

    #[error("并发预定冲突: {0}")]
    ReservationConflict(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl HmsError {
    /// 存储层错误对当前入院尝试是致命的，需要先补偿再上抛
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HmsError::Store(_) | HmsError::ReservationConflict(_) | HmsError::Internal(_)
        )
    }

    /// 分类器错误标记阶段失败，但流水线继续执行
    pub fn is_classifier(&self) -> bool {
        matches!(
            self,
            HmsError::Classifier(_) | HmsError::ClassifierTimeout(_)
        )
    }
}

/// 入院编排系统统一结果类型
pub type Result<T> = std::result::Result<T, HmsError>;
