//! # HMS Core
//!
//! 入院编排系统的核心模块，提供基础数据结构、错误定义、优先级评分和通用工具。

pub mod error;
pub mod models;
pub mod priority;
pub mod utils;

pub use error::{HmsError, Result};
pub use models::*;
