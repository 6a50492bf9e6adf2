//! 通用工具函数

use chrono::{DateTime, Utc};

/// 将时间格式化为毫秒精度 (HH:MM:SS.mmm)，用于事件日志和对外摘要
pub fn format_time_ms(t: &DateTime<Utc>) -> String {
    t.format("%H:%M:%S%.3f").to_string()
}

/// 四舍五入保留一位小数
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
