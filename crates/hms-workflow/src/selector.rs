//! 医生挑选策略
//!
//! 候选医生都符合条件时如何取舍是可注入的策略：默认在候选中均匀
//! 随机（源系统行为），测试和回放场景可以换成确定性的策略。

use hms_core::DoctorRecord;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 医生挑选策略接口
pub trait DoctorSelector: Send + Sync {
    /// 从候选列表中挑选一位医生，列表为空时返回 None
    fn select<'a>(&self, candidates: &'a [DoctorRecord]) -> Option<&'a DoctorRecord>;

    /// 策略名称，用于日志和配置
    fn name(&self) -> &'static str;
}

/// 均匀随机挑选
#[derive(Debug, Default)]
pub struct RandomSelector;

impl DoctorSelector for RandomSelector {
    fn select<'a>(&self, candidates: &'a [DoctorRecord]) -> Option<&'a DoctorRecord> {
        candidates.choose(&mut rand::thread_rng())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// 取候选列表第一位（列表按名字排序，结果可复现）
#[derive(Debug, Default)]
pub struct FirstAvailableSelector;

impl DoctorSelector for FirstAvailableSelector {
    fn select<'a>(&self, candidates: &'a [DoctorRecord]) -> Option<&'a DoctorRecord> {
        candidates.first()
    }

    fn name(&self) -> &'static str {
        "first-available"
    }
}

/// 轮转挑选，把负载摊开到同科室的医生上
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursor: AtomicUsize,
}

impl DoctorSelector for RoundRobinSelector {
    fn select<'a>(&self, candidates: &'a [DoctorRecord]) -> Option<&'a DoctorRecord> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.get(index)
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_core::Department;

    fn candidates() -> Vec<DoctorRecord> {
        vec![
            DoctorRecord::new("Dr. Alvarez", Department::Cardiology),
            DoctorRecord::new("Dr. Bennett", Department::Cardiology),
            DoctorRecord::new("Dr. Chen", Department::Cardiology),
        ]
    }

    #[test]
    fn test_selectors_return_none_on_empty() {
        assert!(RandomSelector.select(&[]).is_none());
        assert!(FirstAvailableSelector.select(&[]).is_none());
        assert!(RoundRobinSelector::default().select(&[]).is_none());
    }

    #[test]
    fn test_random_selects_from_candidates() {
        let list = candidates();
        let picked = RandomSelector.select(&list).unwrap();
        assert!(list.iter().any(|d| d.id == picked.id));
    }

    #[test]
    fn test_first_available_is_deterministic() {
        let list = candidates();
        assert_eq!(FirstAvailableSelector.select(&list).unwrap().name, "Dr. Alvarez");
        assert_eq!(FirstAvailableSelector.select(&list).unwrap().name, "Dr. Alvarez");
    }

    #[test]
    fn test_round_robin_cycles() {
        let list = candidates();
        let selector = RoundRobinSelector::default();
        let names: Vec<&str> = (0..4)
            .map(|_| selector.select(&list).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["Dr. Alvarez", "Dr. Bennett", "Dr. Chen", "Dr. Alvarez"]);
    }
}
