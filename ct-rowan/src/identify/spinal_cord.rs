//! 脊髓识别.
//!
//! 脊髓走行在椎管内, 判别直接以已提交的椎骨包围盒为锚: 候选必须严格
//! 落在椎骨的 w / h 界内, 且同样贯穿全部切片. 椎骨缺席时统计量为
//! 退化默认值, 内含判别必然失败, 本结构随之静默缺席.

use super::IdentifyContext;
use crate::forest::{Anatomy, RegionStats};
use crate::jobs::{Job, JobMonitor};
use crate::volume::VolumeShape;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 脊髓判别阈值.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpinalCordConfig {
    /// 候选灰度均值上限 (闭). 脊髓在窗位变换后明显暗于周围骨质.
    pub max_mean_grey: f64,

    /// 候选体素数下限, 乘体积切片数.
    pub min_voxels_per_slice: usize,

    /// 候选体素数上限, 乘体积切片数.
    pub max_voxels_per_slice: usize,

    /// 种子灰度下限 (开).
    pub seed_grey_floor: u8,

    /// 种子灰度上限 (开).
    pub seed_grey_ceiling: u8,

    /// 生长截止时间.
    pub stop_time: f64,
}

impl Default for SpinalCordConfig {
    fn default() -> Self {
        Self {
            max_mean_grey: 140.0,
            min_voxels_per_slice: 300,
            max_voxels_per_slice: 1000,
            seed_grey_floor: 60,
            seed_grey_ceiling: 140,
            stop_time: 10.0,
        }
    }
}

/// 脊髓识别作业.
pub struct SpinalCordIdentifier {
    context: IdentifyContext,
    config: SpinalCordConfig,
    monitor: Arc<JobMonitor>,
}

impl SpinalCordIdentifier {
    /// 构造作业.
    pub fn new(context: IdentifyContext, config: SpinalCordConfig) -> Self {
        Self {
            context,
            config,
            monitor: Arc::new(JobMonitor::new()),
        }
    }
}

impl Job for SpinalCordIdentifier {
    fn execute(&mut self) {
        self.monitor.set_status("Identifying spinal cord...");

        let depth = self.context.volume().shape().0;
        let spine = self.context.stats_of(Anatomy::Vertebra);
        let candidates = self
            .context
            .filter_branches(|_, stats| is_spinal_cord(&self.config, depth, &spine, stats));

        let (floor, ceiling) = (self.config.seed_grey_floor, self.config.seed_grey_ceiling);
        let seeds = self
            .context
            .seed_positions(&candidates, |g| floor < g && g < ceiling);
        self.monitor.increment();

        let grown = self.context.grow_at_time(&seeds, self.config.stop_time);
        self.monitor.increment();

        let selection = self.context.selection_from_positions(&grown);
        self.context.commit(Anatomy::SpinalCord, selection);
    }

    fn length(&self) -> usize {
        3
    }

    fn monitor(&self) -> &Arc<JobMonitor> {
        &self.monitor
    }

    fn set_monitor(&mut self, monitor: Arc<JobMonitor>) {
        self.monitor = monitor;
    }
}

/// 脊髓候选判别.
fn is_spinal_cord(
    config: &SpinalCordConfig,
    depth: usize,
    spine: &RegionStats,
    stats: &RegionStats,
) -> bool {
    let min_voxels = config.min_voxels_per_slice * depth;
    let max_voxels = config.max_voxels_per_slice * depth;

    // 严格在椎骨包围盒内部.
    spine.w_min() < stats.w_min() && stats.w_max() < spine.w_max()
        && spine.h_min() < stats.h_min() && stats.h_max() < spine.h_max()
        // 贯穿全部切片.
        && stats.z_min() == 0 && stats.z_max() == depth as i32 - 1
        && stats.mean_grey() <= config.max_mean_grey
        && stats.voxel_count() >= min_voxels && stats.voxel_count() <= max_voxels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identify::testkit::flat_context;
    use ndarray::Array3;

    const DEPTH: usize = 2;

    fn spine_stats() -> RegionStats {
        RegionStats::synthetic(2000, (0, 1), (25, 34), (15, 24), 200.0, (0.5, 30.0, 20.0))
    }

    fn reference_stats() -> RegionStats {
        RegionStats::synthetic(800, (0, 1), (28, 31), (18, 21), 100.0, (0.5, 29.5, 19.5))
    }

    #[test]
    fn test_cord_accepts_reference_candidate() {
        let config = SpinalCordConfig::default();
        assert!(is_spinal_cord(&config, DEPTH, &spine_stats(), &reference_stats()));
    }

    #[test]
    fn test_cord_must_be_strictly_inside_spine() {
        let config = SpinalCordConfig::default();
        let spine = spine_stats();
        // 与椎骨 w 下界重合.
        let touch_w =
            RegionStats::synthetic(800, (0, 1), (28, 31), (15, 21), 100.0, (0.5, 29.5, 18.0));
        // 与椎骨 h 上界重合.
        let touch_h =
            RegionStats::synthetic(800, (0, 1), (28, 34), (18, 21), 100.0, (0.5, 31.0, 19.5));
        assert!(!is_spinal_cord(&config, DEPTH, &spine, &touch_w));
        assert!(!is_spinal_cord(&config, DEPTH, &spine, &touch_h));
    }

    #[test]
    fn test_cord_requires_full_slice_span() {
        let config = SpinalCordConfig::default();
        let partial =
            RegionStats::synthetic(800, (1, 1), (28, 31), (18, 21), 100.0, (1.0, 29.5, 19.5));
        assert!(!is_spinal_cord(&config, DEPTH, &spine_stats(), &partial));
    }

    #[test]
    fn test_cord_grey_ceiling_inclusive() {
        let config = SpinalCordConfig::default();
        let at_limit =
            RegionStats::synthetic(800, (0, 1), (28, 31), (18, 21), 140.0, (0.5, 29.5, 19.5));
        let too_bright =
            RegionStats::synthetic(800, (0, 1), (28, 31), (18, 21), 140.1, (0.5, 29.5, 19.5));
        assert!(is_spinal_cord(&config, DEPTH, &spine_stats(), &at_limit));
        assert!(!is_spinal_cord(&config, DEPTH, &spine_stats(), &too_bright));
    }

    #[test]
    fn test_cord_count_bounds() {
        let config = SpinalCordConfig::default();
        let spine = spine_stats();
        let tiny =
            RegionStats::synthetic(599, (0, 1), (28, 31), (18, 21), 100.0, (0.5, 29.5, 19.5));
        let huge =
            RegionStats::synthetic(2001, (0, 1), (28, 31), (18, 21), 100.0, (0.5, 29.5, 19.5));
        let floor =
            RegionStats::synthetic(600, (0, 1), (28, 31), (18, 21), 100.0, (0.5, 29.5, 19.5));
        assert!(!is_spinal_cord(&config, DEPTH, &spine, &tiny));
        assert!(!is_spinal_cord(&config, DEPTH, &spine, &huge));
        assert!(is_spinal_cord(&config, DEPTH, &spine, &floor));
    }

    #[test]
    fn test_cord_fails_without_spine_anchor() {
        // 椎骨未提交: 锚定统计量为退化默认值, 内含判别不可能成立.
        let config = SpinalCordConfig::default();
        let absent = RegionStats::default();
        assert!(!is_spinal_cord(&config, DEPTH, &absent, &reference_stats()));
    }

    #[test]
    fn test_cord_job_degrades_silently() {
        let context = flat_context(Array3::zeros((1, 4, 4)));
        let mut job = SpinalCordIdentifier::new(context.clone(), SpinalCordConfig::default());
        job.run();

        assert_eq!(job.progress(), job.length());
        assert!(!context.selection().lock().unwrap().contains(Anatomy::SpinalCord));
    }
}
