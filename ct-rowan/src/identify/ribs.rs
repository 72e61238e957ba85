//! 肋骨识别.
//!
//! 肋骨成对分布在椎骨两侧, 不做最优候选挑选, 所有通过判别的节点一起
//! 选种生长. 生长结果在叶子层重新做连通分量分解, 丢弃过小的碎片
//! (多为被波前顺带捕获的散点), 其余合并提交.

use super::IdentifyContext;
use crate::forest::{Anatomy, NodeId, RegionStats, Selection};
use crate::jobs::{Job, JobMonitor};
use crate::volume::VolumeShape;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 肋骨判别阈值.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RibsConfig {
    /// 候选灰度均值下限 (闭).
    pub min_mean_grey: f64,

    /// 候选体素数下限, 乘体积切片数.
    pub min_voxels_per_slice: usize,

    /// 候选体素数上限, 乘体积切片数.
    pub max_voxels_per_slice: usize,

    /// 种子灰度下限 (开). 单侧判别, 饱和白体素始终入选.
    pub seed_grey_floor: u8,

    /// 生长截止时间.
    pub stop_time: f64,

    /// 后处理中保留连通分量的体素数下限, 乘体积切片数.
    pub min_component_voxels_per_slice: usize,
}

impl Default for RibsConfig {
    fn default() -> Self {
        Self {
            min_mean_grey: 200.0,
            min_voxels_per_slice: 90,
            max_voxels_per_slice: 500,
            seed_grey_floor: 200,
            stop_time: 6.0,
            min_component_voxels_per_slice: 40,
        }
    }
}

/// 肋骨识别作业.
pub struct RibsIdentifier {
    context: IdentifyContext,
    config: RibsConfig,
    monitor: Arc<JobMonitor>,
}

impl RibsIdentifier {
    /// 构造作业.
    pub fn new(context: IdentifyContext, config: RibsConfig) -> Self {
        Self {
            context,
            config,
            monitor: Arc::new(JobMonitor::new()),
        }
    }
}

impl Job for RibsIdentifier {
    fn execute(&mut self) {
        self.monitor.set_status("Identifying ribs...");

        let depth = self.context.volume().shape().0;
        let spine = self.context.stats_of(Anatomy::Vertebra);
        let candidates = self
            .context
            .filter_branches(|_, stats| is_rib(&self.config, depth, &spine, stats));

        let floor = self.config.seed_grey_floor;
        let seeds = self.context.seed_positions(&candidates, |g| g > floor);
        self.monitor.increment();

        let grown = self.context.grow_at_time(&seeds, self.config.stop_time);
        self.monitor.increment();

        let leaves: Vec<usize> = grown
            .iter()
            // 形状体素由界内传播产生, 可直接 unwrap.
            .map(|pos| self.context.forest().leaf_of_position(pos).unwrap())
            .collect();
        let components = self.context.forest().find_connected_components(&leaves, 0);
        let min_voxels = self.config.min_component_voxels_per_slice * depth;
        let selection = keep_large_components(components, min_voxels);
        self.context.commit(Anatomy::Ribs, selection);
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

/// 肋骨候选判别.
fn is_rib(config: &RibsConfig, depth: usize, spine: &RegionStats, stats: &RegionStats) -> bool {
    let min_voxels = config.min_voxels_per_slice * depth;
    let max_voxels = config.max_voxels_per_slice * depth;
    let spine_w = spine.centroid().2;

    stats.mean_grey() >= config.min_mean_grey
        && stats.voxel_count() >= min_voxels && stats.voxel_count() <= max_voxels
        // 整体落在椎骨质心 w 向的某一侧.
        && (f64::from(stats.w_max()) < spine_w || f64::from(stats.w_min()) > spine_w)
        // 起始高度不低于椎骨后缘.
        && stats.h_min() < spine.h_max()
}

/// 丢弃体素数不足的连通分量, 其余叶子并入同一选择.
fn keep_large_components(components: Vec<Vec<usize>>, min_voxels: usize) -> Selection {
    let mut selection = Selection::new();
    for component in components {
        if component.len() >= min_voxels {
            for leaf in component {
                selection.select(NodeId::leaf(leaf));
            }
        }
    }
    selection
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

    #[test]
    fn test_rib_accepts_both_sides() {
        let config = RibsConfig::default();
        let spine = spine_stats();
        let left = RegionStats::synthetic(300, (0, 1), (10, 30), (5, 12), 220.0, (0.5, 20.0, 8.5));
        let right =
            RegionStats::synthetic(300, (0, 1), (10, 30), (28, 35), 220.0, (0.5, 20.0, 31.5));
        assert!(is_rib(&config, DEPTH, &spine, &left));
        assert!(is_rib(&config, DEPTH, &spine, &right));
    }

    #[test]
    fn test_rib_rejects_straddling_spine_centroid() {
        let config = RibsConfig::default();
        let straddling =
            RegionStats::synthetic(300, (0, 1), (10, 30), (15, 25), 220.0, (0.5, 20.0, 20.0));
        assert!(!is_rib(&config, DEPTH, &spine_stats(), &straddling));
    }

    #[test]
    fn test_rib_must_start_above_spine_rear() {
        let config = RibsConfig::default();
        // h_min 与椎骨 h_max 重合: 严格判别不过.
        let level = RegionStats::synthetic(300, (0, 1), (34, 38), (5, 12), 220.0, (0.5, 36.0, 8.5));
        let above = RegionStats::synthetic(300, (0, 1), (33, 38), (5, 12), 220.0, (0.5, 35.5, 8.5));
        assert!(!is_rib(&config, DEPTH, &spine_stats(), &level));
        assert!(is_rib(&config, DEPTH, &spine_stats(), &above));
    }

    #[test]
    fn test_rib_grey_and_count_bounds() {
        let config = RibsConfig::default();
        let spine = spine_stats();
        let dim = RegionStats::synthetic(300, (0, 1), (10, 30), (5, 12), 199.9, (0.5, 20.0, 8.5));
        let tiny = RegionStats::synthetic(179, (0, 1), (10, 30), (5, 12), 220.0, (0.5, 20.0, 8.5));
        let huge = RegionStats::synthetic(1001, (0, 1), (10, 30), (5, 12), 220.0, (0.5, 20.0, 8.5));
        let floor = RegionStats::synthetic(180, (0, 1), (10, 30), (5, 12), 200.0, (0.5, 20.0, 8.5));
        assert!(!is_rib(&config, DEPTH, &spine, &dim));
        assert!(!is_rib(&config, DEPTH, &spine, &tiny));
        assert!(!is_rib(&config, DEPTH, &spine, &huge));
        assert!(is_rib(&config, DEPTH, &spine, &floor));
    }

    #[test]
    fn test_rib_fails_without_spine_anchor() {
        // 退化锚定: 质心 (0,0,0) 让单侧判别侥幸通过,
        // 但 h_min < i32::MIN 永不成立.
        let config = RibsConfig::default();
        let right =
            RegionStats::synthetic(300, (0, 1), (10, 30), (28, 35), 220.0, (0.5, 20.0, 31.5));
        assert!(!is_rib(&config, DEPTH, &RegionStats::default(), &right));
    }

    #[test]
    fn test_keep_large_components_filters_fragments() {
        let components = vec![vec![1, 2, 3], vec![7], vec![10, 11]];
        let kept = keep_large_components(components, 2);
        assert_eq!(kept.len(), 5);
        assert!(kept.contains(NodeId::leaf(1)));
        assert!(kept.contains(NodeId::leaf(11)));
        assert!(!kept.contains(NodeId::leaf(7)));

        let none = keep_large_components(vec![vec![1, 2, 3]], 4);
        assert!(none.is_empty());
    }

    #[test]
    fn test_ribs_job_degrades_silently() {
        let context = flat_context(Array3::zeros((1, 4, 4)));
        let mut job = RibsIdentifier::new(context.clone(), RibsConfig::default());
        job.run();

        assert_eq!(job.progress(), job.length());
        assert!(!context.selection().lock().unwrap().contains(Anatomy::Ribs));
    }
}
