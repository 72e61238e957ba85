//! 脾脏识别.
//!
//! 脾脏贴在体积右缘 (患者左侧), 候选从低分支层中挑 w_max 最大
//! (最靠右) 的一个. 灰度带比肝脏更窄也更暗, 生长截止时间较短.

use super::IdentifyContext;
use crate::forest::{Anatomy, NodeId, RegionStats, VolumeForest};
use crate::jobs::{Job, JobMonitor};
use crate::volume::VolumeShape;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 脾脏判别阈值.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpleenConfig {
    /// 候选所在分支层的上限 (闭, 下限恒为 1).
    pub max_candidate_layer: usize,

    /// 候选灰度均值下限 (闭).
    pub min_mean_grey: f64,

    /// 候选灰度均值上限 (闭).
    pub max_mean_grey: f64,

    /// 候选右缘至少达到的体积宽度比例.
    pub min_width_fraction: f64,

    /// 候选体素数下限, 乘节点自身跨越的切片数.
    pub min_voxels_per_slice: usize,

    /// 候选体素数上限, 乘节点自身跨越的切片数.
    pub max_voxels_per_slice: usize,

    /// 种子灰度下限 (开).
    pub seed_grey_floor: u8,

    /// 种子灰度上限 (开).
    pub seed_grey_ceiling: u8,

    /// 生长截止时间.
    pub stop_time: f64,
}

impl Default for SpleenConfig {
    fn default() -> Self {
        Self {
            max_candidate_layer: 2,
            min_mean_grey: 148.0,
            max_mean_grey: 175.0,
            min_width_fraction: 0.7,
            min_voxels_per_slice: 200,
            max_voxels_per_slice: 7000,
            seed_grey_floor: 140,
            seed_grey_ceiling: 170,
            stop_time: 5.0,
        }
    }
}

/// 脾脏识别作业.
pub struct SpleenIdentifier {
    context: IdentifyContext,
    config: SpleenConfig,
    monitor: Arc<JobMonitor>,
}

impl SpleenIdentifier {
    /// 构造作业.
    pub fn new(context: IdentifyContext, config: SpleenConfig) -> Self {
        Self {
            context,
            config,
            monitor: Arc::new(JobMonitor::new()),
        }
    }
}

impl Job for SpleenIdentifier {
    fn execute(&mut self) {
        self.monitor.set_status("Identifying spleen...");

        let width = self.context.volume().shape().2;
        let spine = self.context.stats_of(Anatomy::Vertebra);
        let candidates = self.context.filter_branches(|node, stats| {
            is_spleen_candidate(&self.config, width, &spine, node, stats)
        });

        let Some(best) = eastmost(self.context.forest(), &candidates) else {
            return;
        };

        let (floor, ceiling) = (self.config.seed_grey_floor, self.config.seed_grey_ceiling);
        let seeds = self
            .context
            .seed_positions(&[best], |g| floor < g && g < ceiling);
        self.monitor.increment();

        let grown = self.context.grow_at_time(&seeds, self.config.stop_time);
        self.monitor.increment();

        let selection = self.context.selection_from_positions(&grown);
        self.context.commit(Anatomy::Spleen, selection);
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

/// 脾脏候选判别.
fn is_spleen_candidate(
    config: &SpleenConfig,
    width: usize,
    spine: &RegionStats,
    node: NodeId,
    stats: &RegionStats,
) -> bool {
    let slices = stats.z_span() as usize;

    (1..=config.max_candidate_layer).contains(&node.layer)
        && config.min_mean_grey <= stats.mean_grey() && stats.mean_grey() <= config.max_mean_grey
        // 右缘伸到体积右侧.
        && f64::from(stats.w_max()) >= width as f64 * config.min_width_fraction
        // 后缘至少探到椎骨上缘.
        && stats.h_max() >= spine.h_min()
        && stats.voxel_count() >= config.min_voxels_per_slice * slices
        && stats.voxel_count() <= config.max_voxels_per_slice * slices
}

/// w_max 最大 (最靠右) 的候选. 同值取先遇到者.
fn eastmost(forest: &VolumeForest, candidates: &[NodeId]) -> Option<NodeId> {
    let mut best = None;
    let mut best_w_max = i32::MIN;
    for &node in candidates {
        let w_max = forest.stats_of(node).w_max();
        if w_max > best_w_max {
            best = Some(node);
            best_w_max = w_max;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identify::testkit::{context_of, flat_context};
    use ndarray::Array3;

    const WIDTH: usize = 40;

    fn spine_stats() -> RegionStats {
        RegionStats::synthetic(2000, (0, 1), (25, 34), (15, 24), 200.0, (0.5, 30.0, 20.0))
    }

    /// 右缘在 w = 36 (达到 0.7 * 40 = 28) 的参考脾脏.
    fn reference_stats() -> RegionStats {
        RegionStats::synthetic(1200, (0, 1), (20, 33), (29, 36), 160.0, (0.5, 26.5, 32.5))
    }

    #[test]
    fn test_spleen_accepts_reference_candidate() {
        let config = SpleenConfig::default();
        let spine = spine_stats();
        let stats = reference_stats();
        assert!(is_spleen_candidate(&config, WIDTH, &spine, NodeId::new(1, 0), &stats));
        assert!(is_spleen_candidate(&config, WIDTH, &spine, NodeId::new(2, 0), &stats));
    }

    #[test]
    fn test_spleen_layer_band() {
        let config = SpleenConfig::default();
        let stats = reference_stats();
        assert!(!is_spleen_candidate(&config, WIDTH, &spine_stats(), NodeId::new(3, 0), &stats));
    }

    #[test]
    fn test_spleen_must_reach_right_edge() {
        let config = SpleenConfig::default();
        // w_max 27 < 0.7 * 40 = 28: 不过; 恰为 28: 闭判别通过.
        let short =
            RegionStats::synthetic(1200, (0, 1), (20, 33), (20, 27), 160.0, (0.5, 26.5, 23.5));
        let at_limit =
            RegionStats::synthetic(1200, (0, 1), (20, 33), (21, 28), 160.0, (0.5, 26.5, 24.5));
        assert!(!is_spleen_candidate(&config, WIDTH, &spine_stats(), NodeId::new(1, 0), &short));
        assert!(is_spleen_candidate(&config, WIDTH, &spine_stats(), NodeId::new(1, 0), &at_limit));
    }

    #[test]
    fn test_spleen_grey_and_count_bounds() {
        let config = SpleenConfig::default();
        let spine = spine_stats();
        let dark =
            RegionStats::synthetic(1200, (0, 1), (20, 33), (29, 36), 147.9, (0.5, 26.5, 32.5));
        let bright =
            RegionStats::synthetic(1200, (0, 1), (20, 33), (29, 36), 175.1, (0.5, 26.5, 32.5));
        // 跨 2 切片: [400, 14000].
        let tiny =
            RegionStats::synthetic(399, (0, 1), (20, 33), (29, 36), 160.0, (0.5, 26.5, 32.5));
        let floor =
            RegionStats::synthetic(400, (0, 1), (20, 33), (29, 36), 148.0, (0.5, 26.5, 32.5));
        assert!(!is_spleen_candidate(&config, WIDTH, &spine, NodeId::new(1, 0), &dark));
        assert!(!is_spleen_candidate(&config, WIDTH, &spine, NodeId::new(1, 0), &bright));
        assert!(!is_spleen_candidate(&config, WIDTH, &spine, NodeId::new(1, 0), &tiny));
        assert!(is_spleen_candidate(&config, WIDTH, &spine, NodeId::new(1, 0), &floor));
    }

    #[test]
    fn test_spleen_must_reach_spine_top() {
        let config = SpleenConfig::default();
        let short =
            RegionStats::synthetic(1200, (0, 1), (10, 24), (29, 36), 160.0, (0.5, 17.0, 32.5));
        assert!(!is_spleen_candidate(&config, WIDTH, &spine_stats(), NodeId::new(1, 0), &short));
    }

    #[test]
    fn test_spleen_fails_without_spine_anchor() {
        let config = SpleenConfig::default();
        assert!(!is_spleen_candidate(
            &config,
            WIDTH,
            &RegionStats::default(),
            NodeId::new(1, 0),
            &reference_stats(),
        ));
    }

    #[test]
    fn test_eastmost_picks_max_w_max() {
        // (1, 2, 4) 体积: 组 1 的 w 界 [2, 3], 组 0 的 [0, 1].
        let greys = Array3::zeros((1, 2, 4));
        let gradient = Array3::zeros((1, 2, 4));
        let assignment = vec![0, 0, 1, 1, 2, 2, 3, 3];
        let context = context_of(greys, gradient, &assignment);

        let best = eastmost(
            context.forest(),
            &[NodeId::new(1, 0), NodeId::new(1, 1)],
        );
        assert_eq!(best, Some(NodeId::new(1, 1)));

        // 同值 (组 1 与组 3 的 w_max 都是 3) 取先遇到者.
        let tie = eastmost(
            context.forest(),
            &[NodeId::new(1, 3), NodeId::new(1, 1)],
        );
        assert_eq!(tie, Some(NodeId::new(1, 3)));

        assert_eq!(eastmost(context.forest(), &[]), None);
    }

    #[test]
    fn test_spleen_job_degrades_silently() {
        let context = flat_context(Array3::zeros((1, 4, 4)));
        let mut job = SpleenIdentifier::new(context.clone(), SpleenConfig::default());
        job.run();

        assert_eq!(job.progress(), job.length());
        assert!(!context.selection().lock().unwrap().contains(Anatomy::Spleen));
    }
}
