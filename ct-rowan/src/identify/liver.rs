//! 肝脏识别.
//!
//! 肝脏是体积左侧最大的软组织团块. 候选限定在最低分支层 (更高层的
//! 节点普遍伸展过度), 从中取 w_min 最小 (最靠左) 的一个作为种子区域.
//! 软组织与邻近器官灰度接近, 固定时间截止容易过度生长, 因此生长改用
//! 逐段扫描的首次停止准则.

use super::IdentifyContext;
use crate::forest::{Anatomy, NodeId, RegionStats, VolumeForest};
use crate::jobs::{Job, JobMonitor};
use crate::volume::VolumeShape;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 肝脏判别阈值.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LiverConfig {
    /// 候选所在的分支层.
    pub candidate_layer: usize,

    /// 候选体素数下限, 乘节点自身跨越的切片数.
    pub min_voxels_per_slice: usize,

    /// 候选灰度均值下限 (闭).
    pub min_mean_grey: f64,

    /// 候选灰度均值上限 (闭).
    pub max_mean_grey: f64,

    /// 种子灰度下限 (开).
    pub seed_grey_floor: u8,

    /// 种子灰度上限 (开).
    pub seed_grey_ceiling: u8,

    /// 首次停止扫描的每段新增体素数阈值, 乘体积切片数.
    pub stop_voxels_per_slice: usize,
}

impl Default for LiverConfig {
    fn default() -> Self {
        Self {
            candidate_layer: 1,
            min_voxels_per_slice: 700,
            min_mean_grey: 145.0,
            max_mean_grey: 190.0,
            seed_grey_floor: 160,
            seed_grey_ceiling: 180,
            stop_voxels_per_slice: 3000,
        }
    }
}

/// 肝脏识别作业.
pub struct LiverIdentifier {
    context: IdentifyContext,
    config: LiverConfig,
    monitor: Arc<JobMonitor>,
}

impl LiverIdentifier {
    /// 构造作业.
    pub fn new(context: IdentifyContext, config: LiverConfig) -> Self {
        Self {
            context,
            config,
            monitor: Arc::new(JobMonitor::new()),
        }
    }
}

impl Job for LiverIdentifier {
    fn execute(&mut self) {
        self.monitor.set_status("Identifying liver...");

        let (depth, _, width) = self.context.volume().shape();
        let candidates = self
            .context
            .filter_branches(|node, stats| is_liver_candidate(&self.config, width, node, stats));
        self.monitor.increment();

        let Some(best) = westmost(self.context.forest(), &candidates) else {
            return;
        };
        self.monitor.increment();

        let (floor, ceiling) = (self.config.seed_grey_floor, self.config.seed_grey_ceiling);
        let seeds = self
            .context
            .seed_positions(&[best], |g| floor < g && g < ceiling);
        self.monitor.increment();

        let threshold = self.config.stop_voxels_per_slice * depth;
        let grown = self.context.grow_at_first_stop(&seeds, threshold);
        self.monitor.increment();

        let selection = self.context.selection_from_positions(&grown);
        self.monitor.increment();

        self.context.commit(Anatomy::Liver, selection);
    }

    fn length(&self) -> usize {
        6
    }

    fn monitor(&self) -> &Arc<JobMonitor> {
        &self.monitor
    }

    fn set_monitor(&mut self, monitor: Arc<JobMonitor>) {
        self.monitor = monitor;
    }
}

/// 肝脏候选判别.
fn is_liver_candidate(
    config: &LiverConfig,
    width: usize,
    node: NodeId,
    stats: &RegionStats,
) -> bool {
    let slices = stats.z_span() as usize;

    node.layer == config.candidate_layer
        && stats.voxel_count() >= config.min_voxels_per_slice * slices
        && config.min_mean_grey <= stats.mean_grey() && stats.mean_grey() <= config.max_mean_grey
        // 至少有一部分伸入体积左半.
        && stats.w_min() < (width / 2) as i32
}

/// w_min 最小 (最靠左) 的候选. 同值取先遇到者.
fn westmost(forest: &VolumeForest, candidates: &[NodeId]) -> Option<NodeId> {
    let mut best = None;
    let mut best_w_min = i32::MAX;
    for &node in candidates {
        let w_min = forest.stats_of(node).w_min();
        if w_min < best_w_min {
            best = Some(node);
            best_w_min = w_min;
        }
    }
    best
}
