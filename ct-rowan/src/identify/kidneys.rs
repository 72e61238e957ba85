//! 肾脏识别.
//!
//! 左右肾对称分布在椎骨两侧, 单标签同时覆盖两侧, 因此不挑选最优候选,
//! 所有通过判别的节点一起选种. 候选限定在较高分支层: 肾实质在低层碎成
//! 大量小块, 只有粗化后才能整体通过体素数与宽高比判别.

use super::IdentifyContext;
use crate::forest::{Anatomy, NodeId, RegionStats};
use crate::jobs::{Job, JobMonitor};
use crate::volume::VolumeShape;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 肾脏判别阈值.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KidneysConfig {
    /// 候选所在分支层的下限 (闭).
    pub min_layer: usize,

    /// 候选灰度均值下限 (闭).
    pub min_mean_grey: f64,

    /// 候选灰度均值上限 (闭).
    pub max_mean_grey: f64,

    /// 候选 w 向界距椎骨质心的最大距离 (开).
    pub max_distance_from_spine: f64,

    /// 包围盒宽高比下限 (闭).
    pub min_aspect_ratio: f64,

    /// 包围盒宽高比上限 (闭).
    pub max_aspect_ratio: f64,

    /// 候选体素数下限, 乘节点自身跨越的切片数.
    pub min_voxels_per_slice: usize,

    /// 候选体素数上限, 乘节点自身跨越的切片数.
    pub max_voxels_per_slice: usize,

    /// 种子灰度下限 (开).
    pub seed_grey_floor: u8,

    /// 种子灰度上限 (开).
    pub seed_grey_ceiling: u8,

    /// 首次停止扫描的每段新增体素数阈值, 乘体积切片数.
    pub stop_voxels_per_slice: usize,
}

impl Default for KidneysConfig {
    fn default() -> Self {
        Self {
            min_layer: 3,
            min_mean_grey: 150.0,
            max_mean_grey: 218.0,
            max_distance_from_spine: 150.0,
            min_aspect_ratio: 0.6,
            max_aspect_ratio: 1.8,
            min_voxels_per_slice: 1800,
            max_voxels_per_slice: 6000,
            seed_grey_floor: 160,
            seed_grey_ceiling: 190,
            stop_voxels_per_slice: 40,
        }
    }
}

/// 肾脏识别作业.
pub struct KidneysIdentifier {
    context: IdentifyContext,
    config: KidneysConfig,
    monitor: Arc<JobMonitor>,
}

impl KidneysIdentifier {
    /// 构造作业.
    pub fn new(context: IdentifyContext, config: KidneysConfig) -> Self {
        Self {
            context,
            config,
            monitor: Arc::new(JobMonitor::new()),
        }
    }
}

impl Job for KidneysIdentifier {
    fn execute(&mut self) {
        self.monitor.set_status("Identifying kidneys...");

        let depth = self.context.volume().shape().0;
        let spine = self.context.stats_of(Anatomy::Vertebra);
        let candidates = self
            .context
            .filter_branches(|node, stats| is_kidney(&self.config, &spine, node, stats));

        let (floor, ceiling) = (self.config.seed_grey_floor, self.config.seed_grey_ceiling);
        let seeds = self
            .context
            .seed_positions(&candidates, |g| floor < g && g < ceiling);
        self.monitor.increment();

        let threshold = self.config.stop_voxels_per_slice * depth;
        let grown = self.context.grow_at_first_stop(&seeds, threshold);
        self.monitor.increment();

        let selection = self.context.selection_from_positions(&grown);
        self.context.commit(Anatomy::Kidney, selection);
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

/// 肾脏候选判别.
fn is_kidney(
    config: &KidneysConfig,
    spine: &RegionStats,
    node: NodeId,
    stats: &RegionStats,
) -> bool {
    let slices = stats.z_span() as usize;
    let min_voxels = config.min_voxels_per_slice * slices;
    let max_voxels = config.max_voxels_per_slice * slices;
    let spine_w = spine.centroid().2;
    let aspect = stats.aspect_ratio_wh();

    node.layer >= config.min_layer
        && config.min_mean_grey <= stats.mean_grey() && stats.mean_grey() <= config.max_mean_grey
        // 整体落在椎骨质心 w 向的某一侧.
        && (f64::from(stats.w_max()) < spine_w || f64::from(stats.w_min()) > spine_w)
        // 同时距质心不超过给定带宽.
        && f64::from(stats.w_min()) > spine_w - config.max_distance_from_spine
        && f64::from(stats.w_max()) < spine_w + config.max_distance_from_spine
        // 后缘至少探到椎骨上缘.
        && stats.h_max() >= spine.h_min()
        && config.min_aspect_ratio <= aspect && aspect <= config.max_aspect_ratio
        && min_voxels <= stats.voxel_count() && stats.voxel_count() <= max_voxels
}
