//! 主动脉识别.
//!
//! 腹主动脉贴着椎骨前缘下行, 判别同时以椎骨 (h 向) 与脊髓 (w 向)
//! 锚定. 候选节点可能分布在不同粗化层, 先逐层做连通分量分解,
//! 再取 h_max 最大的分量作为主动脉主干, 并剔除其中过暗的节点
//! (多为贴边的低灌注组织), 余下节点选种生长.

use super::IdentifyContext;
use crate::forest::{Anatomy, NodeId, NodeStats, RegionStats, VolumeForest};
use crate::jobs::{Job, JobMonitor};
use itertools::Itertools;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 主动脉判别阈值.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AortaConfig {
    /// 候选灰度均值下限 (闭). 最优分量内低于该值的节点也会被剔除.
    pub min_mean_grey: f64,

    /// 候选灰度均值上限 (闭).
    pub max_mean_grey: f64,

    /// 候选体素数下限, 乘节点自身跨越的切片数.
    pub min_voxels_per_slice: usize,

    /// 候选体素数上限, 乘节点自身跨越的切片数.
    pub max_voxels_per_slice: usize,

    /// 候选底端允许高出椎骨上缘的幅度.
    pub max_rise_above_spine: i32,

    /// 种子灰度下限 (开).
    pub seed_grey_floor: u8,

    /// 种子灰度上限 (开).
    pub seed_grey_ceiling: u8,

    /// 生长截止时间.
    pub stop_time: f64,
}

impl Default for AortaConfig {
    fn default() -> Self {
        Self {
            min_mean_grey: 150.0,
            max_mean_grey: 202.0,
            min_voxels_per_slice: 350,
            max_voxels_per_slice: 900,
            max_rise_above_spine: 20,
            seed_grey_floor: 160,
            seed_grey_ceiling: 190,
            stop_time: 8.0,
        }
    }
}

/// 主动脉识别作业.
pub struct AortaIdentifier {
    context: IdentifyContext,
    config: AortaConfig,
    monitor: Arc<JobMonitor>,
}

impl AortaIdentifier {
    /// 构造作业.
    pub fn new(context: IdentifyContext, config: AortaConfig) -> Self {
        Self {
            context,
            config,
            monitor: Arc::new(JobMonitor::new()),
        }
    }
}

impl Job for AortaIdentifier {
    fn execute(&mut self) {
        self.monitor.set_status("Identifying aorta...");

        let spine = self.context.stats_of(Anatomy::Vertebra);
        let cord = self.context.stats_of(Anatomy::SpinalCord);
        let candidates = self
            .context
            .filter_branches(|_, stats| is_aorta(&self.config, &spine, &cord, stats));
        if candidates.is_empty() {
            return;
        }

        // 候选非空时至少有一个连通分量.
        let (layer, component) = best_component(self.context.forest(), &candidates)
            .expect("候选非空时必有最优连通分量");

        let min_grey = self.config.min_mean_grey;
        let kept: Vec<NodeId> = component
            .into_iter()
            .map(|index| NodeId::new(layer, index))
            .filter(|&node| self.context.forest().stats_of(node).mean_grey() >= min_grey)
            .collect();

        let (floor, ceiling) = (self.config.seed_grey_floor, self.config.seed_grey_ceiling);
        let seeds = self
            .context
            .seed_positions(&kept, |g| floor < g && g < ceiling);
        self.monitor.increment();

        let grown = self.context.grow_at_time(&seeds, self.config.stop_time);
        self.monitor.increment();

        let selection = self.context.selection_from_positions(&grown);
        self.context.commit(Anatomy::Aorta, selection);
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

/// 主动脉候选判别.
fn is_aorta(
    config: &AortaConfig,
    spine: &RegionStats,
    cord: &RegionStats,
    stats: &RegionStats,
) -> bool {
    let slices = stats.z_span() as usize;
    let min_voxels = config.min_voxels_per_slice * slices;
    let max_voxels = config.max_voxels_per_slice * slices;

    config.min_mean_grey <= stats.mean_grey() && stats.mean_grey() <= config.max_mean_grey
        && min_voxels <= stats.voxel_count() && stats.voxel_count() <= max_voxels
        // 左缘落在脊髓的 w 界内.
        && cord.w_min() < stats.w_min() && stats.w_min() < cord.w_max()
        // 顶端高于椎骨上缘.
        && stats.h_min() < spine.h_min()
        // 底端不远高于椎骨上缘.
        && stats.h_max() > spine.h_min() - config.max_rise_above_spine
}

/// 候选逐层分解连通分量, 返回归并统计 h_max 最大者及其所在层.
/// 同值取先遇到的分量.
fn best_component(forest: &VolumeForest, candidates: &[NodeId]) -> Option<(usize, Vec<usize>)> {
    let by_layer = candidates
        .iter()
        .map(|&node| (node.layer, node.index))
        .into_group_map();

    let mut best: Option<(usize, Vec<usize>)> = None;
    let mut best_h_max = i32::MIN;
    for (layer, indices) in by_layer.into_iter().sorted_by_key(|&(layer, _)| layer) {
        for component in forest.find_connected_components(&indices, layer) {
            let stats = RegionStats::reduce(
                component
                    .iter()
                    .map(|&index| forest.forest().stats_of(NodeId::new(layer, index))),
            );
            if stats.h_max() > best_h_max {
                best_h_max = stats.h_max();
                best = Some((layer, component));
            }
        }
    }
    best
}
