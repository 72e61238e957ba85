//! 脊柱识别.
//!
//! 椎骨是整条管线的首要空间锚定: 它贯穿全部切片, 横跨体积的 w 向中线,
//! 质心落在切片的后半部 (h 较大一侧), 且骨质在窗位变换后接近饱和白.

use super::IdentifyContext;
use crate::forest::{Anatomy, RegionStats};
use crate::jobs::{Job, JobMonitor};
use crate::volume::VolumeShape;
use crate::Idx3d;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 脊柱判别阈值.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpineConfig {
    /// 候选灰度均值下限.
    pub min_mean_grey: f64,

    /// 候选体素数下限, 乘体积切片数.
    pub min_voxels_per_slice: usize,

    /// 候选体素数上限, 乘体积切片数.
    pub max_voxels_per_slice: usize,

    /// 包围盒宽高比下限 (闭).
    pub min_aspect_ratio: f64,

    /// 包围盒宽高比上限 (闭).
    pub max_aspect_ratio: f64,

    /// 种子灰度下限 (开). 单侧判别, 饱和白体素始终入选.
    pub seed_grey_floor: u8,

    /// 生长截止时间.
    pub stop_time: f64,
}

impl Default for SpineConfig {
    fn default() -> Self {
        Self {
            min_mean_grey: 180.0,
            min_voxels_per_slice: 800,
            max_voxels_per_slice: 6000,
            min_aspect_ratio: 0.25,
            max_aspect_ratio: 4.0,
            seed_grey_floor: 210,
            stop_time: 100.0,
        }
    }
}

/// 脊柱识别作业.
pub struct SpineIdentifier {
    context: IdentifyContext,
    config: SpineConfig,
    monitor: Arc<JobMonitor>,
}

impl SpineIdentifier {
    /// 构造作业.
    pub fn new(context: IdentifyContext, config: SpineConfig) -> Self {
        Self {
            context,
            config,
            monitor: Arc::new(JobMonitor::new()),
        }
    }
}

impl Job for SpineIdentifier {
    fn execute(&mut self) {
        self.monitor.set_status("Identifying the spine...");

        let shape = self.context.volume().shape();
        let candidates = self
            .context
            .filter_branches(|_, stats| is_spine(&self.config, shape, stats));

        let floor = self.config.seed_grey_floor;
        let seeds = self.context.seed_positions(&candidates, |g| g > floor);
        self.monitor.increment();

        let grown = self.context.grow_at_time(&seeds, self.config.stop_time);
        self.monitor.increment();

        let selection = self.context.selection_from_positions(&grown);
        self.context.commit(Anatomy::Vertebra, selection);
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

/// 椎骨候选判别.
fn is_spine(config: &SpineConfig, (depth, height, width): Idx3d, stats: &RegionStats) -> bool {
    let min_voxels = config.min_voxels_per_slice * depth;
    let max_voxels = config.max_voxels_per_slice * depth;
    let mid_w = (width / 2) as i32;
    let mid_h = (height / 2) as f64;
    let aspect = stats.aspect_ratio_wh();

    // 横跨 w 向中线.
    stats.w_min() < mid_w && stats.w_max() > mid_w
        // 质心在切片后半部.
        && stats.centroid().1 > mid_h
        // 贯穿全部切片.
        && stats.z_min() == 0 && stats.z_max() == depth as i32 - 1
        && config.min_aspect_ratio <= aspect && aspect <= config.max_aspect_ratio
        && stats.mean_grey() >= config.min_mean_grey
        && stats.voxel_count() >= min_voxels && stats.voxel_count() <= max_voxels
}
