//! 解剖结构识别.
//!
//! 七种结构共用同一条 "筛选, 选种, 生长, 提交" 流程: 先在分区森林的
//! 分支层按区域统计量筛出候选节点, 再在候选的感受区域内按窗位灰度挑出
//! 种子体素, 以梯度幅值驱动快速行进生长出形状, 最后把形状落回叶子选择
//! 并提交到共享结果集.
//!
//! 识别顺序有依赖: 脊柱最先提交, 脊髓以脊柱包围盒锚定, 主动脉同时以
//! 脊柱与脊髓锚定, 肋骨/肾脏/脾脏以脊柱锚定. [`multi_feature_pipeline`]
//! 按依赖顺序组装整条管线. 锚定结构缺失时, 其统计量取退化默认值,
//! 相关空间判别自然失败, 对应标签静默缺席.

mod aorta;
mod kidneys;
mod liver;
mod pipeline;
mod ribs;
mod spinal_cord;
mod spine;
mod spleen;

pub use aorta::{AortaConfig, AortaIdentifier};
pub use kidneys::{KidneysConfig, KidneysIdentifier};
pub use liver::{LiverConfig, LiverIdentifier};
pub use pipeline::multi_feature_pipeline;
pub use ribs::{RibsConfig, RibsIdentifier};
pub use spinal_cord::{SpinalCordConfig, SpinalCordIdentifier};
pub use spine::{SpineConfig, SpineIdentifier};
pub use spleen::{SpleenConfig, SpleenIdentifier};

use crate::forest::{Anatomy, MultiFeatureSelection, NodeId, RegionStats, Selection, VolumeForest};
use crate::march::FastMarching;
use crate::volume::{CtVolume, VolumeShape};
use crate::Idx3d;
use log::debug;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// 识别阶段的共享上下文.
///
/// 体数据与森林在整个识别期间只读; 结果汇入共享的
/// [`MultiFeatureSelection`], 后续识别器经 [`stats_of`] 读取先行结构的
/// 统计量作空间锚定.
///
/// [`stats_of`]: IdentifyContext::stats_of
#[derive(Clone)]
pub struct IdentifyContext {
    volume: Arc<CtVolume>,
    forest: Arc<VolumeForest>,
    sink: Arc<Mutex<MultiFeatureSelection>>,
}

impl IdentifyContext {
    /// 新建上下文, 结果集初始为空.
    pub fn new(volume: Arc<CtVolume>, forest: Arc<VolumeForest>) -> Self {
        Self {
            volume,
            forest,
            sink: Arc::new(Mutex::new(MultiFeatureSelection::new())),
        }
    }

    /// 体数据.
    #[inline]
    pub fn volume(&self) -> &CtVolume {
        &self.volume
    }

    /// 体积索引森林.
    #[inline]
    pub fn forest(&self) -> &VolumeForest {
        &self.forest
    }

    /// 共享结果集的句柄.
    #[inline]
    pub fn selection(&self) -> Arc<Mutex<MultiFeatureSelection>> {
        Arc::clone(&self.sink)
    }

    /// 已提交结构的聚合统计量.
    ///
    /// 未提交时返回退化默认值 (包围盒反向), 依赖它的空间判别会
    /// 自然失败.
    pub fn stats_of(&self, label: Anatomy) -> RegionStats {
        self.sink.lock().unwrap().stats_of(label)
    }

    /// 收集满足判别的分支节点 (全部分支层).
    pub fn filter_branches<P>(&self, mut pred: P) -> Vec<NodeId>
    where
        P: FnMut(NodeId, &RegionStats) -> bool,
    {
        self.forest
            .forest()
            .all_branch_nodes()
            .filter(|&node| pred(node, self.forest.forest().stats_of(node)))
            .collect()
    }

    /// 候选节点感受区域内窗位灰度满足 `keep` 的体素位置,
    /// 去重且按位置升序.
    pub fn seed_positions<P>(&self, nodes: &[NodeId], keep: P) -> Vec<Idx3d>
    where
        P: Fn(u8) -> bool,
    {
        let mut leaves = BTreeSet::new();
        for &node in nodes {
            leaves.extend(self.forest.forest().receptive_region_of(node));
        }
        leaves
            .into_iter()
            .map(|leaf| self.forest.position_of_leaf(leaf))
            .filter(|&pos| keep(self.volume.grey_value(pos)))
            .collect()
    }

    /// 从种子发起快速行进, 取到达时间不超过 `time` 的形状.
    pub fn grow_at_time(&self, seeds: &[Idx3d], time: f64) -> Vec<Idx3d> {
        FastMarching::new(self.volume.gradient_image(), seeds).shape_at_time(time)
    }

    /// 从种子发起快速行进, 按逐步扫描的首次停止条件取形状.
    pub fn grow_at_first_stop(&self, seeds: &[Idx3d], threshold: usize) -> Vec<Idx3d> {
        FastMarching::new(self.volume.gradient_image(), seeds).shape_at_first_stop(threshold)
    }

    /// 把体素形状落回叶子选择.
    pub fn selection_from_positions(&self, positions: &[Idx3d]) -> Selection {
        positions
            .iter()
            // 形状体素由界内传播产生, 可直接 unwrap.
            .map(|pos| NodeId::leaf(self.forest.leaf_of_position(pos).unwrap()))
            .collect()
    }

    /// 聚合统计并提交识别结果. 空选择不提交 (静默降级).
    pub fn commit(&self, label: Anatomy, selection: Selection) {
        if selection.is_empty() {
            debug!("{label} 选择为空, 本次不提交");
            return;
        }
        let stats = self.forest.selection_stats(&selection);
        debug!("提交 {label}: {} 个体素", stats.voxel_count());
        self.sink.lock().unwrap().commit(label, selection, stats);
    }
}
