//! 体积索引森林: 分区森林与体数据的耦合.
//!
//! 在通用森林之上补充三类体积相关能力: 位置与叶子索引的互逆映射 (叶子
//! 节点查询由此扩展到任意层), 由网格 6-邻接懒惰推导的同层节点邻接关系
//! (连通分量只在查询时展开, 不落地存储), 以及叶子层统计量的即时合成.

use super::{MergeEvent, NodeId, NodeStats, PartitionForest, RegionStats, Selection};
use crate::volume::{CtVolume, VolumeShape, VoxelProps};
use crate::Idx3d;
use ndarray::ArrayView3;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

/// 体积索引的分区森林.
///
/// 最低分支层节点的统计量在构造时由体数据聚合; 叶子节点的统计量按需
/// 合成, 不落地存储.
#[derive(Debug)]
pub struct VolumeForest {
    volume: Arc<CtVolume>,
    forest: PartitionForest<RegionStats>,
}

impl VolumeShape for VolumeForest {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.volume.shape()
    }
}

impl VolumeForest {
    /// 由体数据与最低分支层的叶子归属构造.
    ///
    /// `assignment[i]` 给出叶子 `i` 所属的层 1 节点索引, 长度必须等于
    /// 体素个数; 每个层 1 节点的统计量由体数据逐体素聚合得到.
    pub fn new(volume: Arc<CtVolume>, assignment: &[usize]) -> Self {
        assert_eq!(
            assignment.len(),
            volume.size(),
            "叶子归属数组长度与体素个数不一致"
        );

        let mut group_stats: BTreeMap<usize, RegionStats> = BTreeMap::new();
        for (leaf, (pos, &grey)) in volume.windowed_image().indexed_iter().enumerate() {
            let voxel = RegionStats::from_voxel(pos, grey);
            let acc = group_stats.entry(assignment[leaf]).or_default();
            *acc = RegionStats::reduce([&*acc, &voxel]);
        }

        let forest =
            PartitionForest::with_lowest_branch_layer(volume.size(), assignment, group_stats);
        Self { volume, forest }
    }

    /// 底层体数据.
    #[inline]
    pub fn volume(&self) -> &CtVolume {
        &self.volume
    }

    /// 底层通用森林 (只读).
    #[inline]
    pub fn forest(&self) -> &PartitionForest<RegionStats> {
        &self.forest
    }

    /// 合并两个同层节点. 见 [`PartitionForest::merge_nodes`].
    #[inline]
    pub fn merge_nodes(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.forest.merge_nodes(lhs, rhs)
    }

    /// 注册合并事件回调. 见 [`PartitionForest::on_merge`].
    #[inline]
    pub fn on_merge<F>(&mut self, callback: F)
    where
        F: FnMut(&MergeEvent) + Send + 'static,
    {
        self.forest.on_merge(callback)
    }

    /// 位置 `pos` 处的叶子在 `layer` 层的祖先节点.
    ///
    /// 位置越界或 `layer` 高于最高层时返回 `None`.
    pub fn node_of(&self, layer: usize, pos: &Idx3d) -> Option<NodeId> {
        let leaf = self.leaf_of_position(pos)?;
        self.forest.ancestor_of(NodeId::leaf(leaf), layer)
    }

    /// 叶子的体素属性三元组.
    #[inline]
    pub fn leaf_props(&self, leaf: usize) -> VoxelProps {
        self.volume.voxel_props(self.position_of_leaf(leaf))
    }

    /// 任意节点的统计量. 叶子节点即时合成单体素统计量.
    pub fn stats_of(&self, node: NodeId) -> RegionStats {
        if node.is_leaf() {
            assert!(node.index < self.size(), "节点 {node} 不存在");
            let pos = self.position_of_leaf(node.index);
            RegionStats::from_voxel(pos, self.volume.grey_value(pos))
        } else {
            *self.forest.stats_of(node)
        }
    }

    /// 一组节点选择的聚合统计量. 空选择产生退化默认值.
    pub fn selection_stats(&self, selection: &Selection) -> RegionStats {
        let stats: Vec<RegionStats> = selection.iter().map(|n| self.stats_of(n)).collect();
        RegionStats::reduce(stats.iter())
    }

    /// 在 `layer` 层的候选节点集合 `indices` 上求连通分量.
    ///
    /// 两个同层节点相邻当且仅当各自感受区域中存在一对 6-相邻的叶子;
    /// 邻接关系由网格懒惰推导, 不落地存储. 分量顺序为输入切片的首次
    /// 访问顺序, 调用方不应依赖更强的保证.
    pub fn find_connected_components(&self, indices: &[usize], layer: usize) -> Vec<Vec<usize>> {
        let candidates: HashSet<usize> = indices.iter().copied().collect();
        let mut visited: HashSet<usize> = HashSet::with_capacity(candidates.len());
        let mut components = Vec::new();

        for &start in indices {
            if visited.contains(&start) {
                continue;
            }
            assert!(
                self.forest.has_node(NodeId::new(layer, start)),
                "候选节点 ({layer}, {start}) 不存在"
            );
            visited.insert(start);
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            while let Some(cur) = queue.pop_front() {
                component.push(cur);
                for neighbour in self.node_neighbours(layer, cur) {
                    if candidates.contains(&neighbour) && visited.insert(neighbour) {
                        queue.push_back(neighbour);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// 窗位灰度图视图.
    #[inline]
    pub fn windowed_image(&self) -> ArrayView3<'_, u8> {
        self.volume.windowed_image()
    }

    /// 梯度幅值图视图, 快速行进法的速度来源.
    #[inline]
    pub fn gradient_magnitude_image(&self) -> ArrayView3<'_, i16> {
        self.volume.gradient_image()
    }

    /// `(layer, index)` 节点的同层相邻节点索引 (升序).
    fn node_neighbours(&self, layer: usize, index: usize) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        for leaf in self.forest.receptive_region_of(NodeId::new(layer, index)) {
            let pos = self.position_of_leaf(leaf);
            for npos in self.diamond_neighbours(pos) {
                // 邻居始终在界内, 可直接 unwrap.
                let nleaf = self.leaf_of_position(&npos).unwrap();
                let ancestor = self.forest.ancestor_of(NodeId::leaf(nleaf), layer).unwrap();
                if ancestor.index != index {
                    out.insert(ancestor.index);
                }
            }
        }
        out
    }
}
