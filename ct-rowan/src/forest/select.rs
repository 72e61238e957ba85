//! 节点选择与识别结果汇总.

use super::{NodeId, RegionStats};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 解剖结构标签.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Anatomy {
    /// 椎骨 (脊柱).
    Vertebra,

    /// 脊髓.
    SpinalCord,

    /// 肋骨.
    Ribs,

    /// 主动脉.
    Aorta,

    /// 肝脏.
    Liver,

    /// 肾脏. 单标签同时覆盖左右两侧.
    Kidney,

    /// 脾脏.
    Spleen,

    /// 预留的水平集壳层标签 (习惯上取 1..=9).
    /// 当前没有识别器提交该类标签.
    LevelSet(u8),
}

impl fmt::Display for Anatomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anatomy::Vertebra => write!(f, "vertebra"),
            Anatomy::SpinalCord => write!(f, "spinal cord"),
            Anatomy::Ribs => write!(f, "ribs"),
            Anatomy::Aorta => write!(f, "aorta"),
            Anatomy::Liver => write!(f, "liver"),
            Anatomy::Kidney => write!(f, "kidney"),
            Anatomy::Spleen => write!(f, "spleen"),
            Anatomy::LevelSet(n) => write!(f, "level set {n}"),
        }
    }
}

/// 一组森林节点的选择.
///
/// 选择不持有森林引用, 只记录节点标识: 森林在选择创建后被修改时,
/// 其中的标识可能退役 (过期), 但绝不悬垂. 读取前可用
/// [`PartitionForest::has_node`] 校验.
///
/// [`PartitionForest::has_node`]: super::PartitionForest::has_node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Selection {
    nodes: BTreeSet<NodeId>,
}

impl Selection {
    /// 空选择.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 由一组叶子索引构造选择.
    pub fn from_leaves<I: IntoIterator<Item = usize>>(leaves: I) -> Self {
        Self {
            nodes: leaves.into_iter().map(NodeId::leaf).collect(),
        }
    }

    /// 加入一个节点. 返回值指示是否是新加入的.
    #[inline]
    pub fn select(&mut self, node: NodeId) -> bool {
        self.nodes.insert(node)
    }

    /// 是否包含某节点.
    #[inline]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// 节点个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 按 `(层号, 索引)` 升序迭代全部节点.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }
}

impl FromIterator<NodeId> for Selection {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

/// 一次识别运行的结果汇总: 标签到 (选择, 聚合统计量) 的只增映射.
///
/// 同一标签在一次运行中最多提交一次, 重复提交属于管线错误, 会 panic.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MultiFeatureSelection {
    entries: BTreeMap<Anatomy, FeatureEntry>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct FeatureEntry {
    selection: Selection,
    stats: RegionStats,
}

impl MultiFeatureSelection {
    /// 空结果集.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 在 `label` 下提交一个选择及其聚合统计量.
    pub fn commit(&mut self, label: Anatomy, selection: Selection, stats: RegionStats) {
        let prev = self.entries.insert(label, FeatureEntry { selection, stats });
        assert!(prev.is_none(), "标签 {label} 在一次识别中只能提交一次");
    }

    /// 某标签的选择. 未提交时返回 `None`.
    pub fn selection_of(&self, label: Anatomy) -> Option<&Selection> {
        self.entries.get(&label).map(|e| &e.selection)
    }

    /// 某标签的聚合统计量.
    ///
    /// 未提交的标签返回退化默认值 (空区域): 依赖该标签做空间锚定的
    /// 判别会全部自然失败, 从而静默降级.
    pub fn stats_of(&self, label: Anatomy) -> RegionStats {
        self.entries
            .get(&label)
            .map(|e| e.stats)
            .unwrap_or_default()
    }

    /// 是否已提交某标签.
    #[inline]
    pub fn contains(&self, label: Anatomy) -> bool {
        self.entries.contains_key(&label)
    }

    /// 已提交的标签个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否没有任何提交.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按标签升序迭代 (标签, 选择, 统计量).
    pub fn iter(&self) -> impl Iterator<Item = (Anatomy, &Selection, RegionStats)> + '_ {
        self.entries
            .iter()
            .map(|(&label, e)| (label, &e.selection, e.stats))
    }

    /// 按标签升序迭代已提交的标签.
    pub fn labels(&self) -> impl Iterator<Item = Anatomy> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_basic() {
        let mut sel = Selection::new();
        assert!(sel.is_empty());
        assert!(sel.select(NodeId::new(1, 3)));
        assert!(!sel.select(NodeId::new(1, 3)));
        assert!(sel.select(NodeId::leaf(0)));
        assert_eq!(sel.len(), 2);
        assert!(sel.contains(NodeId::leaf(0)));

        // 升序: 叶子层在前.
        let order: Vec<NodeId> = sel.iter().collect();
        assert_eq!(order, vec![NodeId::leaf(0), NodeId::new(1, 3)]);
    }

    #[test]
    fn test_selection_from_leaves_dedups() {
        let sel = Selection::from_leaves([4, 2, 4, 2, 9]);
        assert_eq!(sel.len(), 3);
        assert!(sel.contains(NodeId::leaf(9)));
    }

    #[test]
    fn test_mfs_commit_and_lookup() {
        let mut mfs = MultiFeatureSelection::new();
        assert!(mfs.is_empty());

        let sel = Selection::from_leaves([1, 2, 3]);
        let stats = RegionStats::from_voxel((0, 1, 2), 180);
        mfs.commit(Anatomy::Vertebra, sel.clone(), stats);

        assert_eq!(mfs.len(), 1);
        assert!(mfs.contains(Anatomy::Vertebra));
        assert_eq!(mfs.selection_of(Anatomy::Vertebra), Some(&sel));
        assert_eq!(mfs.stats_of(Anatomy::Vertebra), stats);
    }

    #[test]
    fn test_mfs_missing_label_degenerates() {
        let mfs = MultiFeatureSelection::new();
        assert_eq!(mfs.selection_of(Anatomy::Liver), None);

        let stats = mfs.stats_of(Anatomy::Liver);
        assert!(stats.is_empty());
        // 锚定运算在退化值上必然失败.
        assert!(stats.h_min() > stats.h_max());
    }

    #[test]
    fn test_anatomy_display() {
        assert_eq!(Anatomy::SpinalCord.to_string(), "spinal cord");
        assert_eq!(Anatomy::LevelSet(3).to_string(), "level set 3");
    }
}
