//! 分区森林: 体数据上的多层划分层次.
//!
//! 层 0 为叶子层 (每个体素一个节点), 层号越大划分越粗; 每一层都是叶子
//! 集合的一个全划分, 第 L+1 层是第 L 层的粗化. 森林由上游分割算法构建
//! 完毕后传入, 识别阶段唯一支持的修改是 [`merge_nodes`].
//!
//! 合并会在分支层产生全新的节点标识并让旧标识退役; 每次成对合并都会向
//! 回调列表发布一条 [`MergeEvent`].
//!
//! [`merge_nodes`]: PartitionForest::merge_nodes

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Mutex;

mod node;
mod select;
mod stats;
mod volume;

pub use node::NodeId;
pub use select::{Anatomy, MultiFeatureSelection, Selection};
pub use stats::{NodeStats, RegionStats};
pub use volume::VolumeForest;

/// 一次成对合并的描述. `lhs`/`rhs` 为同层被退役的节点索引,
/// `merged` 为新分配的节点索引.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MergeEvent {
    /// 合并发生的层号.
    pub layer: usize,

    /// 被合并的左节点索引 (已退役).
    pub lhs: usize,

    /// 被合并的右节点索引 (已退役).
    pub rhs: usize,

    /// 新节点索引.
    pub merged: usize,
}

type MergeCallback = Box<dyn FnMut(&MergeEvent) + Send>;

#[derive(Debug, Clone)]
struct BranchNode<B> {
    /// 上一层父节点索引. 顶层节点为 `None`.
    parent: Option<usize>,

    /// 下一层子节点索引集合.
    children: BTreeSet<usize>,

    stats: B,
}

#[derive(Debug, Clone, Default)]
struct Layer<B> {
    nodes: BTreeMap<usize, BranchNode<B>>,
}

/// 分区森林.
///
/// 对统计量类型 `B` 泛型; 分支节点统计量在合并时由 [`NodeStats::reduce`]
/// 归并, 之后不再重算 (节点下方区域不变时统计量保持不变).
pub struct PartitionForest<B> {
    leaf_count: usize,

    /// 每个叶子在层 1 的父节点索引. 没有分支层时为空.
    leaf_parent: Vec<usize>,

    /// `layers[i]` 存放层号 `i + 1` 的分支节点.
    layers: Vec<Layer<B>>,

    /// 每个分支层下一个可用的节点索引. 退役索引不复用.
    next_index: Vec<usize>,

    callbacks: Mutex<Vec<MergeCallback>>,
}

impl<B> fmt::Debug for PartitionForest<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionForest")
            .field("leaf_count", &self.leaf_count)
            .field(
                "branch_layers",
                &self
                    .layers
                    .iter()
                    .map(|l| l.nodes.len())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<B: NodeStats> PartitionForest<B> {
    /// 构造只有叶子层的森林.
    ///
    /// 在安装最低分支层之前, 这样的森林不支持任何合并操作.
    pub fn new(leaf_count: usize) -> Self {
        assert_ne!(leaf_count, 0, "森林至少要有一个叶子");
        Self {
            leaf_count,
            leaf_parent: Vec::new(),
            layers: Vec::new(),
            next_index: Vec::new(),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// 构造带最低分支层的森林.
    ///
    /// `assignment[i]` 给出叶子 `i` 所属的层 1 节点索引; `stats` 给出每个
    /// 层 1 节点的统计量. 两者必须完整对应 (每个被引用的节点都有统计量,
    /// 每个统计量都被至少一个叶子引用), 否则 panic.
    pub fn with_lowest_branch_layer(
        leaf_count: usize,
        assignment: &[usize],
        stats: BTreeMap<usize, B>,
    ) -> Self {
        assert_ne!(leaf_count, 0, "森林至少要有一个叶子");
        assert_eq!(
            assignment.len(),
            leaf_count,
            "叶子归属数组长度与叶子数不一致"
        );

        let mut nodes: BTreeMap<usize, BranchNode<B>> = BTreeMap::new();
        let mut stats = stats;
        for (leaf, &group) in assignment.iter().enumerate() {
            nodes
                .entry(group)
                .or_insert_with(|| BranchNode {
                    parent: None,
                    children: BTreeSet::new(),
                    stats: stats
                        .remove(&group)
                        .unwrap_or_else(|| panic!("层 1 节点 {group} 缺少统计量")),
                })
                .children
                .insert(leaf);
        }
        assert!(
            stats.is_empty(),
            "统计量引用了不存在的层 1 节点: {:?}",
            stats.keys().collect::<Vec<_>>()
        );

        let next = nodes.keys().last().copied().unwrap_or(0) + 1;
        Self {
            leaf_count,
            leaf_parent: assignment.to_vec(),
            layers: vec![Layer { nodes }],
            next_index: vec![next],
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// 叶子个数.
    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// 层数 (含叶子层).
    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layers.len() + 1
    }

    /// 最高层的层号. 没有分支层时为 0.
    #[inline]
    pub fn top_layer(&self) -> usize {
        self.layers.len()
    }

    /// 节点是否存在 (未退役且层号合法).
    pub fn has_node(&self, node: NodeId) -> bool {
        if node.layer == 0 {
            node.index < self.leaf_count
        } else {
            self.layers
                .get(node.layer - 1)
                .is_some_and(|l| l.nodes.contains_key(&node.index))
        }
    }

    /// 某一层的节点个数.
    pub fn node_count_at(&self, layer: usize) -> usize {
        assert!(layer <= self.top_layer(), "层号 {layer} 超出最高层");
        if layer == 0 {
            self.leaf_count
        } else {
            self.layers[layer - 1].nodes.len()
        }
    }

    /// 某一分支层的全部节点, 按索引升序.
    pub fn branch_nodes_at(&self, layer: usize) -> impl Iterator<Item = NodeId> + '_ {
        assert!(
            layer >= 1 && layer <= self.top_layer(),
            "层号 {layer} 不是分支层"
        );
        self.layers[layer - 1]
            .nodes
            .keys()
            .map(move |&index| NodeId::new(layer, index))
    }

    /// 全部分支层节点, 层号从低到高, 层内按索引升序.
    pub fn all_branch_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.layers.iter().enumerate().flat_map(|(li, layer)| {
            layer
                .nodes
                .keys()
                .map(move |&index| NodeId::new(li + 1, index))
        })
    }

    /// 节点的父节点. 顶层节点返回 `None`.
    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        assert!(self.has_node(node), "节点 {node} 不存在");
        if node.layer == 0 {
            if self.layers.is_empty() {
                None
            } else {
                Some(NodeId::new(1, self.leaf_parent[node.index]))
            }
        } else {
            self.branch(node)
                .parent
                .map(|p| NodeId::new(node.layer + 1, p))
        }
    }

    /// 节点的全部子节点. 叶子返回空.
    pub fn children_of(&self, node: NodeId) -> Vec<NodeId> {
        assert!(self.has_node(node), "节点 {node} 不存在");
        if node.layer == 0 {
            return Vec::new();
        }
        let below = node.layer - 1;
        self.branch(node)
            .children
            .iter()
            .map(|&c| NodeId::new(below, c))
            .collect()
    }

    /// 分支节点的统计量.
    pub fn stats_of(&self, node: NodeId) -> &B {
        assert!(node.layer >= 1, "叶子层没有预存统计量");
        assert!(self.has_node(node), "节点 {node} 不存在");
        &self.branch(node).stats
    }

    /// 沿父链接查询 `node` 在 `target_layer` 层的祖先.
    ///
    /// `target_layer` 高于最高层时返回 `None`; 低于节点所在层属于调用方
    /// 错误 (debug 断言, release 下返回 `None`).
    pub fn ancestor_of(&self, node: NodeId, target_layer: usize) -> Option<NodeId> {
        assert!(self.has_node(node), "节点 {node} 不存在");
        debug_assert!(
            target_layer >= node.layer,
            "目标层 {target_layer} 低于节点所在层 {}",
            node.layer
        );
        if target_layer < node.layer {
            return None;
        }
        let mut cur = node;
        while cur.layer < target_layer {
            cur = self.parent_of(cur)?;
        }
        Some(cur)
    }

    /// 节点的感受区域: 其子树覆盖的全部叶子索引, 升序.
    pub fn receptive_region_of(&self, node: NodeId) -> Vec<usize> {
        assert!(self.has_node(node), "节点 {node} 不存在");
        let mut leaves = Vec::new();
        let mut stack = vec![node];
        while let Some(cur) = stack.pop() {
            if cur.layer == 0 {
                leaves.push(cur.index);
            } else {
                let below = cur.layer - 1;
                stack.extend(
                    self.branch(cur)
                        .children
                        .iter()
                        .map(|&c| NodeId::new(below, c)),
                );
            }
        }
        leaves.sort_unstable();
        leaves
    }

    /// 注册合并事件回调. 每次成对合并 (含向上传播产生的) 调用一次.
    pub fn on_merge<F>(&mut self, callback: F)
    where
        F: FnMut(&MergeEvent) + Send + 'static,
    {
        self.callbacks.lock().unwrap().push(Box::new(callback));
    }

    /// 合并两个同层节点, 使它们在上一层拥有共同父节点, 并返回该父节点.
    ///
    /// 两节点位于最高层时先把该层整体提升 (每个节点获得一个单例父节点).
    /// 父节点合并会分配全新索引并让两个旧父节点退役, 孩子集合取并,
    /// 统计量归并; 若两个旧父节点分属不同祖父, 粗化继续向上传播,
    /// 保证每一层始终是叶子集合的全划分.
    ///
    /// 两节点已经同父时不做任何修改.
    pub fn merge_nodes(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        assert_eq!(lhs.layer, rhs.layer, "只能合并同层节点");
        assert_ne!(lhs, rhs, "节点不能与自身合并");
        assert!(self.has_node(lhs), "节点 {lhs} 不存在");
        assert!(self.has_node(rhs), "节点 {rhs} 不存在");

        if lhs.layer == self.top_layer() {
            self.lift_top_layer();
        }

        // 提升后父节点必然存在, 可直接 unwrap.
        let pl = self.parent_of(lhs).unwrap().index;
        let pr = self.parent_of(rhs).unwrap().index;
        self.merge_within(lhs.layer + 1, pl, pr)
    }

    #[inline]
    fn branch(&self, node: NodeId) -> &BranchNode<B> {
        &self.layers[node.layer - 1].nodes[&node.index]
    }

    /// 把当前最高分支层整体提升一层: 每个节点获得一个同索引的单例父节点.
    fn lift_top_layer(&mut self) {
        assert!(
            !self.layers.is_empty(),
            "合并叶子节点前必须先安装最低分支层"
        );
        let li = self.layers.len() - 1;

        let mut lifted = BTreeMap::new();
        for (&index, node) in self.layers[li].nodes.iter() {
            lifted.insert(
                index,
                BranchNode {
                    parent: None,
                    children: BTreeSet::from([index]),
                    stats: node.stats.clone(),
                },
            );
        }
        let next = lifted.keys().last().copied().unwrap_or(0) + 1;
        for (&index, node) in self.layers[li].nodes.iter_mut() {
            node.parent = Some(index);
        }

        self.layers.push(Layer { nodes: lifted });
        self.next_index.push(next);
    }

    /// 在层 `layer` 内合并节点 `lhs` 与 `rhs` (两者退役), 返回新节点.
    fn merge_within(&mut self, layer: usize, lhs: usize, rhs: usize) -> NodeId {
        debug_assert!(layer >= 1);
        if lhs == rhs {
            return NodeId::new(layer, lhs);
        }
        let li = layer - 1;
        let node_l = self.layers[li]
            .nodes
            .remove(&lhs)
            .unwrap_or_else(|| panic!("层 {layer} 不存在节点 {lhs}"));
        let node_r = self.layers[li]
            .nodes
            .remove(&rhs)
            .unwrap_or_else(|| panic!("层 {layer} 不存在节点 {rhs}"));

        let fresh = self.next_index[li];
        self.next_index[li] += 1;

        let mut children = node_l.children;
        children.extend(node_r.children.iter().copied());
        let stats = B::reduce([&node_l.stats, &node_r.stats]);

        if layer == 1 {
            for &leaf in &children {
                self.leaf_parent[leaf] = fresh;
            }
        } else {
            for &c in &children {
                self.layers[li - 1].nodes.get_mut(&c).unwrap().parent = Some(fresh);
            }
        }

        self.layers[li].nodes.insert(
            fresh,
            BranchNode {
                parent: None,
                children,
                stats,
            },
        );
        self.emit(&MergeEvent {
            layer,
            lhs,
            rhs,
            merged: fresh,
        });

        match (node_l.parent, node_r.parent) {
            (None, None) => {}
            (Some(gl), Some(gr)) if gl == gr => {
                let g = self.layers[li + 1].nodes.get_mut(&gl).unwrap();
                g.children.remove(&lhs);
                g.children.remove(&rhs);
                g.children.insert(fresh);
                self.layers[li].nodes.get_mut(&fresh).unwrap().parent = Some(gl);
            }
            (Some(gl), Some(gr)) => {
                self.layers[li + 1]
                    .nodes
                    .get_mut(&gl)
                    .unwrap()
                    .children
                    .remove(&lhs);
                self.layers[li + 1]
                    .nodes
                    .get_mut(&gr)
                    .unwrap()
                    .children
                    .remove(&rhs);
                // 新节点横跨两个祖父的区域, 粗化向上传播.
                let merged_g = self.merge_within(layer + 1, gl, gr);
                self.layers[li + 1]
                    .nodes
                    .get_mut(&merged_g.index)
                    .unwrap()
                    .children
                    .insert(fresh);
                self.layers[li].nodes.get_mut(&fresh).unwrap().parent = Some(merged_g.index);
            }
            _ => unreachable!("同层节点的父链接状态必须一致"),
        }

        NodeId::new(layer, fresh)
    }

    fn emit(&self, event: &MergeEvent) {
        let mut callbacks = self.callbacks.lock().unwrap();
        for cb in callbacks.iter_mut() {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// 测试用统计量: 体素计数.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct Count(usize);

    impl NodeStats for Count {
        fn reduce<'a, I>(stats: I) -> Self
        where
            I: IntoIterator<Item = &'a Self>,
        {
            Count(stats.into_iter().map(|c| c.0).sum())
        }
    }

    /// 8 个叶子, 两两一组构成层 1 的 4 个节点.
    fn paired_forest() -> PartitionForest<Count> {
        let assignment = [0, 0, 1, 1, 2, 2, 3, 3];
        let stats = BTreeMap::from([
            (0, Count(2)),
            (1, Count(2)),
            (2, Count(2)),
            (3, Count(2)),
        ]);
        PartitionForest::with_lowest_branch_layer(8, &assignment, stats)
    }

    /// 校验每一分支层都是叶子集合的全划分, 且父子链接互相一致.
    fn assert_partition(forest: &PartitionForest<Count>) {
        for layer in 1..=forest.top_layer() {
            let mut seen = vec![false; forest.leaf_count()];
            for node in forest.branch_nodes_at(layer) {
                for leaf in forest.receptive_region_of(node) {
                    assert!(!seen[leaf], "叶子 {leaf} 在层 {layer} 被覆盖两次");
                    seen[leaf] = true;
                }
                for child in forest.children_of(node) {
                    assert_eq!(forest.parent_of(child), Some(node));
                }
            }
            assert!(seen.iter().all(|&v| v), "层 {layer} 没有覆盖全部叶子");
        }
    }

    #[test]
    fn test_lowest_branch_layer_construction() {
        let forest = paired_forest();
        assert_eq!(forest.leaf_count(), 8);
        assert_eq!(forest.layer_count(), 2);
        assert_eq!(forest.top_layer(), 1);
        assert_eq!(forest.node_count_at(0), 8);
        assert_eq!(forest.node_count_at(1), 4);

        let nodes: Vec<NodeId> = forest.branch_nodes_at(1).collect();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0], NodeId::new(1, 0));

        assert_eq!(forest.receptive_region_of(NodeId::new(1, 2)), vec![4, 5]);
        assert_eq!(forest.parent_of(NodeId::leaf(5)), Some(NodeId::new(1, 2)));
        assert_eq!(forest.stats_of(NodeId::new(1, 2)), &Count(2));
        assert_partition(&forest);
    }

    #[test]
    fn test_ancestor_walk() {
        let forest = paired_forest();
        assert_eq!(
            forest.ancestor_of(NodeId::leaf(7), 1),
            Some(NodeId::new(1, 3))
        );
        assert_eq!(
            forest.ancestor_of(NodeId::leaf(7), 0),
            Some(NodeId::leaf(7))
        );
        // 高于最高层: None.
        assert_eq!(forest.ancestor_of(NodeId::leaf(7), 2), None);
    }

    #[test]
    fn test_merge_at_top_creates_layer() {
        let mut forest = paired_forest();
        let merged = forest.merge_nodes(NodeId::new(1, 0), NodeId::new(1, 1));

        // 提升产生层 2 的 4 个单例父节点, 其中 0/1 被合并成新索引 4.
        assert_eq!(forest.top_layer(), 2);
        assert_eq!(merged, NodeId::new(2, 4));
        assert_eq!(forest.node_count_at(2), 3);
        assert!(!forest.has_node(NodeId::new(2, 0)));
        assert!(!forest.has_node(NodeId::new(2, 1)));
        assert_eq!(forest.stats_of(merged), &Count(4));
        assert_eq!(
            forest.receptive_region_of(merged),
            vec![0, 1, 2, 3]
        );
        assert_partition(&forest);
    }

    #[test]
    fn test_merge_same_parent_is_noop() {
        let mut forest = paired_forest();
        let first = forest.merge_nodes(NodeId::new(1, 0), NodeId::new(1, 1));
        let second = forest.merge_nodes(NodeId::new(1, 0), NodeId::new(1, 1));
        assert_eq!(first, second);
        assert_eq!(forest.node_count_at(2), 3);
        assert_partition(&forest);
    }

    #[test]
    fn test_merge_propagates_upward() {
        let mut forest = paired_forest();
        // 层 2: {4: {0, 1}}, 单例 2, 3.
        forest.merge_nodes(NodeId::new(1, 0), NodeId::new(1, 1));
        // 层 3 提升后合并 (3, 4) 与 (3, 2) -> (3, 5).
        forest.merge_nodes(NodeId::new(2, 4), NodeId::new(2, 2));
        assert_eq!(forest.top_layer(), 3);

        // 层 1 的 2 与 3 分属层 2 的 2 与 3, 而这两者的祖父
        // 又分别是层 3 的 5 与 3: 合并必须一路传播到层 3.
        let merged = forest.merge_nodes(NodeId::new(1, 2), NodeId::new(1, 3));
        assert_eq!(merged.layer, 2);
        assert_eq!(forest.node_count_at(3), 1);
        let top: Vec<NodeId> = forest.branch_nodes_at(3).collect();
        assert_eq!(
            forest.receptive_region_of(top[0]),
            (0..8).collect::<Vec<_>>()
        );
        assert_eq!(forest.stats_of(top[0]), &Count(8));
        assert_partition(&forest);
    }

    #[test]
    fn test_merge_events_in_order() {
        let mut forest = paired_forest();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        forest.on_merge(move |e| sink.lock().unwrap().push(*e));

        forest.merge_nodes(NodeId::new(1, 0), NodeId::new(1, 1));
        forest.merge_nodes(NodeId::new(2, 4), NodeId::new(2, 2));
        forest.merge_nodes(NodeId::new(1, 2), NodeId::new(1, 3));

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                MergeEvent {
                    layer: 2,
                    lhs: 0,
                    rhs: 1,
                    merged: 4
                },
                MergeEvent {
                    layer: 3,
                    lhs: 4,
                    rhs: 2,
                    merged: 5
                },
                MergeEvent {
                    layer: 2,
                    lhs: 2,
                    rhs: 3,
                    merged: 5
                },
                MergeEvent {
                    layer: 3,
                    lhs: 5,
                    rhs: 3,
                    merged: 6
                },
            ]
        );
    }

    #[test]
    fn test_retired_identities_stay_retired() {
        let mut forest = paired_forest();
        forest.merge_nodes(NodeId::new(1, 0), NodeId::new(1, 1));
        // 旧单例 0/1 退役; 再合并其它节点时新索引继续向后分配.
        let merged = forest.merge_nodes(NodeId::new(1, 2), NodeId::new(1, 3));
        assert_eq!(merged, NodeId::new(2, 5));
        assert!(!forest.has_node(NodeId::new(2, 0)));
        assert!(!forest.has_node(NodeId::new(2, 1)));
        assert!(!forest.has_node(NodeId::new(2, 2)));
        assert!(!forest.has_node(NodeId::new(2, 3)));
        assert_partition(&forest);
    }
}
