//! 森林节点标识.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 分区森林节点标识: `(层号, 层内索引)`.
///
/// 层 0 为叶子层, 层号越大划分越粗. 层内索引在节点被合并退役后不再复用,
/// 持有旧标识的一方只会查询失败, 不会悬垂.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId {
    /// 层号.
    pub layer: usize,

    /// 层内索引.
    pub index: usize,
}

impl NodeId {
    /// 构造任意层的节点标识.
    #[inline]
    pub const fn new(layer: usize, index: usize) -> Self {
        Self { layer, index }
    }

    /// 构造叶子层 (层 0) 的节点标识.
    #[inline]
    pub const fn leaf(index: usize) -> Self {
        Self { layer: 0, index }
    }

    /// 是否为叶子节点.
    #[inline]
    pub const fn is_leaf(&self) -> bool {
        self.layer == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.layer, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::NodeId;

    #[test]
    fn test_node_id_order_layer_first() {
        // BTreeSet<NodeId> 的迭代顺序依赖该排序.
        let mut v = vec![
            NodeId::new(1, 0),
            NodeId::leaf(7),
            NodeId::new(2, 3),
            NodeId::leaf(2),
        ];
        v.sort_unstable();
        assert_eq!(
            v,
            vec![
                NodeId::leaf(2),
                NodeId::leaf(7),
                NodeId::new(1, 0),
                NodeId::new(2, 3),
            ]
        );
        assert!(NodeId::leaf(2).is_leaf());
        assert!(!NodeId::new(1, 2).is_leaf());
        assert_eq!(NodeId::new(1, 2).to_string(), "(1, 2)");
    }
}
