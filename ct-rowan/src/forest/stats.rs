//! 区域统计信息.
//!
//! 分支节点的统计量在合并时由子节点统计量做一次确定性归并得到;
//! 只读识别阶段不会再重算. 空区域取退化默认值 (体素数 0, 包围盒反向),
//! 这保证缺失锚定结构时所有空间判别自然失败, 实现静默降级.

use crate::{Idx3d, Idx3dF};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 分支层节点统计量的归并行为.
pub trait NodeStats: Clone {
    /// 对一组统计量做确定性归并. 空输入产生退化默认值.
    fn reduce<'a, I>(stats: I) -> Self
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>;
}

/// 一个体素区域的统计信息.
///
/// 包围盒按轴分别闭区间存放; 取 `i32` 是为了让退化默认值
/// (min 为 `MAX`, max 为 `MIN`) 参与 `h_min - 20` 之类的锚定运算时
/// 不发生无符号下溢.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionStats {
    voxel_count: usize,
    z_min: i32,
    z_max: i32,
    h_min: i32,
    h_max: i32,
    w_min: i32,
    w_max: i32,
    mean_grey: f64,
    centroid: Idx3dF,
}

impl Default for RegionStats {
    #[inline]
    fn default() -> Self {
        Self {
            voxel_count: 0,
            z_min: i32::MAX,
            z_max: i32::MIN,
            h_min: i32::MAX,
            h_max: i32::MIN,
            w_min: i32::MAX,
            w_max: i32::MIN,
            mean_grey: 0.0,
            centroid: (0.0, 0.0, 0.0),
        }
    }
}

impl RegionStats {
    /// 单体素区域的统计量.
    pub fn from_voxel(pos: Idx3d, grey: u8) -> Self {
        let (z, h, w) = pos;
        Self {
            voxel_count: 1,
            z_min: z as i32,
            z_max: z as i32,
            h_min: h as i32,
            h_max: h as i32,
            w_min: w as i32,
            w_max: w as i32,
            mean_grey: grey as f64,
            centroid: (z as f64, h as f64, w as f64),
        }
    }

    /// 区域体素个数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.voxel_count
    }

    /// z 轴 (切片轴) 包围盒下界.
    #[inline]
    pub fn z_min(&self) -> i32 {
        self.z_min
    }

    /// z 轴 (切片轴) 包围盒上界.
    #[inline]
    pub fn z_max(&self) -> i32 {
        self.z_max
    }

    /// h 轴 (切片内垂直方向) 包围盒下界.
    #[inline]
    pub fn h_min(&self) -> i32 {
        self.h_min
    }

    /// h 轴 (切片内垂直方向) 包围盒上界.
    #[inline]
    pub fn h_max(&self) -> i32 {
        self.h_max
    }

    /// w 轴 (切片内水平方向) 包围盒下界.
    #[inline]
    pub fn w_min(&self) -> i32 {
        self.w_min
    }

    /// w 轴 (切片内水平方向) 包围盒上界.
    #[inline]
    pub fn w_max(&self) -> i32 {
        self.w_max
    }

    /// 窗位灰度均值.
    #[inline]
    pub fn mean_grey(&self) -> f64 {
        self.mean_grey
    }

    /// 区域质心, `(z, h, w)` 顺序.
    #[inline]
    pub fn centroid(&self) -> Idx3dF {
        self.centroid
    }

    /// 区域跨越的切片数 (闭区间). 空区域为 0.
    #[inline]
    pub fn z_span(&self) -> i32 {
        if self.voxel_count == 0 {
            0
        } else {
            self.z_max + 1 - self.z_min
        }
    }

    /// 包围盒宽高比: w 向跨度与 h 向跨度之比 (各 +1, 单体素区域为 1).
    /// 空区域为 0.
    #[inline]
    pub fn aspect_ratio_wh(&self) -> f64 {
        if self.voxel_count == 0 {
            return 0.0;
        }
        (self.w_max + 1 - self.w_min) as f64 / (self.h_max + 1 - self.h_min) as f64
    }

    /// 区域是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxel_count == 0
    }

    fn absorb(&mut self, other: &Self) {
        if other.voxel_count == 0 {
            return;
        }
        let total = self.voxel_count + other.voxel_count;
        let wl = self.voxel_count as f64 / total as f64;
        let wr = other.voxel_count as f64 / total as f64;

        self.mean_grey = self.mean_grey * wl + other.mean_grey * wr;
        self.centroid = (
            self.centroid.0 * wl + other.centroid.0 * wr,
            self.centroid.1 * wl + other.centroid.1 * wr,
            self.centroid.2 * wl + other.centroid.2 * wr,
        );
        self.voxel_count = total;
        self.z_min = self.z_min.min(other.z_min);
        self.z_max = self.z_max.max(other.z_max);
        self.h_min = self.h_min.min(other.h_min);
        self.h_max = self.h_max.max(other.h_max);
        self.w_min = self.w_min.min(other.w_min);
        self.w_max = self.w_max.max(other.w_max);
    }

    /// 测试用: 按字段直接构造统计量, 便于覆盖各判别阈值的两侧.
    #[cfg(test)]
    pub(crate) fn synthetic(
        voxel_count: usize,
        (z_min, z_max): (i32, i32),
        (h_min, h_max): (i32, i32),
        (w_min, w_max): (i32, i32),
        mean_grey: f64,
        centroid: Idx3dF,
    ) -> Self {
        Self {
            voxel_count,
            z_min,
            z_max,
            h_min,
            h_max,
            w_min,
            w_max,
            mean_grey,
            centroid,
        }
    }
}

impl NodeStats for RegionStats {
    fn reduce<'a, I>(stats: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut acc = Self::default();
        for s in stats {
            acc.absorb(s);
        }
        acc
    }
}
