//! 体数据容器与形状操作.
//!
//! 识别阶段消费三份对齐的逐体素属性: 原始值 (HU 基准), 窗位灰度值
//! (所有判别阈值均作用于它) 与梯度幅值 (快速行进法的速度来源).
//! 三者均由上游计算完毕后传入, 本模块不做任何像素变换.

use crate::Idx3d;
use ndarray::{Array3, ArrayView3};
use std::ops::Index;

/// 体数据的共用形状属性与邻域操作.
///
/// 叶子线性索引按 `w + h * W + z * W * H` 编码, 与 C 序
/// `(z, h, w)` 数组的内存顺序一致.
pub trait VolumeShape {
    /// 获取数据形状大小 `(z, h, w)`.
    fn shape(&self) -> Idx3d;

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 位置到叶子线性索引的映射. 任一轴越界时返回 `None`.
    #[inline]
    fn leaf_of_position(&self, pos: &Idx3d) -> Option<usize> {
        if !self.check(pos) {
            return None;
        }
        let (_, h, w) = self.shape();
        let (z0, h0, w0) = *pos;
        Some(w0 + h0 * w + z0 * w * h)
    }

    /// 叶子线性索引到位置的映射, 是 [`leaf_of_position`] 的精确逆.
    ///
    /// 索引必须小于体素个数, 否则 panic.
    ///
    /// [`leaf_of_position`]: VolumeShape::leaf_of_position
    #[inline]
    fn position_of_leaf(&self, index: usize) -> Idx3d {
        assert!(index < self.size(), "叶子索引 {index} 超出体素个数");
        let (_, h, w) = self.shape();
        (index / (w * h), (index / w) % h, index % w)
    }

    /// 获取 `pos` 前后上下左右六个点的坐标.
    ///
    /// 在数据范围外的坐标会被过滤掉, 不会包含在返回值中.
    fn diamond_neighbours(&self, (z, h, w): Idx3d) -> Vec<Idx3d> {
        [
            (z.wrapping_sub(1), h, w),
            (z.saturating_add(1), h, w),
            (z, h.wrapping_sub(1), w),
            (z, h.saturating_add(1), w),
            (z, h, w.wrapping_sub(1)),
            (z, h, w.saturating_add(1)),
        ]
        .into_iter()
        .filter(|p| self.check(p))
        .collect()
    }
}

/// 单个体素的叶子属性三元组.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VoxelProps {
    /// 原始体素值 (HU 基准).
    pub base: i32,

    /// 窗位灰度值. 识别判别均以该值为准.
    pub grey: u8,

    /// 梯度幅值.
    pub gradient: i16,
}

/// 3D 腹部 CT 体数据.
///
/// 持有三份形状一致的逐体素数组. `Index<Idx3d>` 返回窗位灰度值.
#[derive(Debug, Clone)]
pub struct CtVolume {
    base: Array3<i32>,
    windowed: Array3<u8>,
    gradient: Array3<i16>,
}

impl VolumeShape for CtVolume {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.windowed.dim()
    }
}

impl Index<Idx3d> for CtVolume {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.windowed[index]
    }
}

impl CtVolume {
    /// 由三份对齐的逐体素数组构造体数据.
    ///
    /// 三个数组形状必须一致, 且体素个数不可为 0, 否则 panic.
    pub fn new(base: Array3<i32>, windowed: Array3<u8>, gradient: Array3<i16>) -> Self {
        assert_eq!(base.dim(), windowed.dim(), "原始值与窗位灰度形状不一致");
        assert_eq!(base.dim(), gradient.dim(), "原始值与梯度幅值形状不一致");
        assert_ne!(base.len(), 0, "体数据不可为空");
        debug_assert!(windowed.is_standard_layout());

        Self {
            base,
            windowed,
            gradient,
        }
    }

    /// 某体素的叶子属性三元组. 越界时 panic.
    #[inline]
    pub fn voxel_props(&self, pos: Idx3d) -> VoxelProps {
        VoxelProps {
            base: self.base[pos],
            grey: self.windowed[pos],
            gradient: self.gradient[pos],
        }
    }

    /// 原始体素值 (HU 基准). 越界时 panic.
    #[inline]
    pub fn base_value(&self, pos: Idx3d) -> i32 {
        self.base[pos]
    }

    /// 窗位灰度值. 越界时 panic.
    #[inline]
    pub fn grey_value(&self, pos: Idx3d) -> u8 {
        self.windowed[pos]
    }

    /// 梯度幅值. 越界时 panic.
    #[inline]
    pub fn gradient_value(&self, pos: Idx3d) -> i16 {
        self.gradient[pos]
    }

    /// 窗位灰度图视图.
    #[inline]
    pub fn windowed_image(&self) -> ArrayView3<'_, u8> {
        self.windowed.view()
    }

    /// 梯度幅值图视图.
    #[inline]
    pub fn gradient_image(&self) -> ArrayView3<'_, i16> {
        self.gradient.view()
    }
}
