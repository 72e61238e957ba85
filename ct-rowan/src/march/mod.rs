//! 基于快速行进法的波前传播.
//!
//! 从种子体素出发, 波前按速度场 `F(x) = SPEED_COEFFICIENT * e^(-ALPHA * g(x))`
//! 在网格上扩张, 其中 `g` 为梯度幅值: 波前在均匀组织内扩张快, 跨越强边缘时
//! 扩张慢. 到达时间按非降序逐体素冻结, 候选时间由各坐标轴上已冻结邻居的
//! 二次更新规则解出, 是网格上单源最短路的梯度一致推广.
//!
//! 完整时间场在构造时一次性计算完毕, 之后的查询均为只读投影; 输入改变时
//! 重新构造求解器即可.

use binary_heap_plus::BinaryHeap;
use log::debug;
use ndarray::{Array3, ArrayView3};
use num::ToPrimitive;

use crate::math::quadratic;
use crate::volume::VolumeShape;
use crate::{consts, Idx3d};

/// 快速行进求解器, 持有冻结后的到达时间场.
///
/// 未被波前到达的位置 (种子不可达, 或传播因超过
/// [`TIME_CUTOFF`](consts::march::TIME_CUTOFF) 提前终止) 的时间为 `+inf`.
#[derive(Debug)]
pub struct FastMarching {
    times: Array3<f64>,
}

impl VolumeShape for FastMarching {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.times.dim()
    }
}

impl FastMarching {
    /// 在梯度幅值图上从 `seeds` 出发传播波前, 计算完整到达时间场.
    ///
    /// 空种子列表是合法输入, 产生全 `+inf` 的时间场, 两种形状查询均返回
    /// 空集; 种子位置越界则 panic.
    pub fn new<S>(gradients: ArrayView3<'_, S>, seeds: &[Idx3d]) -> Self
    where
        S: Copy + ToPrimitive,
    {
        let mut solver = Self {
            times: Array3::from_elem(gradients.raw_dim(), f64::INFINITY),
        };
        solver.propagate(gradients, seeds);
        solver
    }

    /// `pos` 处的到达时间; 未被波前到达的位置为 `+inf`.
    #[inline]
    pub fn arrival_time(&self, pos: Idx3d) -> f64 {
        self.times[pos]
    }

    /// 到达时间不超过 `time` 的全部体素位置, 按位置升序排列.
    pub fn shape_at_time(&self, time: f64) -> Vec<Idx3d> {
        self.times
            .indexed_iter()
            .filter(|&(_, &t)| t <= time)
            .map(|(pos, _)| pos)
            .collect()
    }

    /// 首次增长停滞时刻的形状.
    ///
    /// 将全部已冻结的到达时间升序排列, 以固定步长
    /// [`STOP_DELTA`](consts::march::STOP_DELTA) 逐段扫描, 累计每段新增的
    /// 体素数; 某段新增数首次低于 `threshold` (或体素耗尽) 时停止, 返回
    /// 时间不超过该段上界的全部体素. 这是可调阈值的启发式停机准则, 不是
    /// 精确的收敛判定.
    pub fn shape_at_first_stop(&self, threshold: usize) -> Vec<Idx3d> {
        use ordered_float::NotNan;

        let mut finalized: Vec<(f64, Idx3d)> = self
            .times
            .indexed_iter()
            .filter(|&(_, &t)| t.is_finite())
            .map(|(pos, &t)| (t, pos))
            .collect();
        // 已过滤为有限值, 不会是 NaN.
        finalized.sort_unstable_by_key(|&(t, pos)| (NotNan::<f64>::new(t).unwrap(), pos));

        let mut taken = 0;
        let mut upper = consts::march::STOP_DELTA;
        loop {
            let mut added = 0_usize;
            while taken < finalized.len() && finalized[taken].0 <= upper {
                taken += 1;
                added += 1;
            }
            if added < threshold || taken == finalized.len() {
                break;
            }
            upper += consts::march::STOP_DELTA;
        }

        finalized[..taken].iter().map(|&(_, pos)| pos).collect()
    }

    fn propagate<S>(&mut self, gradients: ArrayView3<'_, S>, seeds: &[Idx3d])
    where
        S: Copy + ToPrimitive,
    {
        // 堆顶时间最小, 同时间者按位置字典序.
        let mut heap: BinaryHeap<(f64, Idx3d), _> =
            BinaryHeap::new_by(|a: &(f64, Idx3d), b: &(f64, Idx3d)| {
                b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1))
            });
        heap.reserve(seeds.len());

        // 每个位置已入队的最优候选时间, 用于抑制无改进的重复入队.
        let mut best = Array3::from_elem(self.times.raw_dim(), f64::INFINITY);
        for &seed in seeds {
            assert!(self.check(&seed), "种子位置 {seed:?} 越界");
            if best[seed] > 0.0 {
                best[seed] = 0.0;
                heap.push((0.0, seed));
            }
        }

        let mut frozen = 0_usize;
        while let Some((time, pos)) = heap.pop() {
            // 速度系数在近乎均匀的区域中对浮点误差极不敏感,
            // 弹出时间超过哨兵上限就整体停止.
            if time > consts::march::TIME_CUTOFF {
                break;
            }
            if self.times[pos].is_finite() {
                continue;
            }
            self.times[pos] = time;
            frozen += 1;

            for npos in self.diamond_neighbours(pos) {
                if self.times[npos].is_finite() {
                    continue;
                }
                let Some(candidate) = self.compute_time_at(npos, gradients[npos]) else {
                    continue;
                };
                if candidate < best[npos] {
                    best[npos] = candidate;
                    heap.push((candidate, npos));
                }
            }
        }
        debug!("快速行进完成: 冻结 {frozen}/{} 个体素", self.size());
    }

    /// 由已冻结的轴向邻居推导 `pos` 处的候选到达时间.
    ///
    /// 每个坐标轴取两侧冻结时间的较小者, 两侧皆未冻结的轴不参与;
    /// 方程无实根说明邻居时间局部不一致, 返回 `None` 视作无改进.
    fn compute_time_at<S>(&self, (z, h, w): Idx3d, gradient: S) -> Option<f64>
    where
        S: ToPrimitive,
    {
        let g = gradient.to_f64()?;
        let speed = consts::march::SPEED_COEFFICIENT;
        let mut a = 0.0;
        let mut b = 0.0;
        let mut c = -(2.0 * consts::march::ALPHA * g).exp() / (speed * speed);

        let axes = [
            [(z.wrapping_sub(1), h, w), (z.saturating_add(1), h, w)],
            [(z, h.wrapping_sub(1), w), (z, h.saturating_add(1), w)],
            [(z, h, w.wrapping_sub(1)), (z, h, w.saturating_add(1))],
        ];
        for [lo, hi] in axes {
            let adj = self.frozen_time(lo).min(self.frozen_time(hi));
            if adj.is_finite() {
                a += 1.0;
                b += -2.0 * adj;
                c += adj * adj;
            }
        }
        quadratic::largest_root(a, b, c)
    }

    /// 越界或未冻结的位置视为无穷大时间.
    #[inline]
    fn frozen_time(&self, pos: Idx3d) -> f64 {
        if self.check(&pos) {
            self.times[pos]
        } else {
            f64::INFINITY
        }
    }
}
