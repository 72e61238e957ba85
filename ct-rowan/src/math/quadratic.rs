//! 一元二次方程 `a * x^2 + b * x + c = 0` 的实根求解.
//!
//! 判别式在 `[-SMALL_EPSILON, SMALL_EPSILON]` 带内视为 0 (重根),
//! 低于该带则认为无实根. 调用方将 "无实根" 解释为 "本次不更新",
//! 绝不会产生 NaN.

/// 判别式与二次项系数的可忽略阈值.
pub const SMALL_EPSILON: f64 = 1e-9;

/// 实根集合.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Roots {
    /// 判别式显著为负, 无实根.
    None,

    /// 判别式落在 ε 带内, 视作重根.
    One(f64),

    /// 两个不同实根, 升序存放.
    Two(f64, f64),
}

impl Roots {
    /// 最大实根. 无实根时返回 `None`.
    #[inline]
    pub fn largest(self) -> Option<f64> {
        match self {
            Roots::None => None,
            Roots::One(r) => Some(r),
            Roots::Two(_, r) => Some(r),
        }
    }

    /// 最小实根. 无实根时返回 `None`.
    #[inline]
    pub fn smallest(self) -> Option<f64> {
        match self {
            Roots::None => None,
            Roots::One(r) => Some(r),
            Roots::Two(r, _) => Some(r),
        }
    }
}

/// 求方程 `a * x^2 + b * x + c = 0` 的全部实根.
///
/// `a` 不可忽略不计 (`|a| > SMALL_EPSILON`), 这是调用方职责.
pub fn roots(a: f64, b: f64, c: f64) -> Roots {
    debug_assert!(a.abs() > SMALL_EPSILON, "二次项系数不可忽略不计");

    let det = b * b - 4.0 * a * c;
    if det > SMALL_EPSILON {
        let sq = det.sqrt();
        let r1 = (-b - sq) / (2.0 * a);
        let r2 = (-b + sq) / (2.0 * a);
        if r1 <= r2 {
            Roots::Two(r1, r2)
        } else {
            Roots::Two(r2, r1)
        }
    } else if det > -SMALL_EPSILON {
        Roots::One(-b / (2.0 * a))
    } else {
        Roots::None
    }
}

/// 最大实根. 无实根时返回 `None`.
#[inline]
pub fn largest_root(a: f64, b: f64, c: f64) -> Option<f64> {
    roots(a, b, c).largest()
}

/// 最小实根. 无实根时返回 `None`.
#[inline]
pub fn smallest_root(a: f64, b: f64, c: f64) -> Option<f64> {
    roots(a, b, c).smallest()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_eq(lhs: f64, rhs: f64) -> bool {
        (lhs - rhs).abs() < 1e-9
    }

    #[test]
    fn test_two_distinct_roots() {
        // (x - 2)(x - 3) = x^2 - 5x + 6.
        let r = roots(1.0, -5.0, 6.0);
        match r {
            Roots::Two(lo, hi) => {
                assert!(f64_eq(lo, 2.0));
                assert!(f64_eq(hi, 3.0));
            }
            _ => panic!("期望两个实根, 实际为 {r:?}"),
        }
        assert!(f64_eq(largest_root(1.0, -5.0, 6.0).unwrap(), 3.0));
        assert!(f64_eq(smallest_root(1.0, -5.0, 6.0).unwrap(), 2.0));
    }

    #[test]
    fn test_two_roots_negative_leading() {
        // -x^2 + 4 = 0 => x = ±2, 升序存放.
        match roots(-1.0, 0.0, 4.0) {
            Roots::Two(lo, hi) => {
                assert!(f64_eq(lo, -2.0));
                assert!(f64_eq(hi, 2.0));
            }
            other => panic!("期望两个实根, 实际为 {other:?}"),
        }
    }

    #[test]
    fn test_repeated_root() {
        // (x - 1)^2 = x^2 - 2x + 1.
        match roots(1.0, -2.0, 1.0) {
            Roots::One(r) => assert!(f64_eq(r, 1.0)),
            other => panic!("期望重根, 实际为 {other:?}"),
        }
    }

    #[test]
    fn test_tiny_discriminant_collapse() {
        // 判别式为 -4e-12, 落在 ε 带内.
        match roots(1.0, 2.0, 1.0 + 1e-12) {
            Roots::One(r) => assert!(f64_eq(r, -1.0)),
            other => panic!("期望重根, 实际为 {other:?}"),
        }
    }

    #[test]
    fn test_no_real_root() {
        // x^2 + 1 = 0.
        assert_eq!(roots(1.0, 0.0, 1.0), Roots::None);
        assert!(largest_root(1.0, 0.0, 1.0).is_none());
        assert!(smallest_root(1.0, 0.0, 1.0).is_none());
    }
}
