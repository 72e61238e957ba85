//! 通用常量.

/// 快速行进法速度函数与扫描参数.
pub mod march {
    /// 速度函数中梯度幅值的指数系数 α.
    pub const ALPHA: f64 = 1.0;

    /// 速度函数的基准系数. 梯度为 0 时波前速度为该值.
    pub const SPEED_COEFFICIENT: f64 = 10.0;

    /// 到达时间的冻结上限. 弹出时间超过该值时传播终止,
    /// 剩余体素保持 `+inf`.
    pub const TIME_CUTOFF: f64 = 100.0;

    /// [`shape_at_first_stop`] 扫描的固定时间步长. 不作为输入参数.
    ///
    /// [`shape_at_first_stop`]: crate::march::FastMarching::shape_at_first_stop
    pub const STOP_DELTA: f64 = 2.0;
}

/// 8-bit 窗位灰度值.
pub mod gray {
    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;
}
