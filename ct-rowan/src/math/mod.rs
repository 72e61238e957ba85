//! 数值工具.
//!
//! 目前只包含一元二次方程求根, 服务于快速行进法的到达时间更新公式.

pub mod quadratic;
