#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 在已构建好的分区森林 (partition forest) 上自动识别 3D 腹部 CT
//! 中的解剖结构: 脊柱, 脊髓, 肋骨, 主动脉, 肝脏, 肾脏, 脾脏.
//!
//! 该 crate 只负责识别阶段. 体数据的窗宽窗位变换, 梯度幅值计算与分区森林
//! 的构建 (watershed/waterfall) 均由上游完成, 并以 "逐体素属性 + 已建好的
//! 层次划分" 的形式输入.
//!
//! # 注意
//!
//! 1. 体素坐标统一采用 `(z, h, w)` 顺序, z 为切片轴; 叶子线性索引为
//!    `w + h * W + z * W * H`.
//! 2. 在非期望情况下 (上游不变量被破坏), 程序会直接 panic,
//!    而不会导致内存错误. As what Rust promises.
//!
//! # 开发计划
//!
//! ### 一元二次方程求根 ✅
//!
//! 快速行进更新公式的数值基础, 含判别式 ε 带处理.
//!
//! 实现位于 `ct-rowan/src/math/quadratic.rs`.
//!
//! ### 区域统计信息 ✅
//!
//! 体素数, 三轴包围盒, 灰度均值, 质心与宽高比;
//! 节点合并时按体素数加权归并.
//!
//! 实现位于 `ct-rowan/src/forest/stats.rs`.
//!
//! ### 分区森林 ✅
//!
//! 多层全划分层次: `merge_nodes` (向上传播粗化), 祖先查询,
//! 感受区域展开, 合并事件回调列表.
//!
//! 实现位于 `ct-rowan/src/forest`.
//!
//! ### 体积索引森林 ✅
//!
//! 位置与叶子索引的互逆映射, 任意层节点查询, 懒邻接连通分量,
//! 梯度/窗位图像重建.
//!
//! 实现位于 `ct-rowan/src/forest/volume.rs`.
//!
//! ### 快速行进法 ✅
//!
//! 从种子体素出发传播波前, 生成到达时间场; 提供按时间阈值与
//! "首次停止" 两种形状查询.
//!
//! 实现位于 `ct-rowan/src/march`.
//!
//! ### 任务与进度框架 ✅
//!
//! 原子进度计数 + 互斥状态字符串, 可在任务运行时被观察线程轮询;
//! 组合任务按子任务长度累计推进.
//!
//! 实现位于 `ct-rowan/src/jobs`.
//!
//! ### 解剖结构识别管线 ✅
//!
//! 七种结构各自的 "筛选 - 选种 - 生长 - 提交" 流程与组合管线,
//! 全部阈值集中在每结构一份的配置结构体中.
//!
//! 实现位于 `ct-rowan/src/identify`.
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private
//! API 提供文档.

/// 三维索引 (z, h, w), 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 高精度三维坐标 (z, h, w), 用于质心等统计量.
pub type Idx3dF = (f64, f64, f64);

/// 体数据容器与形状操作.
mod volume;

pub use volume::{CtVolume, VolumeShape, VoxelProps};

pub mod consts;

pub mod forest;

pub use forest::{
    Anatomy, MergeEvent, MultiFeatureSelection, NodeId, NodeStats, PartitionForest, RegionStats,
    Selection, VolumeForest,
};

pub mod identify;
pub mod jobs;
pub mod march;
pub mod math;
pub mod prelude;

pub use identify::{multi_feature_pipeline, IdentifyContext};
pub use jobs::{CompositeJob, Job, JobMonitor};
pub use march::FastMarching;
