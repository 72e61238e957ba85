//! 合成体模演示.
//!
//! 构造一个含椎骨, 脊髓, 主动脉与肝脏的数字体模, 在其分区森林上运行
//! 完整的多特征识别流水线: 工作线程执行, 主线程轮询进度, 结束后打印
//! 各已识别结构的统计量. 肋骨, 肾脏与脾脏在体模中没有对应结构,
//! 相应识别器静默退化, 不产生标签.

use ct_rowan::prelude::*;
use log::info;
use ndarray::Array3;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 体模形状 (z, h, w).
const SHAPE: Idx3d = (4, 64, 64);

/// 背景软组织灰度.
const BACKGROUND_GREY: u8 = 40;

/// 全场统一的梯度幅值. 在该幅值下波前离不开种子集合, 每个结构的
/// 生长形状就是其灰度带内的全部体素.
const EDGE_GRADIENT: i16 = 30;

/// 体模中一个贯穿全部切片的长方体结构.
struct Structure {
    /// 结构名, 仅用于日志.
    name: &'static str,

    /// 层 1 节点索引. 0 号留给背景.
    group: usize,

    /// 窗位灰度.
    grey: u8,

    /// h 向半开区间.
    rows: (usize, usize),

    /// w 向半开区间.
    cols: (usize, usize),
}

impl Structure {
    const fn new(
        name: &'static str,
        group: usize,
        grey: u8,
        rows: (usize, usize),
        cols: (usize, usize),
    ) -> Self {
        Self {
            name,
            group,
            grey,
            rows,
            cols,
        }
    }
}

/// 依涂画顺序排列. 脊髓晚于椎骨涂画, 因此嵌在椎骨包围盒内部.
const STRUCTURES: [Structure; 4] = [
    Structure::new("vertebra", 1, 230, (30, 63), (14, 50)),
    Structure::new("spinal cord", 2, 100, (40, 57), (24, 42)),
    Structure::new("aorta", 3, 180, (8, 24), (35, 57)),
    Structure::new("liver", 4, 170, (2, 28), (2, 32)),
];

/// 涂画全部结构, 组装体数据与叶子归属, 返回识别上下文.
fn phantom_context() -> IdentifyContext {
    let (depth, height, width) = SHAPE;
    let mut windowed = Array3::from_elem(SHAPE, BACKGROUND_GREY);
    let mut assignment = vec![0_usize; depth * height * width];

    for s in &STRUCTURES {
        let mut voxels = 0_usize;
        for z in 0..depth {
            for h in s.rows.0..s.rows.1 {
                for w in s.cols.0..s.cols.1 {
                    windowed[(z, h, w)] = s.grey;
                    assignment[w + h * width + z * width * height] = s.group;
                    voxels += 1;
                }
            }
        }
        info!("painted {} voxels of {} at grey {}", voxels, s.name, s.grey);
    }

    let base = windowed.mapv(i32::from);
    let gradient = Array3::from_elem(SHAPE, EDGE_GRADIENT);
    let volume = Arc::new(CtVolume::new(base, windowed, gradient));
    let forest = Arc::new(VolumeForest::new(Arc::clone(&volume), &assignment));
    IdentifyContext::new(volume, forest)
}

fn main() {
    simple_logger::init_with_level(log::Level::Info).expect("Logger init error");

    let context = phantom_context();
    let mut pipeline = multi_feature_pipeline(&context);
    let total = pipeline.length();
    let monitor = Arc::clone(pipeline.monitor());

    println!("Running multi-feature identification...");
    thread::scope(|s| {
        let worker = s.spawn(move || pipeline.run());
        while monitor.progress() < total {
            println!("[{:2}/{total}] {}", monitor.progress(), monitor.status());
            thread::sleep(Duration::from_millis(20));
        }
        worker.join().expect("Thread joining error");
    });
    println!("[{total}/{total}] all identifiers finished");

    let selection = context.selection();
    let results = selection.lock().expect("Selection lock poisoned");
    println!("\nIdentified {} structures:", results.len());
    for (label, _, stats) in results.iter() {
        println!(
            "  {label}: {} voxels, z {}..={}, h {}..={}, w {}..={}, mean grey {:.1}",
            stats.voxel_count(),
            stats.z_min(),
            stats.z_max(),
            stats.h_min(),
            stats.h_max(),
            stats.w_min(),
            stats.w_max(),
            stats.mean_grey(),
        );
    }
}
