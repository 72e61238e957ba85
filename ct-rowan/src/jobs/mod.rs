//! 作业与进度框架.
//!
//! 每个作业在调用线程上同步执行至完成; 进度与状态由共享监视器承载,
//! 观察线程可以在作业运行期间随时读取. 进度是单调不减的整数计数,
//! 状态是人类可读的阶段文本, 二者独立同步, 读者不会看到撕裂的更新.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 作业进度监视器.
#[derive(Debug, Default)]
pub struct JobMonitor {
    progress: AtomicUsize,
    status: Mutex<String>,
}

impl JobMonitor {
    /// 初始进度为 0, 状态为空串.
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前进度.
    #[inline]
    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::Acquire)
    }

    /// 当前状态文本的副本.
    pub fn status(&self) -> String {
        self.status.lock().unwrap().clone()
    }

    /// 进度加一. 这是运行中的作业推进进度的唯一正常途径.
    #[inline]
    pub fn increment(&self) {
        self.progress.fetch_add(1, Ordering::Release);
    }

    /// 把进度推进到至少 `target`. 进度只增不减, 落后的目标值被忽略.
    #[inline]
    pub fn advance_to(&self, target: usize) {
        self.progress.fetch_max(target, Ordering::Release);
    }

    /// 更新状态文本.
    pub fn set_status(&self, status: impl Into<String>) {
        *self.status.lock().unwrap() = status.into();
    }
}

/// 可执行的工作单元.
///
/// 监视器可被注入替换, 复合作业以此让全部子作业共享同一个监视器;
/// 实现者应只通过自己的监视器报告进度与状态.
pub trait Job: Send {
    /// 同步执行至完成.
    fn execute(&mut self);

    /// 总步数, 在执行前就已固定, 用于把进度归一化成百分比.
    fn length(&self) -> usize;

    /// 当前监视器.
    fn monitor(&self) -> &Arc<JobMonitor>;

    /// 替换监视器.
    fn set_monitor(&mut self, monitor: Arc<JobMonitor>);

    /// 当前进度.
    fn progress(&self) -> usize {
        self.monitor().progress()
    }

    /// 当前状态文本.
    fn status(&self) -> String {
        self.monitor().status()
    }

    /// 执行并把进度对齐到总步数.
    fn run(&mut self) {
        self.execute();
        let length = self.length();
        self.monitor().advance_to(length);
    }
}

/// 顺序执行的复合作业.
///
/// 子作业在加入时即共享复合作业的监视器; 每个子作业结束后进度对齐到
/// 累计步数边界, 因此提前返回的子作业仍然占满自己的长度.
#[derive(Default)]
pub struct CompositeJob {
    jobs: Vec<Box<dyn Job>>,
    monitor: Arc<JobMonitor>,
}

impl CompositeJob {
    /// 不含任何子作业的复合作业.
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加子作业, 并把它的监视器替换为共享监视器.
    pub fn add_job<J: Job + 'static>(&mut self, mut job: J) {
        job.set_monitor(Arc::clone(&self.monitor));
        self.jobs.push(Box::new(job));
    }

    /// 子作业个数.
    #[inline]
    pub fn job_len(&self) -> usize {
        self.jobs.len()
    }
}

impl Job for CompositeJob {
    fn execute(&mut self) {
        let mut completed = 0;
        for job in &mut self.jobs {
            job.execute();
            completed += job.length();
            self.monitor.advance_to(completed);
        }
    }

    fn length(&self) -> usize {
        self.jobs.iter().map(|job| job.length()).sum()
    }

    fn monitor(&self) -> &Arc<JobMonitor> {
        &self.monitor
    }

    fn set_monitor(&mut self, monitor: Arc<JobMonitor>) {
        for job in &mut self.jobs {
            job.set_monitor(Arc::clone(&monitor));
        }
        self.monitor = monitor;
    }
}
