//! 多结构识别管线.

use super::{
    AortaConfig, AortaIdentifier, IdentifyContext, KidneysConfig, KidneysIdentifier, LiverConfig,
    LiverIdentifier, RibsConfig, RibsIdentifier, SpinalCordConfig, SpinalCordIdentifier,
    SpineConfig, SpineIdentifier, SpleenConfig, SpleenIdentifier,
};
use crate::jobs::CompositeJob;

/// 按依赖顺序组装整条识别管线.
///
/// 先识别可作空间参照的骨系结构 (脊柱, 脊髓, 肋骨), 再识别大血管
/// (主动脉), 最后是软组织器官 (肝, 肾, 脾). 全部子作业共享 `context`
/// 的结果集与复合作业的监视器; 任何结构缺席都不会中断后续识别.
pub fn multi_feature_pipeline(context: &IdentifyContext) -> CompositeJob {
    let mut pipeline = CompositeJob::new();
    pipeline.add_job(SpineIdentifier::new(context.clone(), SpineConfig::default()));
    pipeline.add_job(SpinalCordIdentifier::new(
        context.clone(),
        SpinalCordConfig::default(),
    ));
    pipeline.add_job(RibsIdentifier::new(context.clone(), RibsConfig::default()));
    pipeline.add_job(AortaIdentifier::new(context.clone(), AortaConfig::default()));
    pipeline.add_job(LiverIdentifier::new(context.clone(), LiverConfig::default()));
    pipeline.add_job(KidneysIdentifier::new(
        context.clone(),
        KidneysConfig::default(),
    ));
    pipeline.add_job(SpleenIdentifier::new(context.clone(), SpleenConfig::default()));
    pipeline
}
