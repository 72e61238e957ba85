//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Idx3dF};

pub use crate::forest::{
    Anatomy, MergeEvent, MultiFeatureSelection, NodeId, NodeStats, PartitionForest, RegionStats,
    Selection, VolumeForest,
};
pub use crate::volume::{CtVolume, VolumeShape, VoxelProps};

pub use crate::identify::{
    multi_feature_pipeline, AortaConfig, AortaIdentifier, IdentifyContext, KidneysConfig,
    KidneysIdentifier, LiverConfig, LiverIdentifier, RibsConfig, RibsIdentifier, SpinalCordConfig,
    SpinalCordIdentifier, SpineConfig, SpineIdentifier, SpleenConfig, SpleenIdentifier,
};
pub use crate::jobs::{CompositeJob, Job, JobMonitor};
pub use crate::march::FastMarching;

pub use crate::consts::gray::{BLACK, WHITE};
pub use crate::consts::march::{SPEED_COEFFICIENT, STOP_DELTA, TIME_CUTOFF};
