#![forbid(unsafe_code)]

pub mod check_info;
pub mod checker;
pub mod codec;
pub mod error;
pub mod file_system;
pub mod hash;
pub mod loader;
pub mod logging;
pub mod manifest;
pub mod migration;
pub mod paths;
pub mod resource_name;
pub mod scan;
pub mod settings;
pub mod tables;

pub use check_info::{CheckInfo, CheckStatus};
pub use checker::{
    CheckContext, CheckEvents, CheckListener, CheckSummary, CheckerOptions, GateState, Phase,
    ReadinessGate, ResourceChecker, ResourceUpdate,
};
pub use error::{CheckError, ManifestSource};
pub use manifest::LoadType;
pub use resource_name::ResourceName;
pub use tables::ResourceTables;
