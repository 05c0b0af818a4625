//! Module loading for carik managers
//! 
//! Module sources are YAML manifests in `<modules>/<manager>/modules/`.
//! Each manifest names a factory from the manager's registration table.

pub mod loader;
pub mod manifest;
pub mod registry;

pub use loader::{LoadOptions, LoadReport, ModuleCandidate, ModuleLoader, INTERNAL_PREFIX};
pub use manifest::ModuleManifest;
pub use registry::ModuleRegistry;
