//! Module contract for carik managers
//! 
//! Modules are pluggable units loaded into a manager's module registry.
//! They are constructed through an explicit [`ModuleTable`]; no code is
//! loaded dynamically.

pub mod table;
pub mod trait_def;

pub use table::{ModuleFactory, ModuleTable};
pub use trait_def::{Module, ModuleContext, ModuleEmitter};
