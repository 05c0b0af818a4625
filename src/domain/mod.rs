//! Domain layer - Core types shared by the manager runtime
//! 
//! This layer contains:
//! - Entities: permission levels, migrations, manager events
//! - Traits: Abstractions for collaborators (Database)

pub mod entities;
pub mod traits;
