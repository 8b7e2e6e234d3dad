// Resgraph Library
// Resource graph model - capabilities, requirements, filters and versions

pub mod builder;
pub mod filter;
pub mod ns;
pub mod resource;
pub mod value;
pub mod version;

// Lookup structures
pub mod index;
pub mod repository;

// Re-export the core model types
pub use crate::builder::{BuildError, CapabilityBuilder, RequirementBuilder, ResourceBuilder};
pub use crate::filter::{Filter, FilterError};
pub use crate::index::CapabilityIndex;
pub use crate::repository::{Repository, ResourcesRepository};
pub use crate::resource::{
    Capability, GraphError, Requirement, Resource, ResourceIdentity, Wire,
};
pub use crate::value::{AttrValue, Attrs, Directives};
pub use crate::version::{Version, VersionError, VersionRange};
