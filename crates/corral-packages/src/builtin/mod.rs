//! Packages compiled into corral

pub mod orangefs;

pub use orangefs::Orangefs;

use corral_core::config::BUILTIN_REPO;

use crate::registry::PackageRegistry;

/// Register the packages of the builtin repository
pub fn register(registry: &mut PackageRegistry) {
    registry.register(BUILTIN_REPO, orangefs::PACKAGE_TYPE, orangefs::factory);
}
