//! Package management for corral
//!
//! This crate provides:
//! - Configuration menus and their resolution into typed configs
//! - The [`Package`] contract and the per-call [`PackageContext`]
//! - [`PackageInstance`], which owns a package's lifecycle state
//! - [`PackageRegistry`], which finds package types across repositories
//! - Scripted (package.yaml) and compiled-in package kinds

pub mod builtin;
pub mod instance;
pub mod lifecycle;
pub mod manifest;
pub mod package;
pub mod registry;
pub mod schema;
pub mod scripted;

pub use instance::PackageInstance;
pub use lifecycle::{LifecycleAction, LifecycleState, PackageRecord};
pub use manifest::{PackageKind, PackageManifest, MANIFEST_FILE};
pub use package::{Package, PackageContext, PackagePaths, Runtime};
pub use registry::{AddOutcome, Discovered, PackageFactory, PackageRegistry, RepoListing};
pub use schema::{ConfigMap, ConfigurationOption, ConfigurationSchema, OptionType, ResolvedConfig};
pub use scripted::ScriptedPackage;
