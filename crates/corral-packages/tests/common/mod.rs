//! Common test utilities for corral-packages
//!
//! - `mocks`: a scripted host transport and a package that records calls
//! - `fixtures`: repositories and runtimes built inside a temp directory

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
