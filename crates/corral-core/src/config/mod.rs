//! Persisted configuration store

mod store;

pub use store::{
    load_yaml, save_yaml, ConfigStore, CorralConfig, BUILTIN_REPO, DEFAULT_COMMAND_TIMEOUT_SECS,
    ENV_DIR_NAME,
};
