//! Project-level configuration loaded from `.credvault.toml`.

pub mod settings;

pub use settings::Settings;
