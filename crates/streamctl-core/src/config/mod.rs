mod dirs;
mod settings;
mod validation;

pub use dirs::config_path;
pub use settings::Config;
pub use validation::warn_unknown_fields;
