pub mod loader;
pub mod schema;

pub use loader::{
    apply_env, discover, load_from_path, load_from_str, ConfigError, CONFIG_FILE, PORT_ENV,
    ROOT_ENV,
};
pub use schema::{
    Config, ServerConfig, TaggerConfig, TransformConfig, ValidationError, ValidationIssue,
    DEFAULT_PORT,
};
