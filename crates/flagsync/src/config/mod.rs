pub mod loader;
pub mod options;

pub use loader::{load_file, parse_str, StaticConfigLoader, STATIC_VERSION};
pub use options::{
    Datasources, OnInitializationFailure, OnNoDefault, Options, OptionsBuilder,
};
