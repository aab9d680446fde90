mod settings;

pub use settings::{BusConfig, Settings};
