pub mod algo;
pub mod error;
pub mod ops;

#[cfg(feature = "mcp")]
pub mod mcp;

#[cfg(feature = "plugin")]
pub mod commands;

#[cfg(feature = "plugin")]
use nu_plugin::{Plugin, PluginCommand};

#[cfg(feature = "plugin")]
pub struct TopicStatePlugin;

#[cfg(feature = "plugin")]
impl Plugin for TopicStatePlugin {
    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").into()
    }

    fn commands(&self) -> Vec<Box<dyn PluginCommand<Plugin = Self>>> {
        vec![
            Box::new(commands::Info),
            Box::new(commands::Dists),
            Box::new(commands::Scale),
            Box::new(commands::Cluster),
        ]
    }
}
