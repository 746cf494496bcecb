mod cluster;
mod dists;
mod info;
mod scale;
pub mod util;

pub use cluster::Cluster;
pub use dists::Dists;
pub use info::Info;
pub use scale::Scale;
