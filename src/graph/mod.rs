pub mod network;
pub use network::*;
pub mod graph;
pub use graph::*;
pub mod astar;
pub use astar::*;
