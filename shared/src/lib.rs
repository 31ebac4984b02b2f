pub mod boundary;
pub mod colors;
pub mod config;
pub mod cooldown;
pub mod gesture;
pub mod grid;
pub mod raster;
pub mod session;
pub mod store;
pub mod sync;
pub mod viewport;

pub use colors::{Color, color_for};
pub use config::GameConfig;
pub use session::{LocalSession, MapSession};
