pub mod grid_space;
pub mod model;
pub mod pathfind;

pub use grid_space::{AreaGrid, GridPos};
pub use model::GridError;
pub use pathfind::find_path;
