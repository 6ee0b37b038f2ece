pub mod layout;
pub mod tracker;

pub use layout::{compute_grid_layout, GridCell, GridConfig, GridConfigArgs, GridLayout, Viewport};
pub use tracker::GridTracker;
