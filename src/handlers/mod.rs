pub mod snap_handler;

pub use snap_handler::{format_snap_summary, SnapHandler};
