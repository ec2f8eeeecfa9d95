pub mod csv_loader;

pub use csv_loader::{file_matches_rows, read_rows, read_summary, remove_if_exists, write_rows, write_summary};
