pub mod image_io;
pub mod raw;

pub use image_io::{load_image, save_image};
pub use raw::{read_raw_volume, write_raw_volume};
