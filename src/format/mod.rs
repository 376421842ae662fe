pub mod filename;
pub mod header;
pub mod stream;
