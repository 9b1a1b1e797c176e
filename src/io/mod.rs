//! I/O abstraction layer for reading source files

pub mod byte_reader;
pub mod local_reader;

pub use byte_reader::ByteReader;
pub use local_reader::LocalFileByteReader;
