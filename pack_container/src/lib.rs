#![forbid(unsafe_code)]

pub mod archive;
pub mod pack;

pub use archive::{write_atomically, PackArchive};
pub use pack::{
    build_pack, parse_pack, read_pack, PackEntry, PackError, PackFile, MAX_ENTRY_NAME_LEN,
};
