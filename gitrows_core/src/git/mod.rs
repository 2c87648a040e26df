//! Plumbing invoker: every git subprocess the engine starts goes through here.

mod clone;
mod command;
mod records;

pub use clone::{clone_bare, GitVersion, MINIMUM_GIT_VERSION};
pub use command::{GitCli, GitStream};
pub use records::{
    is_object_hash, RawRecord, RecordMarker, RecordReader, RECORD_SEPARATOR, UNIT_SEPARATOR,
};
