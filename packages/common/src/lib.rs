pub mod config;
pub mod records;
pub mod storage;

pub use records::{Assignment, Collection, Course, PeerResponse, PeerResponseKey, Record, Submission};
