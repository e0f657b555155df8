#![forbid(unsafe_code)]

pub mod duration;
pub mod manager;
pub mod model;
pub mod policy;
pub mod storage;
