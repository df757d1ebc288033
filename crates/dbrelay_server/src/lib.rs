//! Library half of the driver process, split out from `main.rs` so
//! integration tests (in this crate and in `dbrelay_client`) can spin up a
//! real accept loop + worker pool in-process instead of shelling out to the
//! `runner` binary.

pub mod config;
pub mod dispatch;
pub mod server;
