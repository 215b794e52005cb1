//! Courier channel worker.
//!
//! A worker process serves exactly one channel: it runs `WORKER_CONCURRENCY`
//! consumer instances against that channel's topic and exposes the channel's
//! metrics over HTTP.

pub mod runner;
pub mod server;
