//! Test helper modules for musi-player integration tests
//!
//! - fakes: in-process catalog, probe and sink with call recording
//! - harness: controller / command handler wiring and polling helpers

#![allow(dead_code)]

pub mod fakes;
pub mod harness;

pub use fakes::{FakeCatalog, FakeProbe, FakeSink, FakeSinkFactory, Gate};
pub use harness::{drain, test_track, wait_until, CommandHarness, Harness, BOT, CHANNEL, GUILD};
