//! Test fixtures

mod swarm;

pub use swarm::{SwarmFixture, pattern};
