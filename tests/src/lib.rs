//! # Swarm Test Suite
//!
//! Unified test crate for behavior that spans crates.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── bus_benchmarks.rs   # Publish throughput (criterion)
//! └── src/
//!     └── integration/
//!         ├── bus_flows.rs        # Fan-out, async delivery, isolation, counters
//!         └── lifecycle_flows.rs  # Module lifecycle through the bus
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p swarm-tests
//!
//! # By category
//! cargo test -p swarm-tests integration::bus_flows
//! cargo test -p swarm-tests integration::lifecycle_flows
//!
//! # Benchmarks
//! cargo bench -p swarm-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
