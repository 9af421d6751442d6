//! Layer integration tests.
//!
//! These tests write real files through the public API and read them back,
//! covering the indexed and sequential write paths end to end.

mod batch_test;
mod corruption_test;
mod roundtrip_test;
mod spatial_query_test;
mod write_target_test;
