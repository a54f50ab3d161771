//! Crate support des benchmarks Ember (voir `benches/`).
