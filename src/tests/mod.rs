//! Scenario tests spanning the pipeline, the store and the search service.
//!
//! Inference runs on the deterministic `FakeBackend` and photos come from an
//! in-memory gallery, so nothing here needs model files.

mod search;
mod support;
