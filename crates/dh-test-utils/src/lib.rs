//! Testing utilities for the drill-hole editing workspace
//!
//! Shared backends, fixtures and editor setup.

#![allow(missing_docs)]

pub mod backend;
pub mod fixtures;

pub use backend::MemoryBackend;

use dh_engine::{EngineConfig, Permissions, SectionEditor};
use dh_model::AggregateId;
use dh_store::SectionRegistry;
use std::sync::Arc;

/// Seeded backend and an editor wired to it
pub struct TestBench {
    pub backend: Arc<MemoryBackend>,
    pub editor: SectionEditor,
    pub hole: AggregateId,
}

pub fn setup_with(registry: Arc<SectionRegistry>, config: EngineConfig) -> TestBench {
    let backend = Arc::new(MemoryBackend::new(&registry));
    backend.seed(fixtures::hole("DH-1"));
    let editor = SectionEditor::new(registry, backend.clone(), backend.clone(), config);
    TestBench {
        backend,
        editor,
        hole: AggregateId::new("DH-1"),
    }
}

/// Fixture registry, one seeded hole, a user holding every permission
pub fn setup() -> TestBench {
    setup_with(fixtures::registry(), EngineConfig::new("geo1").with_permissions(Permissions::all()))
}

/// As [`setup`] with the hole already loaded
pub async fn setup_loaded() -> TestBench {
    let bench = setup();
    bench
        .editor
        .load_aggregate(&bench.hole, false)
        .await
        .expect("fixture hole loads");
    bench
}
