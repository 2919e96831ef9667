//! Shared fixtures for integration tests.
//!
//! Every store-level test runs against both backends through
//! [`for_each_backend`], so the two implementations stay interchangeable.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use studytrack::config::Backend;
use studytrack::store::{Store, open_store};
use studytrack::syllabus::Syllabus;
use studytrack::types::Username;
use tempfile::TempDir;

pub const BACKENDS: [Backend; 2] = [Backend::File, Backend::Sqlite];

pub struct TestStore {
    pub temp_dir: TempDir,
    pub backend: Backend,
    pub store: Arc<dyn Store>,
}

impl TestStore {
    pub fn new(backend: Backend) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = open_store(backend, temp_dir.path(), Some(Duration::from_secs(10)))
            .expect("open store");
        Self {
            temp_dir,
            backend,
            store,
        }
    }

    /// Opens a second, independent handle on the same data directory, the
    /// way another server process would.
    pub fn reopen(&self) -> Arc<dyn Store> {
        open_store(
            self.backend,
            self.temp_dir.path(),
            Some(Duration::from_secs(10)),
        )
        .expect("reopen store")
    }
}

pub fn for_each_backend(test: impl Fn(TestStore)) {
    for backend in BACKENDS {
        test(TestStore::new(backend));
    }
}

pub fn name(raw: &str) -> Username {
    Username::parse(raw).expect("valid username")
}

/// Three topics at different depths: t1, t2 and its sub-topic t3.
pub fn sample_syllabus() -> Syllabus {
    serde_json::from_value(json!({
        "subjects": [{
            "name": "Biotechnology",
            "units": [{
                "name": "Fermentation",
                "topics": [
                    {"id": "t1", "name": "Bioreactors"},
                    {"id": "t2", "name": "Kinetics", "sub_topics": [
                        {"id": "t3", "name": "Monod model"}
                    ]}
                ]
            }]
        }]
    }))
    .expect("valid syllabus")
}
