//! Handler registry
//!
//! Handlers are registered values keyed by their job type string;
//! dispatch is a lookup, not a type hierarchy. An envelope whose type
//! resolves to nothing is a permanent failure of its target version.

use std::collections::HashMap;
use std::sync::Arc;

use wexhub_core::ports::JobHandler;

/// Job handlers keyed by job type
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its own job type; replaces a previous
    /// registration of the same type
    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers
            .insert(handler.job_type().to_string(), handler);
        self
    }

    /// Resolves a job type to its handler
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// The registered job types, for startup logging
    pub fn job_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wexhub_core::domain::job::JobEnvelope;
    use wexhub_core::ports::{ArtifactKind, HandlerArtifact};

    struct NoopHandler(&'static str);

    #[async_trait::async_trait]
    impl JobHandler for NoopHandler {
        fn job_type(&self) -> &str {
            self.0
        }

        async fn run(&self, _envelope: &JobEnvelope) -> anyhow::Result<HandlerArtifact> {
            Ok(HandlerArtifact {
                kind: ArtifactKind::WexBim,
                file_id: wexhub_core::domain::newtypes::FileId::new(),
            })
        }
    }

    #[test]
    fn test_lookup_by_type() {
        let registry = HandlerRegistry::new()
            .register(Arc::new(NoopHandler("alpha")))
            .register(Arc::new(NoopHandler("beta")));
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("beta").is_some());
        assert!(registry.get("gamma").is_none());
        assert_eq!(registry.job_types().len(), 2);
    }
}
