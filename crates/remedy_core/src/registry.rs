//! Fix handler registry keyed by issue type.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::fix::FixHandler;

/// Maps issue types to the handler that fixes them.
#[derive(Default, Clone)]
pub struct FixRegistry {
    handlers: HashMap<String, Arc<dyn FixHandler>>,
}

impl FixRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an issue type, replacing any previous one.
    pub fn register(&mut self, issue_type: impl Into<String>, handler: Arc<dyn FixHandler>) {
        let issue_type = issue_type.into();
        debug!("Registering fix handler {} for {}", handler.name(), issue_type);
        self.handlers.insert(issue_type, handler);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, issue_type: impl Into<String>, handler: Arc<dyn FixHandler>) -> Self {
        self.register(issue_type, handler);
        self
    }

    pub fn get(&self, issue_type: &str) -> Option<Arc<dyn FixHandler>> {
        self.handlers.get(issue_type).cloned()
    }

    pub fn get_required(&self, issue_type: &str) -> CoreResult<Arc<dyn FixHandler>> {
        self.get(issue_type)
            .ok_or_else(|| CoreError::HandlerNotFound(issue_type.to_string()))
    }

    pub fn contains(&self, issue_type: &str) -> bool {
        self.handlers.contains_key(issue_type)
    }

    /// Registered issue types, sorted.
    pub fn issue_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn unregister(&mut self, issue_type: &str) -> Option<Arc<dyn FixHandler>> {
        self.handlers.remove(issue_type)
    }
}

impl std::fmt::Debug for FixRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixRegistry")
            .field("issue_types", &self.issue_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;

    use super::*;
    use crate::fix::FixWorkspace;
    use crate::issue::{FixDescriptor, Issue};

    struct Noop;

    #[async_trait]
    impl FixHandler for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn supports(&self, fix: &FixDescriptor) -> bool {
            matches!(fix, FixDescriptor::RemoveLine { .. })
        }

        async fn apply(&self, _: &Issue, _: &FixDescriptor, _: &mut FixWorkspace) -> CoreResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_operations() {
        let mut registry = FixRegistry::new();
        assert!(registry.is_empty());

        registry.register("debugger_statement", Arc::new(Noop));
        registry.register("console_log_statement", Arc::new(Noop));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("debugger_statement"));
        assert_eq!(registry.issue_types(), vec!["console_log_statement", "debugger_statement"]);

        let handler = registry.get_required("debugger_statement").unwrap();
        assert!(handler.supports(&FixDescriptor::RemoveLine {
            file: PathBuf::from("a.ts"),
            line: 1,
            expected: "debugger;".to_string(),
        }));

        assert!(matches!(
            registry.get_required("missing_alt_text"),
            Err(CoreError::HandlerNotFound(_))
        ));

        registry.unregister("debugger_statement");
        assert!(!registry.contains("debugger_statement"));
        assert!(format!("{:?}", registry).contains("console_log_statement"));
    }
}
