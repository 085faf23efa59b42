//! Built-in test suites
//!
//! These exercise the framework itself and double as usage examples. Each
//! suite registers its tests with `file!()` so workers can be pointed at the
//! files owning their jobs.

mod basics;
mod expectations;
mod processes;
mod ring_buffer;
mod timing;

use crate::registry::{Registry, RegistryError};

/// Register every built-in suite
pub fn register_all(registry: &mut Registry) -> Result<(), RegistryError> {
    basics::register(registry)?;
    expectations::register(registry)?;
    ring_buffer::register(registry)?;
    timing::register(registry)?;
    processes::register(registry)?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::{ExecutorConfig, TestRunner};
    use crate::process::ProcessSpawner;
    use crate::registry::Selection;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();
        registry
    }

    #[test]
    fn test_suites_register_without_clashes() {
        let registry = registry();
        assert!(registry.len() >= 20);
        assert!(registry.lookup("basics:adds").is_some());
        assert!(registry.iter().all(|t| t.file.starts_with("src/suites/")));
    }

    #[tokio::test]
    async fn test_every_builtin_test_passes() {
        let registry = registry();
        let runner = TestRunner::new(&registry, ExecutorConfig::new(ProcessSpawner::unsampled()));
        let results = runner.run(&Selection::all()).await;

        let failed: Vec<String> = results
            .iter()
            .filter(|r| !r.passed())
            .map(|r| r.to_string())
            .collect();
        assert!(failed.is_empty(), "failing built-in tests: {failed:#?}");
        assert_eq!(results.len(), registry.len());
    }

    #[tokio::test]
    async fn test_selection_by_file() {
        let registry = registry();
        let selection = Selection::all().with_files(vec!["src/suites/timing.rs".into()]);
        let discovered = registry.discover(&selection);
        assert!(!discovered.is_empty());
        assert!(discovered.iter().all(|t| t.suite.as_deref() == Some("timing")));
    }
}
