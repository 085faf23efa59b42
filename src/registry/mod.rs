//! Test registration and discovery
//!
//! Tests are registered explicitly into a [`Registry`] that is built once and
//! passed by reference to discovery, scheduling and dispatch.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::executor::TestContext;
use crate::models::qualify;

/// Registry errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Test {0} is already registered")]
    Duplicate(String),

    #[error("Test name must not be empty")]
    EmptyName,

    #[error("Test name {0:?} must not contain ':'")]
    InvalidName(String),
}

pub type SyncBody = Arc<dyn Fn(&TestContext) -> anyhow::Result<()> + Send + Sync>;
pub type AsyncBody =
    Arc<dyn Fn(TestContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A test function, synchronous or asynchronous
#[derive(Clone)]
pub enum TestBody {
    Sync(SyncBody),
    Async(AsyncBody),
}

impl TestBody {
    pub fn is_async(&self) -> bool {
        matches!(self, TestBody::Async(_))
    }
}

impl fmt::Debug for TestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestBody::Sync(_) => write!(f, "TestBody::Sync"),
            TestBody::Async(_) => write!(f, "TestBody::Async"),
        }
    }
}

/// A test waiting to be registered
#[derive(Clone, Debug)]
pub struct TestDef {
    pub name: String,
    pub suite: Option<String>,
    pub file: String,
    pub body: TestBody,
}

impl TestDef {
    pub fn sync<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&TestContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            suite: None,
            file: String::from("<unknown>"),
            body: TestBody::Sync(Arc::new(body)),
        }
    }

    pub fn asynchronous<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body: AsyncBody = Arc::new(move |ctx| Box::pin(body(ctx)));
        Self {
            name: name.into(),
            suite: None,
            file: String::from("<unknown>"),
            body: TestBody::Async(body),
        }
    }

    pub fn suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = Some(suite.into());
        self
    }

    /// Source file owning the test, normally `file!()`
    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }
}

/// Opaque reference to a registered test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestHandle(usize);

/// A test as stored in the registry
#[derive(Clone, Debug)]
pub struct RegisteredTest {
    pub handle: TestHandle,
    pub name: String,
    pub suite: Option<String>,
    pub file: String,
    pub body: TestBody,
}

impl RegisteredTest {
    pub fn qualified_name(&self) -> String {
        qualify(self.suite.as_deref(), &self.name)
    }
}

/// All known tests, in registration order
#[derive(Debug, Default)]
pub struct Registry {
    tests: Vec<RegisteredTest>,
    by_name: HashMap<String, TestHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: TestDef) -> Result<TestHandle, RegistryError> {
        if def.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if def.name.contains(':') {
            return Err(RegistryError::InvalidName(def.name));
        }

        let qualified = qualify(def.suite.as_deref(), &def.name);
        if self.by_name.contains_key(&qualified) {
            return Err(RegistryError::Duplicate(qualified));
        }

        let handle = TestHandle(self.tests.len());
        self.tests.push(RegisteredTest {
            handle,
            name: def.name,
            suite: def.suite,
            file: def.file,
            body: def.body,
        });
        self.by_name.insert(qualified, handle);
        Ok(handle)
    }

    pub fn get(&self, handle: TestHandle) -> Option<&RegisteredTest> {
        self.tests.get(handle.0)
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<&RegisteredTest> {
        self.by_name
            .get(qualified_name)
            .and_then(|handle| self.get(*handle))
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTest> {
        self.tests.iter()
    }

    /// Tests matching the selection, in registration order
    pub fn discover(&self, selection: &Selection) -> Vec<&RegisteredTest> {
        self.tests.iter().filter(|t| selection.matches(t)).collect()
    }
}

/// Filter predicate over registered tests
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// `suite:name` or bare `name`; empty selects everything
    pub specifiers: Vec<String>,
    /// Exact specifier matching instead of substring matching
    pub exact: bool,
    /// Only tests owned by these source files; empty allows all
    pub files: Vec<String>,
    /// Only tests whose source file lives under this directory
    pub target_dir: Option<PathBuf>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn exact(specifiers: Vec<String>) -> Self {
        Self {
            specifiers,
            exact: true,
            ..Default::default()
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    pub fn matches(&self, test: &RegisteredTest) -> bool {
        if !self.files.is_empty() && !self.files.iter().any(|f| *f == test.file) {
            return false;
        }
        if let Some(dir) = &self.target_dir {
            if !Path::new(&test.file).starts_with(dir) {
                return false;
            }
        }
        if self.specifiers.is_empty() {
            return true;
        }

        // Exact mode compares the whole specifier, so a bare `name` selects
        // only the suite-less test of that name.
        let qualified = test.qualified_name();
        self.specifiers.iter().any(|spec| {
            if self.exact {
                *spec == qualified
            } else {
                qualified.contains(spec.as_str())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(TestDef::sync("adds", |_| Ok(())).suite("math").file("src/math.rs"))
            .unwrap();
        registry
            .register(TestDef::sync("adds_more", |_| Ok(())).suite("math").file("src/math.rs"))
            .unwrap();
        registry
            .register(TestDef::asynchronous("fetches", |_| async { Ok(()) }).file("src/net/io.rs"))
            .unwrap();
        registry
    }

    fn names(tests: Vec<&RegisteredTest>) -> Vec<String> {
        tests.into_iter().map(|t| t.qualified_name()).collect()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        let handle = registry
            .register(TestDef::sync("a", |_| Ok(())).suite("s"))
            .unwrap();
        assert_eq!(registry.get(handle).unwrap().name, "a");
        assert!(registry.lookup("s:a").is_some());
        assert!(registry.lookup("a").is_none());
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_names() {
        let mut registry = registry();
        assert_eq!(
            registry
                .register(TestDef::sync("adds", |_| Ok(())).suite("math"))
                .unwrap_err(),
            RegistryError::Duplicate("math:adds".into())
        );
        assert_eq!(
            registry.register(TestDef::sync("", |_| Ok(()))).unwrap_err(),
            RegistryError::EmptyName
        );
        assert!(matches!(
            registry.register(TestDef::sync("a:b", |_| Ok(()))),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_discover_all_in_order() {
        let registry = registry();
        assert_eq!(
            names(registry.discover(&Selection::all())),
            vec!["math:adds", "math:adds_more", "fetches"]
        );
    }

    #[test]
    fn test_exact_vs_loose() {
        let registry = registry();
        let exact = Selection::exact(vec!["math:adds".into()]);
        assert_eq!(names(registry.discover(&exact)), vec!["math:adds"]);

        let loose = Selection {
            specifiers: vec!["math:adds".into()],
            ..Default::default()
        };
        assert_eq!(
            names(registry.discover(&loose)),
            vec!["math:adds", "math:adds_more"]
        );

        let bare = Selection::exact(vec!["fetches".into()]);
        assert_eq!(names(registry.discover(&bare)), vec!["fetches"]);
    }

    #[test]
    fn test_exact_bare_name_skips_suite_tests() {
        let mut registry = Registry::new();
        registry
            .register(TestDef::sync("adds", |_| Ok(())).file("src/a.rs"))
            .unwrap();
        registry
            .register(TestDef::sync("adds", |_| Ok(())).suite("math").file("src/a.rs"))
            .unwrap();

        let bare = Selection::exact(vec!["adds".into()]).with_files(vec!["src/a.rs".into()]);
        assert_eq!(names(registry.discover(&bare)), vec!["adds"]);

        let qualified = Selection::exact(vec!["math:adds".into()]);
        assert_eq!(names(registry.discover(&qualified)), vec!["math:adds"]);

        let loose = Selection {
            specifiers: vec!["adds".into()],
            ..Default::default()
        };
        assert_eq!(names(registry.discover(&loose)), vec!["adds", "math:adds"]);
    }

    #[test]
    fn test_file_and_dir_filters() {
        let registry = registry();
        let by_file = Selection::all().with_files(vec!["src/net/io.rs".into()]);
        assert_eq!(names(registry.discover(&by_file)), vec!["fetches"]);

        let by_dir = Selection::all().with_target_dir("src/net");
        assert_eq!(names(registry.discover(&by_dir)), vec!["fetches"]);

        let nothing = Selection::exact(vec!["math:adds".into()])
            .with_files(vec!["src/net/io.rs".into()]);
        assert!(registry.discover(&nothing).is_empty());
    }

    #[test]
    fn test_body_kind() {
        let registry = registry();
        let kinds: Vec<bool> = registry.iter().map(|t| t.body.is_async()).collect();
        assert_eq!(kinds, vec![false, false, true]);
    }
}
