//! Tests that declare how they are expected to fail

use anyhow::{bail, Result};

use crate::executor::TestContext;
use crate::models::FailureSpec;
use crate::registry::{Registry, RegistryError, TestDef};

const SUITE: &str = "expectations";

fn substring(t: &TestContext) -> Result<()> {
    t.set_options(|o| {
        o.fails_with("boom");
    });
    bail!("boom happened")
}

fn pattern(t: &TestContext) -> Result<()> {
    let spec = FailureSpec::pattern(r"^disk \d+ full$")?;
    t.set_options(|o| {
        o.fails_with(spec);
    });
    bail!("disk 3 full")
}

fn one_of(t: &TestContext) -> Result<()> {
    t.set_options(|o| {
        o.fails_with(vec![FailureSpec::from("timed out"), FailureSpec::from("refused")]);
    });
    bail!("connection refused by peer")
}

fn any_panic(t: &TestContext) -> Result<()> {
    t.set_options(|o| {
        o.fails_with_flag(true);
    });
    panic!("intentional panic")
}

fn failed_assertion(t: &TestContext) -> Result<()> {
    t.set_options(|o| {
        o.fails_with("assert.eq failed");
    });
    t.assert().eq("left", "right")?;
    Ok(())
}

async fn async_error(t: TestContext) -> Result<()> {
    t.set_options(|o| {
        o.fails_with("unreachable host");
    });
    tokio::task::yield_now().await;
    bail!("unreachable host 10.0.0.1")
}

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    let tests = [
        TestDef::sync("substring", substring),
        TestDef::sync("pattern", pattern),
        TestDef::sync("one_of", one_of),
        TestDef::sync("any_panic", any_panic),
        TestDef::sync("failed_assertion", failed_assertion),
        TestDef::asynchronous("async_error", async_error),
    ];
    for test in tests {
        registry.register(test.suite(SUITE).file(file!()))?;
    }
    Ok(())
}
