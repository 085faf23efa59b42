//! Plain assertions, declared counts, embeds and cleanup handlers

use anyhow::Result;
use regex::Regex;

use crate::executor::TestContext;
use crate::registry::{Registry, RegistryError, TestDef};

const SUITE: &str = "basics";

fn adds(t: &TestContext) -> Result<()> {
    t.assert().eq(2 + 2, 4)?;
    t.assert().ne(2 + 2, 5)?;
    Ok(())
}

fn strings(t: &TestContext) -> Result<()> {
    let greeting = format!("hello, {}", "fleet");
    t.assert().contains(&greeting, "fleet")?;
    t.assert().matches(&greeting, &Regex::new(r"^hello, \w+$")?)?;
    Ok(())
}

fn parse_errors(t: &TestContext) -> Result<()> {
    t.assert().throws(|| "forty-two".parse::<u32>())?;
    t.assert().eq("42".parse::<u32>()?, 42u32)?;
    Ok(())
}

fn declared_count(t: &TestContext) -> Result<()> {
    t.set_options(|o| {
        o.assertion_count(3);
    });
    for n in [1, 2, 3] {
        t.assert().ok(n > 0, format!("{n} is positive"))?;
    }
    Ok(())
}

fn exempt(t: &TestContext) -> Result<()> {
    t.set_options(|o| {
        o.exempt_from_asserting();
    });
    t.log("nothing to assert here");
    Ok(())
}

fn embeds_count_as_output(t: &TestContext) -> Result<()> {
    t.embed_html("<table><tr><td>ok</td></tr></table>");
    Ok(())
}

fn snapshot(t: &TestContext) -> Result<()> {
    t.log("first");
    t.assert().ok(true, "warm up")?;
    let snapshot = t.metrics_snapshot();
    t.assert().eq(snapshot.logs.len(), 1usize)?;
    t.assert().eq(snapshot.assertion_metrics.count("ok"), 1u64)?;
    Ok(())
}

async fn cleanup_runs(t: TestContext) -> Result<()> {
    let ctx = t.clone();
    t.always(move || async move {
        ctx.log("cleaned up");
    });
    t.assert().ok(true, "body ran")?;
    Ok(())
}

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    let tests = [
        TestDef::sync("adds", adds),
        TestDef::sync("strings", strings),
        TestDef::sync("parse_errors", parse_errors),
        TestDef::sync("declared_count", declared_count),
        TestDef::sync("exempt", exempt),
        TestDef::sync("embeds_count_as_output", embeds_count_as_output),
        TestDef::sync("snapshot", snapshot),
        TestDef::asynchronous("cleanup_runs", cleanup_runs),
    ];
    for test in tests {
        registry.register(test.suite(SUITE).file(file!()))?;
    }
    Ok(())
}
