//! Bounded assertion logs

use anyhow::{anyhow, Result};

use crate::executor::TestContext;
use crate::registry::{Registry, RegistryError, TestDef};

const SUITE: &str = "ring_buffer";

/// First argument of each kept log entry of one assertion kind, oldest first
fn kept_args(t: &TestContext, assertion: &str) -> Result<Vec<String>> {
    let snapshot = t.metrics_snapshot();
    let buffer = snapshot
        .assertion_metrics
        .logs
        .get(assertion)
        .ok_or_else(|| anyhow!("no log for assert.{assertion}"))?;
    Ok(buffer
        .ordered()
        .into_iter()
        .map(|entry| entry.args.first().cloned().unwrap_or_default())
        .collect())
}

fn keeps_most_recent(t: &TestContext) -> Result<()> {
    t.set_options(|o| {
        o.ring_buffer_limit(5);
    });
    for i in 0..12 {
        t.assert().eq(i, i)?;
    }

    let kept = kept_args(t, "eq")?;
    let count = t.metrics_snapshot().assertion_metrics.count("eq");
    t.assert().eq(kept, ["7", "8", "9", "10", "11"].map(String::from).to_vec())?;
    t.assert().eq(count, 12u64)?;
    Ok(())
}

fn limited_mid_test(t: &TestContext) -> Result<()> {
    for i in 0..3 {
        t.assert().ok(true, format!("call {i}"))?;
    }
    t.set_options(|o| {
        o.ring_buffer_limit(2);
    });
    for i in 3..7 {
        t.assert().ok(true, format!("call {i}"))?;
    }

    let snapshot = t.metrics_snapshot();
    let messages: Vec<String> = snapshot
        .assertion_metrics
        .logs
        .get("ok")
        .map(|buffer| buffer.ordered().into_iter().map(|e| e.args[1].clone()).collect())
        .unwrap_or_default();

    t.assert().eq(messages, vec!["call 5".to_string(), "call 6".to_string()])?;
    t.assert().eq(snapshot.assertion_metrics.count("ok"), 7u64)?;
    Ok(())
}

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        TestDef::sync("keeps_most_recent", keeps_most_recent)
            .suite(SUITE)
            .file(file!()),
    )?;
    registry.register(
        TestDef::sync("limited_mid_test", limited_mid_test)
            .suite(SUITE)
            .file(file!()),
    )?;
    Ok(())
}
