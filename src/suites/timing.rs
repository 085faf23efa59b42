//! Asynchronous tests with known durations, useful for watching the scheduler

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::executor::TestContext;
use crate::registry::{Registry, RegistryError, TestDef};

const SUITE: &str = "timing";

async fn sleeps(t: TestContext, ms: u64) -> Result<()> {
    let start = Instant::now();
    tokio::time::sleep(Duration::from_millis(ms)).await;
    let elapsed = start.elapsed();
    t.log(format!("slept {}ms", elapsed.as_millis()));
    t.assert()
        .ok(elapsed >= Duration::from_millis(ms), format!("slept at least {ms}ms"))?;
    Ok(())
}

async fn overlapping_sleeps(t: TestContext) -> Result<()> {
    let start = Instant::now();
    tokio::join!(
        tokio::time::sleep(Duration::from_millis(40)),
        tokio::time::sleep(Duration::from_millis(40)),
    );
    t.assert()
        .ok(start.elapsed() >= Duration::from_millis(40), "both sleeps finished")?;
    Ok(())
}

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    let tests = [
        TestDef::asynchronous("short", |t| sleeps(t, 20)),
        TestDef::asynchronous("medium", |t| sleeps(t, 60)),
        TestDef::asynchronous("long", |t| sleeps(t, 120)),
        TestDef::asynchronous("overlapping", overlapping_sleeps),
    ];
    for test in tests {
        registry.register(test.suite(SUITE).file(file!()))?;
    }
    Ok(())
}
