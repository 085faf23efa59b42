//! Traced subprocesses started from inside tests. Requires a POSIX shell.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::executor::TestContext;
use crate::process::SpawnOptions;
use crate::registry::{Registry, RegistryError, TestDef};

const SUITE: &str = "processes";

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

async fn output_is_logged(t: TestContext) -> Result<()> {
    let outcome = t
        .spawn("sh", &sh("echo hello; echo oops 1>&2"), SpawnOptions::new())
        .await?;
    t.assert().ok(outcome.success(), "shell exited cleanly")?;

    let logs = t.metrics_snapshot().logs;
    t.assert().ok(logs.iter().any(|l| l.ends_with("[sh] hello")), "stdout logged")?;
    t.assert().ok(logs.iter().any(|l| l.ends_with("[sh] oops")), "stderr logged")?;
    Ok(())
}

async fn buffered_stdout(t: TestContext) -> Result<()> {
    let outcome = t
        .spawn("sh", &sh("echo captured"), SpawnOptions::new().buffer_stdout())
        .await?;
    t.assert().eq(outcome.stdout.as_deref(), Some("captured\n"))?;
    Ok(())
}

async fn tolerated_exit(t: TestContext) -> Result<()> {
    let outcome = t
        .spawn("sh", &sh("exit 3"), SpawnOptions::new().do_not_reject_on_fail())
        .await?;
    t.assert().eq(outcome.code, Some(3_i32))?;
    Ok(())
}

async fn rejected_exit(t: TestContext) -> Result<()> {
    t.set_options(|o| {
        o.fails_with("exited with code 4");
    });
    t.spawn("sh", &sh("exit 4"), SpawnOptions::new()).await?;
    Ok(())
}

async fn killed_midway(t: TestContext) -> Result<()> {
    let mut options = SpawnOptions::new().do_not_reject_on_fail();
    let kill = options.killable();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = kill.send(());
    });

    let start = Instant::now();
    let outcome = t.spawn("sleep", &["5".to_string()], options).await?;
    t.assert().eq(outcome.signal, Some(9_i32))?;
    t.assert()
        .ok(start.elapsed() < Duration::from_secs(5), "killed before finishing")?;
    t.assert().ok(outcome.resources.is_none(), "killable spawns are not sampled")?;
    Ok(())
}

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    let tests = [
        TestDef::asynchronous("output_is_logged", output_is_logged),
        TestDef::asynchronous("buffered_stdout", buffered_stdout),
        TestDef::asynchronous("tolerated_exit", tolerated_exit),
        TestDef::asynchronous("rejected_exit", rejected_exit),
        TestDef::asynchronous("killed_midway", killed_midway),
    ];
    for test in tests {
        registry.register(test.suite(SUITE).file(file!()))?;
    }
    Ok(())
}
