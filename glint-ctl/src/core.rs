use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;
use serde::de::DeserializeOwned;

use common::{JobStatus, Operation, Task, Value};
use glint_ctl::GlintClient;

async fn connect(address: &str) -> Result<GlintClient> {
    let mut client = GlintClient::new();
    client
        .connect(address)
        .await
        .with_context(|| format!("failed to connect to {address}"))?;
    Ok(client)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("{} is not valid", path.display()))
}

// Tasks
pub async fn jobs(address: &str) -> Result<()> {
    let mut client = connect(address).await?;
    let jobs = client.jobs().await?;

    println!("[Jobs]");
    println!("{} job(s)", jobs.len());

    if !jobs.is_empty() {
        println!();
        for job in &jobs {
            println!("{}  {}", job.id, job.status);
        }
    }

    Ok(())
}

pub async fn submit(
    address: &str,
    input: &Path,
    pipeline: &Path,
    timeout: Option<u64>,
) -> Result<()> {
    let data: Vec<Value> = read_json(input).await?;
    let operations: Vec<Operation> = read_json(pipeline).await?;

    let mut client = connect(address).await?;
    client.parallelize(data)?;
    for op in operations {
        match (op.task, op.start) {
            (Task::Map, None) => client.map(op.function),
            (Task::Filter, None) => client.filter(op.function),
            (Task::Reduce, Some(start)) => client.reduce(op.function, start),
            (Task::Reduce, None) => bail!("reduce `{}` needs a start value", op.function),
            (task, Some(_)) => bail!("{task} `{}` cannot take a start value", op.function),
        };
    }

    let id = client.run()?;
    println!("Submitted job {id}");

    let outcome = match timeout {
        Some(secs) => client.wait_for_job_timeout(Duration::from_secs(secs)).await?,
        None => client.wait_for_job().await?,
    };

    println!("[{}]", outcome.status);
    if outcome.status == JobStatus::Done {
        println!("{}", serde_json::to_string_pretty(&outcome.data)?);
    }

    Ok(())
}

pub async fn status(address: &str) -> Result<()> {
    let mut client = connect(address).await?;
    let workers = client.status().await?;

    println!("[Status]");
    println!("{} worker(s) registered", workers.len());
    for worker in workers {
        println!("worker {}  max_mem {}", worker.worker_id, ByteSize(worker.max_mem));
    }

    Ok(())
}
