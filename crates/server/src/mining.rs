//! Mining gateway: collects learning data dropped by the peer into the
//! `LearningDR` directory and runs the external frequent-itemset miner
//! over it on request.

use crate::state::ProjectHost;
use anyhow::{anyhow, Result};
use docsync_protocol::{commands, Envelope, MineRequest, MinedRulesReply, Outbound};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time;

pub const LEARNING_DIR: &str = "LearningDR";

/// Hard cap per miner invocation; a hung JVM must not stall the session.
const MINING_TIMEOUT: Duration = Duration::from_secs(5);

/// Maps an algorithm to the prefix of its input encoding files.
fn input_prefix(algorithm: &str) -> Option<&'static str> {
    match algorithm {
        "FPMax" | "FPClose" => Some("AttributeEncoding"),
        "CHUI-Miner" | "CHUI-MinerMax" => Some("Weighted_AttributeEncoding"),
        _ => None,
    }
}

pub async fn handle(host: &ProjectHost, envelope: &Envelope) -> Result<()> {
    match envelope.command.as_str() {
        commands::RECEIVE_REFRESH_LEARNING_DIR => refresh_learning_dir(host).await,
        commands::RECEIVE_MINE_DESIGN_RULES => mine(host, envelope).await,
        // The remaining tags all carry `[[fileName, content], ...]`; the
        // `_APPEND` variants are continuation frames of an oversized drop
        // and land in the same files.
        _ => write_learning_files(host, envelope).await,
    }
}

async fn refresh_learning_dir(host: &ProjectHost) -> Result<()> {
    let dir = host.root.join(LEARNING_DIR);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => log::info!("cleared {}", dir.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

async fn write_learning_files(host: &ProjectHost, envelope: &Envelope) -> Result<()> {
    let entries: Vec<(String, String)> = envelope.payload()?;
    let dir = host.root.join(LEARNING_DIR);
    tokio::fs::create_dir_all(&dir).await?;

    for (name, content) in entries {
        // File names come from the peer; refuse anything that escapes the
        // learning directory.
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            log::warn!("rejecting learning file name {name:?}");
            continue;
        }
        let path = dir.join(&name);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
    }
    Ok(())
}

async fn mine(host: &ProjectHost, envelope: &Envelope) -> Result<()> {
    let request: MineRequest = envelope.payload()?;

    // The selected element, when present, joins the DOI log and the peer
    // gets the refreshed DOI snapshot before the mining results.
    if let Some(element) = &request.element {
        let snapshot = match host.doi.lock() {
            Ok(mut doi) => {
                doi.record_element(element.clone());
                Some(doi.snapshot())
            }
            Err(_) => None,
        };
        if let Some(snapshot) = snapshot {
            host.peer.send(commands::SEND_DOI_INFORMATION, snapshot);
        }
    }

    let results = run_algorithm(&host.root, &request.algorithm, &request.parameters).await?;
    let reply = MinedRulesReply {
        algorithm: request.algorithm,
        mined_frequent_item_sets: results,
    };
    host.peer.send(commands::SEND_MINED_DESIGN_RULES, json!(reply));
    Ok(())
}

/// Run the miner once per matching input file. A failed or timed-out run is
/// logged and skipped; its input simply has no entry in the result map.
async fn run_algorithm(
    root: &Path,
    algorithm: &str,
    params: &[String],
) -> Result<BTreeMap<String, String>> {
    let prefix =
        input_prefix(algorithm).ok_or_else(|| anyhow!("unknown mining algorithm {algorithm}"))?;
    let dir = root.join(LEARNING_DIR);
    tokio::fs::create_dir_all(&dir).await?;

    let mut inputs = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("output_") {
            // Stale results from an earlier run.
            let _ = tokio::fs::remove_file(entry.path()).await;
        } else if name.starts_with(prefix) {
            inputs.push(name);
        }
    }
    inputs.sort();

    let jar = root.join("spmf.jar");
    for name in &inputs {
        let input = dir.join(name);
        let output = dir.join(format!("output_{name}"));
        let mut command = Command::new("java");
        command
            .arg("-jar")
            .arg(&jar)
            .arg("run")
            .arg(algorithm)
            .arg(&input)
            .arg(&output)
            .args(params)
            .kill_on_drop(true);

        match time::timeout(MINING_TIMEOUT, command.output()).await {
            Ok(Ok(out)) if out.status.success() => {}
            Ok(Ok(out)) => log::error!(
                "miner failed for {name}: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Ok(Err(err)) => log::error!("failed to launch miner for {name}: {err}"),
            Err(_) => log::error!("miner timed out for {name}"),
        }
    }

    let mut results = BTreeMap::new();
    for name in inputs {
        let output = dir.join(format!("output_{name}"));
        match tokio::fs::read_to_string(&output).await {
            Ok(data) => {
                results.insert(name, data);
            }
            Err(err) => log::error!("no miner output for {name}: {err}"),
        }
    }
    Ok(results)
}
