//! Routes decoded peer envelopes to the owning subsystem.
//!
//! A malformed envelope or a failed handler is logged and dropped; nothing
//! inbound may tear down the peer session.

use crate::mining;
use crate::state::ProjectHost;
use anyhow::Result;
use docsync_mirror::{scan_project, ReprCache};
use docsync_protocol::{
    commands, AcceptFixPayload, EditFixRequest, Envelope, FileContentPayload,
    ModifiedContentPayload, Outbound, RuleChangePayload, SnippetReply, SnippetRequest,
    TagChangePayload,
};
use docsync_store::{DesignRule, JsonTable, Record, StoreError, Tag};
use serde_json::json;
use std::path::PathBuf;

pub async fn handle_message(host: &ProjectHost, text: &str) {
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            log::warn!("dropping malformed peer message: {err}");
            return;
        }
    };

    let command = envelope.command.clone();
    let result = if commands::RULES_AND_FIXES_COMMANDS.contains(&command.as_str()) {
        handle_rules_and_fixes(host, &envelope).await
    } else if commands::MINING_COMMANDS.contains(&command.as_str()) {
        mining::handle(host, &envelope).await
    } else {
        log::warn!("unrecognized command {command}");
        Ok(())
    };

    if let Err(err) = result {
        log::error!("{command} handler failed: {err:#}");
    }
}

async fn handle_rules_and_fixes(host: &ProjectHost, envelope: &Envelope) -> Result<()> {
    match envelope.command.as_str() {
        commands::RECEIVE_EDIT_FIX => send_content_for_fix(host, envelope).await,
        commands::RECEIVE_MODIFIED_FILE_CONTENT => propose_fix(host, envelope).await,
        commands::RECEIVE_ACCEPT_EDIT_FIX => accept_fix(host, envelope).await,
        commands::RECEIVE_REJECT_EDIT_FIX => reject_fix(host).await,
        commands::RECEIVE_MODIFIED_RULE => apply_rule_change(host, envelope, false).await,
        commands::RECEIVE_NEW_RULE => apply_rule_change(host, envelope, true).await,
        commands::RECEIVE_MODIFIED_TAG => apply_tag_change(host, envelope, false).await,
        commands::RECEIVE_NEW_TAG => apply_tag_change(host, envelope, true).await,
        commands::RECEIVE_SNIPPET_TO_REPR => convert_snippet(host, envelope).await,
        other => {
            log::warn!("unhandled rules/fixes command {other}");
            Ok(())
        }
    }
}

/// Resolve an inbound file reference. The peer sometimes sends a bare file
/// name rather than a full path; fall back to the first project file with a
/// matching name.
fn resolve_target(host: &ProjectHost, raw: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(raw);
    if direct.is_file() {
        return Some(direct);
    }
    let name = direct.file_name()?.to_owned();
    scan_project(&host.root, &host.extension)
        .into_iter()
        .find(|path| path.file_name() == Some(name.as_os_str()))
}

async fn send_content_for_fix(host: &ProjectHost, envelope: &Envelope) -> Result<()> {
    let request: EditFixRequest = envelope.payload()?;
    let Some(path) = resolve_target(host, &request.file_path) else {
        log::warn!("fix target not found: {}", request.file_path);
        return Ok(());
    };
    let content = tokio::fs::read_to_string(&path).await?;
    let payload = FileContentPayload {
        file_path: ReprCache::key_for(&path),
        content,
    };
    host.peer
        .send(commands::SEND_CONTENT_FOR_EDIT_FIX, json!(payload));
    Ok(())
}

async fn propose_fix(host: &ProjectHost, envelope: &Envelope) -> Result<()> {
    let payload: ModifiedContentPayload = envelope.payload()?;
    let Some(path) = resolve_target(host, &payload.file_path) else {
        log::warn!("fix target not found: {}", payload.file_path);
        return Ok(());
    };

    let mut fixes = host.fixes.lock().await;
    let fix = fixes
        .propose(
            &path,
            &payload.violated_code,
            &payload.modified_file_content,
            &payload.explanation,
        )
        .await?;
    host.peer
        .send(commands::SEND_EDIT_FIX_PREVIEW, serde_json::to_value(fix)?);
    Ok(())
}

async fn accept_fix(host: &ProjectHost, envelope: &Envelope) -> Result<()> {
    // The peer sends either `{"content": ...}` or the edited buffer directly.
    let edited = match envelope.payload::<AcceptFixPayload>() {
        Ok(payload) => payload.content,
        Err(_) => envelope.payload::<Option<String>>().unwrap_or(None),
    };
    let fixes = host.fixes.lock().await;
    fixes.accept(edited.as_deref()).await?;
    Ok(())
}

async fn reject_fix(host: &ProjectHost) -> Result<()> {
    let mut fixes = host.fixes.lock().await;
    fixes.reject().await?;
    Ok(())
}

async fn apply_rule_change(host: &ProjectHost, envelope: &Envelope, is_new: bool) -> Result<()> {
    let payload: RuleChangePayload = envelope.payload()?;
    let record = DesignRule(payload.rule_info.clone());
    let (ok_tag, fail_tag) = if is_new {
        (commands::SEND_NEW_RULE, commands::SEND_FAILED_NEW_RULE)
    } else {
        (commands::SEND_UPDATE_RULE, commands::SEND_FAILED_UPDATE_RULE)
    };

    let mut rules = host.rules.lock().await;
    apply_table_change(
        host, &mut rules, &payload.rule_id, record, envelope, is_new, ok_tag, fail_tag,
    )
}

async fn apply_tag_change(host: &ProjectHost, envelope: &Envelope, is_new: bool) -> Result<()> {
    let payload: TagChangePayload = envelope.payload()?;
    let record: Tag = serde_json::from_value(payload.tag_info.clone())
        .map_err(docsync_protocol::ProtocolError::Decode)?;
    let (ok_tag, fail_tag) = if is_new {
        (commands::SEND_NEW_TAG, commands::SEND_FAILED_NEW_TAG)
    } else {
        (commands::SEND_UPDATE_TAG, commands::SEND_FAILED_UPDATE_TAG)
    };

    let mut tags = host.tags.lock().await;
    apply_table_change(
        host, &mut tags, &payload.tag_id, record, envelope, is_new, ok_tag, fail_tag,
    )
}

/// Shared ack/fail shape for both tables: success echoes the request payload
/// under the ack tag, an identity conflict echoes it under the failure tag,
/// anything else propagates.
#[allow(clippy::too_many_arguments)]
fn apply_table_change<T: Record>(
    host: &ProjectHost,
    table: &mut JsonTable<T>,
    identity: &str,
    record: T,
    envelope: &Envelope,
    is_new: bool,
    ok_tag: &str,
    fail_tag: &str,
) -> Result<()> {
    let outcome = if is_new {
        table.add_new(identity, record)
    } else {
        table.update_existing(identity, record)
    };

    match outcome {
        Ok(()) => host.peer.send(ok_tag, envelope.data.clone()),
        Err(StoreError::IdentityConflict { kind, identity }) => {
            log::warn!("{kind} change rejected for identity {identity}");
            host.peer.send(fail_tag, envelope.data.clone());
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

async fn convert_snippet(host: &ProjectHost, envelope: &Envelope) -> Result<()> {
    let request: SnippetRequest = envelope.payload()?;
    // Conversion failure still answers, with an empty representation, so the
    // peer's request does not dangle.
    let repr_text = match host.converter.convert_snippet(&request.code_text).await {
        Ok(repr) => repr,
        Err(err) => {
            log::error!("snippet conversion failed: {err}");
            String::new()
        }
    };
    let reply = SnippetReply {
        repr_text,
        message_id: request.message_id,
    };
    host.peer.send(commands::SEND_SNIPPET_REPR, json!(reply));
    Ok(())
}
