//! Websocket session against the documentation peer.
//!
//! On connect the server drives a fixed handshake before entering the
//! bidirectional loop: ENTER, PROJECT_PATH, PROJECT_HIERARCHY, one
//! REPR_FILES message per converted source file, TAG_TABLE, RULE_TABLE and
//! finally VERIFY_RULES. Handshake messages go straight to the sink, one at
//! a time, so the peer sees them strictly in this order before anything the
//! watcher may emit.

use crate::dispatch;
use crate::state::ProjectHost;
use anyhow::{Context, Result};
use docsync_convert::Convert;
use docsync_mirror::{build_hierarchy, scan_project, ReprCache};
use docsync_protocol::{commands, normalize_path, Envelope, ReprPayload};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

pub async fn serve(host: Arc<ProjectHost>, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("binding 127.0.0.1:{port}"))?;
    log::info!("listening on ws://127.0.0.1:{port}");

    loop {
        let (stream, addr) = listener.accept().await?;
        log::info!("peer connected from {addr}");
        let host = host.clone();
        tokio::spawn(async move {
            match handle_connection(host, stream).await {
                Ok(()) => log::info!("peer {addr} disconnected"),
                Err(err) => log::error!("peer session {addr} failed: {err:#}"),
            }
        });
    }
}

async fn handle_connection(host: Arc<ProjectHost>, stream: TcpStream) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake")?;
    let (mut sink, stream) = ws.split();

    run_handshake(&host, &mut sink).await?;

    let rx = host.peer.attach();
    let result = session_loop(&host, &mut sink, stream, rx).await;
    host.peer.detach();
    result
}

async fn session_loop(
    host: &ProjectHost,
    sink: &mut WsSink,
    mut stream: futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(text) = outbound else { break };
                sink.send(Message::Text(text)).await?;
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        dispatch::handle_message(host, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        log::warn!("peer read error: {err}");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn send<S>(sink: &mut S, command: &str, data: Value) -> Result<()>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    sink.send(Message::Text(Envelope::new(command, data).encode()))
        .await
        .with_context(|| format!("sending {command}"))?;
    Ok(())
}

async fn run_handshake<S>(host: &ProjectHost, sink: &mut S) -> Result<()>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    send(sink, commands::SEND_ENTER, json!("")).await?;
    send(
        sink,
        commands::SEND_PROJECT_PATH,
        json!(normalize_path(&host.root.display().to_string())),
    )
    .await?;

    let tree = build_hierarchy(&host.root)?;
    send(sink, commands::SEND_PROJECT_HIERARCHY, json!(tree)).await?;

    // Bulk conversion; failed files are logged and skipped so one bad file
    // cannot abort the handshake.
    let mut entries = Vec::new();
    for path in scan_project(&host.root, &host.extension) {
        match host.converter.convert(&path).await {
            Ok(repr) => entries.push((ReprCache::key_for(&path), repr)),
            Err(err) => log::error!("initial conversion failed for {}: {err}", path.display()),
        }
    }
    if let Ok(mut cache) = host.cache.lock() {
        cache.rebuild(entries.clone());
    }
    for (file_path, repr) in entries {
        let payload = ReprPayload { file_path, repr };
        send(sink, commands::SEND_REPR_FILES, json!(payload)).await?;
    }

    let tag_snapshot = host.tags.lock().await.snapshot_for_client();
    send(sink, commands::SEND_TAG_TABLE, json!(tag_snapshot)).await?;
    let rule_snapshot = host.rules.lock().await.snapshot_for_client();
    send(sink, commands::SEND_RULE_TABLE, json!(rule_snapshot)).await?;

    send(sink, commands::SEND_VERIFY_RULES, json!("")).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context as TaskContext, Poll};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CollectSink(Vec<Message>);

    impl futures_util::Sink<Message> for CollectSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _: &mut TaskContext<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Infallible> {
            self.get_mut().0.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut TaskContext<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut TaskContext<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn handshake_messages_arrive_in_the_fixed_order() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("A.java"), "class A {}").unwrap();
        std::fs::write(temp.path().join("B.java"), "class B {}").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let host = ProjectHost::open(temp.path().to_path_buf(), "cat", "java").unwrap();
        let mut sink = CollectSink::default();
        run_handshake(&host, &mut sink).await.unwrap();

        let commands: Vec<String> = sink
            .0
            .iter()
            .map(|msg| match msg {
                Message::Text(text) => Envelope::decode(text).unwrap().command,
                other => panic!("unexpected frame {other:?}"),
            })
            .collect();
        assert_eq!(
            commands,
            vec![
                "ENTER",
                "PROJECT_PATH",
                "PROJECT_HIERARCHY",
                "REPR_FILES",
                "REPR_FILES",
                "TAG_TABLE",
                "RULE_TABLE",
                "VERIFY_RULES",
            ]
        );

        // Bulk conversion repopulated the cache for both recognized files.
        assert_eq!(host.cache.lock().unwrap().len(), 2);
    }
}
