use crate::context::AppContext;
use crate::router;
use avatar_core::ipc::{ReviewRequest, ReviewResponse};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Local IPC transport: 4-byte little-endian length prefix + MessagePack.
/// Callers on the socket are trusted, so no nonce is checked here.
pub async fn run_unix_server(
    socket_path: &str,
    ctx: AppContext,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let ctx = ctx.clone();
                tokio::spawn(serve_connection(stream, ctx));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

/// Run every configured transport until shutdown. A transport that fails
/// (HTTP bind error, socket error) ends the whole service with its error.
pub async fn run_transports(ctx: AppContext, shutdown: broadcast::Sender<()>) -> anyhow::Result<()> {
    let socket_path = ctx.config.service.socket_path.clone();

    let mut http_task = if ctx.config.http.enabled {
        let http_ctx = ctx.clone();
        let http_shutdown = shutdown.subscribe();
        Some(tokio::spawn(async move {
            crate::http::start_http_server(http_ctx, http_shutdown).await
        }))
    } else {
        None
    };

    match (&mut http_task, socket_path.is_empty()) {
        (None, true) => {
            anyhow::bail!("Nothing to serve: HTTP is disabled and no socket_path is set")
        }
        (Some(task), true) => task.await??,
        (None, false) => run_unix_server(&socket_path, ctx, shutdown.subscribe()).await?,
        (Some(task), false) => {
            let socket_done = tokio::select! {
                res = run_unix_server(&socket_path, ctx, shutdown.subscribe()) => {
                    res?;
                    true
                }
                res = &mut *task => {
                    let _ = shutdown.send(());
                    res??;
                    false
                }
            };
            if socket_done {
                task.await??;
            }
        }
    }

    Ok(())
}

fn le_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().little_endian().new_codec()
}

async fn serve_connection(stream: UnixStream, ctx: AppContext) {
    let (read, write) = stream.into_split();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = match frame {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let response = match rmp_serde::from_slice::<ReviewRequest>(&bytes_mut) {
            Ok(request) => router::handle_request(request, &ctx).await,
            Err(e) => ReviewResponse::err_with_code("validation", format!("Deserialization error: {}", e)),
        };

        match rmp_serde::to_vec_named(&response) {
            Ok(resp_bytes) => {
                if let Err(e) = framed_write.send(Bytes::from(resp_bytes)).await {
                    tracing::error!("Failed to send response: {}", e);
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                break;
            }
        }
    }
}
