//! TCP front-end for the line protocol.

use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{AppResult, BridgeError};
use crate::server::protocol::{Request, Response};
use crate::server::ServerHandle;

/// Longest request line accepted, newline excluded.
pub const MAX_LINE_LEN: usize = 4096;

/// Accept connections on `listener` until `shutdown` flips to true.
pub async fn serve(
    listener: TcpListener,
    handle: ServerHandle,
    mut shutdown: watch::Receiver<bool>,
) -> AppResult<()> {
    info!(addr = %listener.local_addr()?, "Listening for PV clients");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let handle = handle.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, handle, shutdown).await {
                                debug!(%peer, error = %e, "Connection closed with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("TCP front-end stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handle: ServerHandle,
    mut shutdown: watch::Receiver<bool>,
) -> AppResult<()> {
    debug!(%peer, "Client connected");
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let line = tokio::select! {
            line = read_line(&mut reader, &mut buf) => line,
            _ = shutdown.changed() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e @ BridgeError::Protocol(_)) => {
                // The rest of an oversized line cannot be resynchronised.
                send(&mut writer, Response::from(e)).await?;
                break;
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match line.parse::<Request>() {
            Ok(request) => request,
            Err(e) => {
                send(&mut writer, Response::from(e)).await?;
                continue;
            }
        };

        if let Request::Monitor { pv } = request {
            let mut updates = match handle.subscribe(&pv) {
                Ok(rx) => rx,
                Err(e) => {
                    send(&mut writer, Response::from(e)).await?;
                    continue;
                }
            };
            send(&mut writer, Response::ok()).await?;

            // Current value first, then every posted update.
            let initial = updates.borrow_and_update().value.to_string();
            send(&mut writer, Response::Event { pv: pv.clone(), value: initial }).await?;

            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let value = updates.borrow_and_update().value.to_string();
                        send(&mut writer, Response::Event { pv: pv.clone(), value }).await?;
                    }
                    line = read_line(&mut reader, &mut buf) => {
                        // Monitoring connections only listen; any input is
                        // ignored until the client hangs up.
                        if !matches!(line, Ok(Some(_))) {
                            break;
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            break;
        }

        let response = respond(&handle, request).await;
        send(&mut writer, response).await?;
    }

    debug!(%peer, "Client disconnected");
    Ok(())
}

async fn respond(handle: &ServerHandle, request: Request) -> Response {
    let result = match request {
        Request::Get { pv } => handle
            .get(&pv)
            .map(|value| Response::ok_with(format!("{} {}", pv, value))),
        Request::Put { pv, value } => handle.put_text(&pv, &value).await.map(|_| Response::ok()),
        Request::PutWait { pv, value } => match handle.put_text(&pv, &value).await {
            Ok(completion) => completion
                .wait(handle.completion_timeout())
                .await
                .map(|_| Response::ok()),
            Err(e) => Err(e),
        },
        Request::Info { pv } => handle.info(&pv).map(|json| Response::ok_with(json.to_string())),
        Request::List => Ok(Response::ok_with(handle.names().join(" "))),
        Request::Monitor { .. } => Ok(Response::Err("MONITOR handled by connection".to_string())),
    };
    result.unwrap_or_else(Response::from)
}

/// Read one request line of at most [`MAX_LINE_LEN`] bytes.
///
/// Partial input stays in `buf` if the read is cancelled, so this is safe to
/// use in `select!`. Returns `None` at end of stream.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> AppResult<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let budget = (MAX_LINE_LEN + 2).saturating_sub(buf.len()) as u64;
        let read = (&mut *reader).take(budget).read_until(b'\n', buf).await?;

        if buf.ends_with(b"\n") || (read == 0 && !buf.is_empty()) {
            let mut line = std::mem::take(buf);
            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }
            if line.len() > MAX_LINE_LEN {
                return Err(line_too_long());
            }
            return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
        }
        if read == 0 {
            return Ok(None);
        }
        if buf.len() > MAX_LINE_LEN + 1 {
            buf.clear();
            return Err(line_too_long());
        }
    }
}

fn line_too_long() -> BridgeError {
    BridgeError::Protocol(format!("request line exceeds {} bytes", MAX_LINE_LEN))
}

async fn send<W>(writer: &mut W, response: Response) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = response.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
