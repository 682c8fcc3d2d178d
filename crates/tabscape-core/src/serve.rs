// Line protocol loop behind `tabscape serve`
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::{Result, Router};

/// Answers newline-delimited JSON requests from `input` on `output`
///
/// Every line gets its own task so a read stuck on an empty cache never
/// holds up the others, and responses come back in completion order. A
/// single writer task owns `output`. Lines that are not valid UTF-8 or not
/// valid JSON are answered with an error and reading carries on.
///
/// Once `input` ends, open requests get `grace` to finish before they are
/// dropped.
pub async fn serve<R, W>(router: Arc<Router>, mut input: R, output: W, grace: Duration) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (responses, outbox) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(output, outbox));

    let mut requests = JoinSet::new();
    let mut read_error = None;
    loop {
        let mut line = Vec::new();
        match input.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                read_error = Some(err);
                break;
            }
        }

        let line = trim_line_ending(&line).to_vec();
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let router = Arc::clone(&router);
        let responses = responses.clone();
        requests.spawn(async move {
            let response = router.handle_bytes(&line).await;
            match serde_json::to_string(&response) {
                Ok(json) => {
                    let _ = responses.send(json);
                }
                Err(err) => error!("Failed to encode response: {}", err),
            }
        });
    }

    info!("Input closed, waiting for {} open requests", requests.len());
    let drained = tokio::time::timeout(grace, async {
        while requests.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("Dropping {} requests still waiting for items", requests.len());
        requests.abort_all();
        while requests.join_next().await.is_some() {}
    }

    drop(responses);
    match writer.await {
        Ok(written) => written?,
        Err(err) => error!("Response writer stopped: {}", err),
    }

    match read_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

async fn write_lines<W>(mut output: W, mut outbox: mpsc::UnboundedReceiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbox.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
