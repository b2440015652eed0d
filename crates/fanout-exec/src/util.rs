use std::process::ExitStatus;

use fanout_model::ExitInfo;
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines},
    process::Child,
};
use tracing::trace;

use crate::{
    ExecError,
    proto::{self, FromWorker, ToWorker},
};

pub(crate) fn exit_info(status: &ExitStatus) -> ExitInfo {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::process::ExitStatusExt;
            ExitInfo { code: status.code(), signal: status.signal() }
        } else {
            ExitInfo { code: status.code(), signal: None }
        }
    }
}

/// Forcibly stops a worker and reaps it.
///
/// In-flight work of the worker is discarded.
pub(crate) async fn terminate(child: &mut Child) -> ExitInfo {
    let _ = child.start_kill();
    match child.wait().await {
        Ok(status) => exit_info(&status),
        Err(_) => ExitInfo::default(),
    }
}

/// Waits for a worker to exit on its own, or terminates it once `cancel` fires.
pub(crate) async fn wait_or_terminate(
    child: &mut Child,
    cancel: &tokio_util::sync::CancellationToken,
) -> ExitInfo {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => exit_info(&status),
            Err(_) => ExitInfo::default(),
        },
        _ = cancel.cancelled() => terminate(child).await,
    }
}

/// Sends one frame to a worker's stdin.
pub(crate) async fn write_frame<W>(stdin: &mut W, frame: &ToWorker) -> Result<(), ExecError>
where
    W: AsyncWrite + Unpin,
{
    let line = proto::encode(frame)?;
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

/// Reads worker stdout until the next frame; `None` on end of stream.
///
/// Non-frame lines are program output and only traced.
pub(crate) async fn read_frame<R>(lines: &mut Lines<R>) -> Option<Result<FromWorker, ExecError>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match proto::decode(&line) {
                Some(frame) => {
                    let output = line.split(proto::FRAME_MARKER).next().unwrap_or_default();
                    if !output.is_empty() {
                        trace!(target: "fanout.exec.worker.out", line = %output);
                    }
                    return Some(frame);
                }
                None => trace!(target: "fanout.exec.worker.out", %line),
            },
            Ok(None) => return None,
            Err(e) => return Some(Err(e.into())),
        }
    }
}
