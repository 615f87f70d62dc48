//! Fan-out between processes sharing one data dir.
//!
//! The leader appends every message as one JSON line to the profile's
//! `fanout.log`. Each process tails the file from where it was when the
//! process joined and delivers new lines to its local topics, so the leader's
//! own tabs hear about updates the same way followers do. A file watcher wakes
//! the tailer early; a slow poll covers file systems without notifications.

use std::{
    fs::OpenOptions,
    io::{SeekFrom, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use {
    ims_protocol::{EntityKind, FanoutMessage},
    notify_debouncer_full::{DebounceEventResult, new_debouncer, notify::RecursiveMode},
    serde::{Deserialize, Serialize},
    tokio::{
        io::{AsyncReadExt, AsyncSeekExt},
        sync::mpsc,
        task::AbortHandle,
        time::MissedTickBehavior,
    },
    tracing::{debug, trace, warn},
};

use crate::bus::FanoutBus;

pub const LOG_FILE: &str = "fanout.log";

/// The leader starts the log over once it grows past this.
const MAX_LOG_BYTES: u64 = 1 << 20;
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEBOUNCE: Duration = Duration::from_millis(20);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("fan-out log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode fan-out message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("the fan-out relay must be started inside a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Serialize, Deserialize)]
struct LogLine {
    kind: EntityKind,
    message: FanoutMessage,
}

/// Shared append log. Dropping it stops this process's tailer.
#[derive(Debug)]
pub struct FanoutLog {
    path: PathBuf,
    tailer: AbortHandle,
}

impl FanoutLog {
    /// Open (creating if needed) the log at `path` and deliver lines appended
    /// from now on to `local`, which must not itself be relayed.
    pub fn open(path: impl Into<PathBuf>, local: FanoutBus) -> Result<Self, RelayError> {
        let path = path.into();
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RelayError::NoRuntime)?;
        let io_err = |source| RelayError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let start = open_append(&path)
            .and_then(|file| file.metadata())
            .map_err(io_err)?
            .len();
        let tailer = runtime.spawn(tail(path.clone(), start, local)).abort_handle();
        debug!(path = %path.display(), offset = start, "fan-out relay started");
        Ok(Self { path, tailer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, kind: EntityKind, message: &FanoutMessage) -> Result<(), RelayError> {
        let mut line = serde_json::to_vec(&LogLine {
            kind,
            message: message.clone(),
        })?;
        line.push(b'\n');
        let io_err = |source| RelayError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = open_append(&self.path).map_err(io_err)?;
        if file.metadata().map_err(io_err)?.len() > MAX_LOG_BYTES {
            file.set_len(0).map_err(io_err)?;
            debug!(path = %self.path.display(), "fan-out log started over");
        }
        // One write per line; O_APPEND keeps lines whole.
        file.write_all(&line).map_err(io_err)?;
        trace!(%kind, "fan-out line appended");
        Ok(())
    }
}

impl Drop for FanoutLog {
    fn drop(&mut self) {
        self.tailer.abort();
    }
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

async fn tail(path: PathBuf, mut offset: u64, local: FanoutBus) {
    let (wake_tx, mut wake_rx) = mpsc::unbounded_channel();
    let watcher = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
        if result.is_ok() {
            let _ = wake_tx.send(());
        }
    })
    .and_then(|mut debouncer| {
        debouncer.watch(&path, RecursiveMode::NonRecursive)?;
        Ok(debouncer)
    });
    let _watcher = match watcher {
        Ok(debouncer) => Some(debouncer),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot watch fan-out log, polling only");
            None
        },
    };

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            Some(()) = wake_rx.recv() => {},
            _ = poll.tick() => {},
        }
        if let Err(e) = drain(&path, &mut offset, &local).await {
            warn!(path = %path.display(), error = %e, "reading fan-out log failed");
        }
    }
}

/// Deliver every complete line past `offset`. Returns how many were delivered.
async fn drain(path: &Path, offset: &mut u64, local: &FanoutBus) -> std::io::Result<usize> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    if len < *offset {
        // The leader started over; whatever was appended in between is lost.
        debug!(path = %path.display(), "fan-out log shrank, refreshing everything");
        *offset = 0;
        for kind in EntityKind::ALL {
            local.publish(kind, FanoutMessage::UpdateAll);
        }
    }
    if len == *offset {
        return Ok(0);
    }

    file.seek(SeekFrom::Start(*offset)).await?;
    let mut buf = Vec::new();
    file.take(len - *offset).read_to_end(&mut buf).await?;
    // A trailing partial line is picked up once its newline lands.
    let Some(end) = buf.iter().rposition(|b| *b == b'\n') else {
        return Ok(0);
    };
    *offset += end as u64 + 1;

    let mut delivered = 0;
    for line in buf[..end].split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
        match serde_json::from_slice::<LogLine>(line) {
            Ok(LogLine { kind, message }) => {
                local.publish(kind, message);
                delivered += 1;
            },
            Err(e) => warn!(error = %e, "skipping unreadable fan-out line"),
        }
    }
    Ok(delivered)
}
