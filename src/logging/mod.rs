use std::io::{self, Write};

use env_logger::Builder;
use tokio::{
    fs::{create_dir_all, metadata, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config, config_error,
    core::{ErrorContext, ScreenResult},
};

/// `io::Write` end of the log channel; lines are written out by [`Logger::run`].
pub struct AsyncWriter {
    sender: UnboundedSender<Vec<u8>>,
}

impl Write for AsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let data = buf.to_vec();
        self.sender.send(data).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Logger {
    sender: UnboundedSender<Vec<u8>>,
    receiver: UnboundedReceiver<Vec<u8>>,
    config: config::Log,
}

impl Logger {
    pub fn new(config: config::Log) -> Self {
        let (sender, receiver) = unbounded_channel::<Vec<u8>>();
        Self {
            sender,
            receiver,
            config,
        }
    }

    fn create_async_writer(&self) -> AsyncWriter {
        AsyncWriter {
            sender: self.sender.clone(),
        }
    }

    /// Install the global logger. Records go to stderr unless a log file is
    /// configured, in which case they are queued for [`Logger::run`].
    pub fn init_env_logger(&self) -> ScreenResult<()> {
        let mut builder = Builder::from_env(env_logger::Env::default());
        builder.filter(None, self.config.level);
        if self.config.path.is_some() {
            let writer = self.create_async_writer();
            builder.target(env_logger::Target::Pipe(Box::new(writer)));
        }
        builder
            .try_init()
            .map_err(|e| config_error!("unable to install logger: {e}"))
    }

    /// Run [`Logger::run`] on its own task. The returned handle must be
    /// finished before exit or queued records are lost.
    pub fn spawn(self) -> LogWriter {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(self.run(shutdown.clone()));
        LogWriter { shutdown, handle }
    }

    /// Write queued records to the log file until `shutdown` fires, then
    /// drain whatever is still queued and flush.
    pub async fn run(self, shutdown: CancellationToken) -> ScreenResult<()> {
        let Logger {
            sender,
            mut receiver,
            config,
        } = self;
        drop(sender);

        let Some(log_file_path) = config.path else {
            return Ok(());
        };

        if let Some(parent) = std::path::Path::new(&log_file_path).parent() {
            if metadata(parent).await.is_err() {
                create_dir_all(parent).await?;
            }
        }

        let mut file = BufWriter::new(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(&log_file_path)
                .await?,
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,

                data = receiver.recv() => {
                    match data {
                        Some(data) => {
                            if let Err(e) = file.write_all(&data).await {
                                eprintln!("Failed to write to log file: {e}");
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        while let Ok(data) = receiver.try_recv() {
            file.write_all(&data).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

pub struct LogWriter {
    shutdown: CancellationToken,
    handle: JoinHandle<ScreenResult<()>>,
}

impl LogWriter {
    /// Stop the writer task and wait until everything queued is on disk.
    pub async fn finish(self) -> ScreenResult<()> {
        self.shutdown.cancel();
        self.handle.await.with_context("log writer")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("conductor-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[tokio::test]
    async fn test_queued_records_are_drained_on_shutdown() {
        let path = scratch_path("scenario.log");
        let logger = Logger::new(config::Log {
            path: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        });

        let mut writer = logger.create_async_writer();
        writer.write_all(b"first\n").unwrap();
        writer.write_all(b"second\n").unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        logger.run(shutdown).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_writer_task_stops_when_writers_are_gone() {
        let path = scratch_path("closed.log");
        let logger = Logger::new(config::Log {
            path: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        });

        let mut writer = logger.create_async_writer();
        let task = tokio::spawn(logger.run(CancellationToken::new()));
        writer.write_all(b"only\n").unwrap();
        drop(writer);

        task.await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "only\n");
    }

    #[tokio::test]
    async fn test_finish_flushes_records_queued_before_it() {
        let path = scratch_path("spawned.log");
        let logger = Logger::new(config::Log {
            path: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        });

        let mut writer = logger.create_async_writer();
        let log_writer = logger.spawn();
        writer.write_all(b"scenario failed\n").unwrap();

        log_writer.finish().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "scenario failed\n"
        );
    }

    #[tokio::test]
    async fn test_without_path_nothing_is_written() {
        let logger = Logger::new(config::Log::default());
        let mut writer = logger.create_async_writer();
        logger.run(CancellationToken::new()).await.unwrap();

        assert!(writer.write_all(b"dropped\n").is_err());
    }
}
