use std::{path::PathBuf, time::Instant};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard файлового слоя: пока handle жив, фоновый поток записи
/// работает. При drop guard сбрасывает накопленные записи на диск.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    file_path: Option<PathBuf>,
}

impl LoggingHandle {
    pub fn new(
        file_guard: Option<WorkerGuard>,
        file_path: Option<PathBuf>,
    ) -> Self {
        Self {
            file_guard,
            file_path,
        }
    }

    /// Handle без файлового вывода.
    pub fn console_only() -> Self {
        Self::new(None, None)
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Каталог и базовое имя файла логов, если вывод в файл включён.
    pub fn file_path(&self) -> Option<&PathBuf> {
        self.file_path.as_ref()
    }

    /// Завершает логирование, дожидаясь записи буфера в файл.
    pub fn shutdown(mut self) {
        let start = Instant::now();
        tracing::info!(file_sink = self.has_file_sink(), "Logging shutdown initiated");

        drop(self.file_guard.take());

        tracing::debug!(
            shutdown_duration_ms = start.elapsed().as_millis() as u64,
            "Logging shutdown completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_only_handle() {
        let handle = LoggingHandle::console_only();
        assert!(!handle.has_file_sink());
        assert!(handle.file_path().is_none());
        handle.shutdown();
    }

    #[test]
    fn test_handle_with_file_guard() {
        let tmp = tempfile::tempdir().unwrap();
        let appender = tracing_appender::rolling::never(tmp.path(), "guarded.log");
        let (_writer, guard) = tracing_appender::non_blocking(appender);

        let path = tmp.path().join("guarded.log");
        let handle = LoggingHandle::new(Some(guard), Some(path.clone()));
        assert!(handle.has_file_sink());
        assert_eq!(handle.file_path(), Some(&path));
        handle.shutdown();
    }
}
