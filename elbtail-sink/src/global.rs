//! The process-wide sink.
//!
//! All pipelines of a process share one [`HoneycombSink`]. It is created on first use by
//! [`ensure_initialized`] and flushed at teardown by [`close`].

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{EventSink, HoneycombConfig, HoneycombSink, SinkError};

static SINK: OnceCell<Arc<HoneycombSink>> = OnceCell::new();

/// Returns the process-wide sink, creating it from `config` if it does not exist yet.
///
/// Concurrent callers block until the first initialization has finished. Once a sink exists,
/// `config` is ignored. A failed initialization is not cached and can be retried.
pub fn ensure_initialized(config: &HoneycombConfig) -> Result<Arc<HoneycombSink>, SinkError> {
    SINK.get_or_try_init(|| HoneycombSink::new(config).map(Arc::new))
        .cloned()
}

/// Returns the process-wide sink if it was initialized.
pub fn get() -> Option<Arc<HoneycombSink>> {
    SINK.get().cloned()
}

/// Flushes and shuts down the process-wide sink.
///
/// Blocks until all accepted events have been sent. Does nothing if the sink was never
/// initialized or is already closed.
pub fn close() {
    if let Some(sink) = SINK.get() {
        sink.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SendError;

    #[test]
    fn test_initialized_once() {
        assert!(get().is_none());
        close();

        let invalid = ensure_initialized(&HoneycombConfig::default());
        assert!(matches!(invalid, Err(SinkError::MissingWriteKey)));
        assert!(get().is_none());

        let config = HoneycombConfig {
            api_host: "http://127.0.0.1:9/".to_owned(),
            write_key: "secret".to_owned(),
            dataset: "elb-logs".to_owned(),
            ..Default::default()
        };

        let first = ensure_initialized(&config).unwrap();
        let second = ensure_initialized(&HoneycombConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        close();
        close();
        let result = first.send_presampled(first.new_event());
        assert!(matches!(result, Err(SendError::Closed(_))));
    }
}
