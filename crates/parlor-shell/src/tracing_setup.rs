use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Held in `main()`; dropping it flushes buffered JSONL lines to disk.
pub(crate) struct TracingGuard {
    _guards: Vec<WorkerGuard>,
}

/// Initialize the layered tracing subscriber.
///
/// Layers:
/// 1. Console on stderr, filtered by `RUST_LOG` (default `warn`, or `info`
///    when `verbose`). Chat output owns stdout.
/// 2. JSONL file, activated by `PARLOR_TRACE_FILE`, filtered at `debug`.
pub(crate) fn init(verbose: bool) -> TracingGuard {
    let mut guards = Vec::new();

    let default_level = if verbose { "info" } else { "warn" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let jsonl_layer = std::env::var("PARLOR_TRACE_FILE").ok().map(|trace_file| {
        let (layer, guard) = jsonl_layer(Path::new(&trace_file));
        guards.push(guard);
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        layer.with_filter(filter)
    });

    Registry::default()
        .with(console_layer)
        .with(jsonl_layer)
        .init();

    TracingGuard { _guards: guards }
}

/// JSONL layer appending to `path`, with span lists and span open/close
/// records. The layer owns everything it needs and does not borrow `path`.
fn jsonl_layer<S>(
    path: &Path,
) -> (impl Layer<S> + Send + Sync + 'static + use<S>, WorkerGuard)
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let filename = path.file_name().map_or_else(
        || "parlor-traces.jsonl".to_owned(),
        |f| f.to_string_lossy().into_owned(),
    );

    let file_appender = tracing_appender::rolling::never(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_span_list(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    (layer, guard)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    #[test]
    fn jsonl_layer_records_session_spans() {
        let dir = tempfile::tempdir().unwrap();
        let trace_file = dir.path().join("parlor.jsonl");

        let (layer, guard) = jsonl_layer(&trace_file);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("session", identity = "alice");
            let _enter = span.enter();
            tracing::info!(attempt = 2, "reconnected");
        });
        drop(guard);

        let file = std::fs::File::open(&trace_file).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .filter(|l| !l.is_empty())
            .collect();
        assert!(lines.len() >= 2, "expected span and event lines: {lines:?}");

        let event_line = lines.iter().find(|l| l.contains("reconnected")).unwrap();
        let event: serde_json::Value = serde_json::from_str(event_line).unwrap();
        assert_eq!(event["fields"]["attempt"], 2);
        assert_eq!(event["spans"][0]["name"], "session");
        assert_eq!(event["spans"][0]["identity"], "alice");
    }

    #[test]
    fn layer_outlives_the_path_it_was_built_from() {
        let dir = tempfile::tempdir().unwrap();
        let (layer, guard) = {
            let trace_file = dir.path().join("short-lived.jsonl").display().to_string();
            jsonl_layer(Path::new(&trace_file))
        };

        tracing::subscriber::with_default(Registry::default().with(layer), || {
            tracing::warn!("written after the path string was dropped");
        });
        drop(guard);

        let written = std::fs::read_to_string(dir.path().join("short-lived.jsonl")).unwrap();
        assert!(written.contains("written after the path string was dropped"));
    }
}
