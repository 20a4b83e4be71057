//! Terminal input, read line by line on a plain OS thread.
//!
//! The thread is detached: a read still pending when `main` returns does
//! not keep the process alive or stall runtime shutdown.

use std::io::{self, BufRead, BufReader, Read};
use tokio::sync::mpsc;
use tracing::debug;

/// Lines as typed, without the trailing newline. Closes at end of input.
pub(crate) type InputLines = mpsc::UnboundedReceiver<io::Result<String>>;

pub(crate) fn spawn_line_reader<R>(reader: R) -> io::Result<InputLines>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("parlor-input".to_owned())
        .spawn(move || {
            for line in BufReader::new(reader).lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
            debug!("input reader finished");
        })?;
    Ok(rx)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_arrive_in_order_then_close() {
        let mut lines = spawn_line_reader(&b"hello\r\n/to bob\nlast"[..]).unwrap();

        assert_eq!(lines.recv().await.unwrap().unwrap(), "hello");
        assert_eq!(lines.recv().await.unwrap().unwrap(), "/to bob");
        assert_eq!(lines.recv().await.unwrap().unwrap(), "last");
        assert!(lines.recv().await.is_none());
    }
}
