use anyhow::Result;
use crossterm::event::{Event as CrosstermEvent, KeyEvent, KeyEventKind};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Terminal events
#[derive(Debug, Clone)]
pub enum Event {
    /// Frame tick; screens drain their backend messages on it
    Tick,
    /// Key press
    Key(KeyEvent),
    /// Pasted text (bracketed paste)
    Paste(String),
    /// Terminal resize
    Resize(u16, u16),
}

/// Merges crossterm input with a steady tick.
#[derive(Debug)]
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    reader: JoinHandle<()>,
}

impl EventHandler {
    #[must_use]
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            let mut reader = crossterm::event::EventStream::new();
            let mut tick = tokio::time::interval(tick_rate);

            loop {
                let event = tokio::select! {
                    _ = tick.tick() => Event::Tick,
                    next = reader.next() => match next {
                        Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => {
                            Event::Key(key)
                        }
                        Some(Ok(CrosstermEvent::Paste(text))) => Event::Paste(text),
                        Some(Ok(CrosstermEvent::Resize(w, h))) => Event::Resize(w, h),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::error!("terminal input failed: {e}");
                            break;
                        }
                        None => break,
                    },
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Self { rx, reader }
    }

    /// Receive the next event
    ///
    /// # Errors
    ///
    /// Returns an error once terminal input has ended
    pub async fn next(&mut self) -> Result<Event> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("Event channel closed"))
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
