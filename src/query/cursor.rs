//! Streaming result handle.
//!
//! A blocking producer task pulls the lazy sequence and feeds a bounded channel. The cursor owns
//! the receiving end; closing or dropping it cancels the producer.
use super::value::Sequence;
use crate::datum::Datum;
use crate::errors::DbError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CURSOR_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Open,
    Exhausted,
    Closed,
}

type Item = Result<Datum, DbError>;

pub struct Cursor {
    rx: Option<mpsc::Receiver<Item>>,
    peeked: Option<Item>,
    cancel: CancellationToken,
    state: CursorState,
    infinite: bool,
    array_limit: usize,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("state", &self.state)
            .field("infinite", &self.infinite)
            .field("array_limit", &self.array_limit)
            .finish()
    }
}

impl Cursor {
    /// Starts producing `seq` on the blocking pool. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(seq: Sequence, buffer: usize, array_limit: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        let infinite = seq.infinite;
        let token = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut sent = 0_u64;
            for item in seq {
                if token.is_cancelled() {
                    break;
                }
                let failed = item.is_err();
                if tx.blocking_send(item).is_err() || failed {
                    break;
                }
                sent += 1;
            }
            log::trace!("cursor producer finished: rows={sent}, cancelled={}", token.is_cancelled());
        });
        Self { rx: Some(rx), peeked: None, cancel, state: CursorState::Open, infinite, array_limit }
    }

    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        self.infinite
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.state == CursorState::Closed {
            return Err(DbError::CursorClosed);
        }
        Ok(())
    }

    async fn pull(&mut self) -> Option<Item> {
        if let Some(item) = self.peeked.take() {
            return Some(item);
        }
        let item = match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        };
        if item.is_none() {
            self.state = CursorState::Exhausted;
        }
        item
    }

    /// Whether another row (or a pending error) is available. Waits for the producer.
    pub async fn has_next(&mut self) -> Result<bool, DbError> {
        self.ensure_open()?;
        if self.peeked.is_none() {
            self.peeked = self.pull().await;
        }
        Ok(self.peeked.is_some())
    }

    /// Next row, `Ok(None)` once the stream is exhausted. An error ends the stream.
    pub async fn try_next(&mut self) -> Result<Option<Datum>, DbError> {
        self.ensure_open()?;
        match self.pull().await {
            None => Ok(None),
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => {
                self.state = CursorState::Exhausted;
                self.rx = None;
                Err(e)
            }
        }
    }

    pub async fn next(&mut self) -> Result<Datum, DbError> {
        self.try_next()
            .await?
            .ok_or_else(|| DbError::IndexOutOfRange("No more rows in the cursor.".into()))
    }

    /// Feeds rows to `f` until it returns `Ok(false)`, fails, or the stream ends. The cursor is
    /// closed afterwards in every case.
    pub async fn each<F>(&mut self, mut f: F) -> Result<(), DbError>
    where
        F: FnMut(Datum) -> Result<bool, DbError>,
    {
        let outcome = loop {
            match self.try_next().await {
                Ok(Some(row)) => match f(row) {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(e) => break Err(e),
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.close();
        outcome
    }

    /// Drains the remaining rows. Infinite streams and results over the array limit are refused.
    pub async fn to_array(&mut self) -> Result<Vec<Datum>, DbError> {
        self.ensure_open()?;
        if self.infinite {
            return Err(DbError::ResourceExhausted(
                "Cannot convert an infinite stream to an array".into(),
            ));
        }
        let mut out = Vec::new();
        while let Some(row) = self.try_next().await? {
            if out.len() >= self.array_limit {
                self.close();
                return Err(DbError::ResourceExhausted(format!(
                    "Array over size limit `{}`.",
                    self.array_limit
                )));
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Stops the producer and releases buffered rows. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.state != CursorState::Closed {
            log::debug!("cursor: close state={:?}", self.state);
        }
        self.state = CursorState::Closed;
        self.cancel.cancel();
        self.rx = None;
        self.peeked = None;
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
