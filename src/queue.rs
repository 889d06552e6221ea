//! Serialized append queue.
//!
//! When several proposers run concurrently (e.g. one persona per faction),
//! their appends must be funneled through a single writer so event-id
//! allocation stays atomic: concurrent unguarded writers could allocate
//! duplicate ids. The queue spawns one writer thread that owns the append
//! path; callers submit drafts over a bounded channel and block on a reply.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

use crate::chronicle::EventDraft;
use crate::context::WorldContext;
use crate::error::{AppendError, LoomResult};
use crate::event::EventId;

/// Default job-queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

struct Job {
    draft: EventDraft,
    reply: Sender<LoomResult<EventId>>,
}

/// A single-writer append queue over a shared world context.
pub struct AppendQueue {
    tx: Option<Sender<Job>>,
    writer: Option<JoinHandle<()>>,
}

impl AppendQueue {
    /// Spawns the writer thread with the default capacity.
    #[must_use]
    pub fn spawn(ctx: Arc<WorldContext>) -> Self {
        Self::with_capacity(ctx, DEFAULT_QUEUE_CAPACITY)
    }

    /// Spawns the writer thread with a bounded job queue.
    #[must_use]
    pub fn with_capacity(ctx: Arc<WorldContext>, capacity: usize) -> Self {
        let (tx, rx) = bounded::<Job>(capacity);
        let writer = thread::Builder::new()
            .name("loom-append-writer".to_string())
            .spawn(move || writer_loop(&ctx, &rx))
            .expect("spawn append writer");
        Self {
            tx: Some(tx),
            writer: Some(writer),
        }
    }

    /// Submits a draft and blocks until the writer replies with the
    /// allocated id (or the append rejection).
    ///
    /// # Errors
    ///
    /// [`AppendError::WriterGone`] if the writer has shut down; otherwise
    /// whatever the append itself returned.
    pub fn submit(&self, draft: EventDraft) -> LoomResult<EventId> {
        let (reply_tx, reply_rx) = bounded(1);
        let job = Job {
            draft,
            reply: reply_tx,
        };
        self.sender()?
            .send(job)
            .map_err(|_| AppendError::WriterGone)?;
        recv_reply(&reply_rx)
    }

    /// Like [`AppendQueue::submit`], but fails fast instead of blocking when
    /// the queue is full.
    ///
    /// # Errors
    ///
    /// [`AppendError::QueueSaturated`] when the queue is at capacity.
    pub fn try_submit(&self, draft: EventDraft) -> LoomResult<EventId> {
        let (reply_tx, reply_rx) = bounded(1);
        let job = Job {
            draft,
            reply: reply_tx,
        };
        match self.sender()?.try_send(job) {
            Ok(()) => recv_reply(&reply_rx),
            Err(TrySendError::Full(_)) => Err(AppendError::QueueSaturated.into()),
            Err(TrySendError::Disconnected(_)) => Err(AppendError::WriterGone.into()),
        }
    }

    fn sender(&self) -> Result<&Sender<Job>, AppendError> {
        self.tx.as_ref().ok_or(AppendError::WriterGone)
    }
}

fn recv_reply(reply_rx: &Receiver<LoomResult<EventId>>) -> LoomResult<EventId> {
    reply_rx
        .recv()
        .map_err(|_| AppendError::WriterGone)?
}

fn writer_loop(ctx: &Arc<WorldContext>, rx: &Receiver<Job>) {
    debug!("append writer started");
    for job in rx {
        let result = ctx
            .update_world(|world| ctx.chronicle().append(&job.draft, world))
            .and_then(|inner| inner);
        // A dropped reply receiver just means the submitter gave up.
        let _ = job.reply.send(result);
    }
    debug!("append writer stopped");
}

impl Drop for AppendQueue {
    fn drop(&mut self) {
        // Closing the channel stops the writer loop.
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}
