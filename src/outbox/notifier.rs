use tokio::sync::mpsc;

/// Receiving half of the commit signal, owned by the pump.
pub type CommitSignal = mpsc::Receiver<()>;

/// Coalescing commit signal.
///
/// A single-slot channel: posting into a full slot is silently discarded,
/// so any number of commits during one pump cycle collapse into one
/// wake-up. The pump drains the entire outbox per wake-up, which is what
/// makes the coalescing safe.
#[derive(Clone)]
pub struct CommitNotifier {
    tx: mpsc::Sender<()>,
}

impl CommitNotifier {
    pub fn channel() -> (Self, CommitSignal) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Non-blocking post. Never fails; a full slot means a wake-up is
    /// already pending and a closed channel means the pump is gone.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}
