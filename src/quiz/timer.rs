use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::session::SessionCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The open question's deadline has been reached
    QuestionDeadline,
    /// The results countdown finished; move on to the next question
    ResultsCountdown,
}

/// Delivered to the session actor as an ordinary command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub kind: TimerKind,
    pub question_index: usize,
    pub generation: u64,
}

/// At most one pending deadline per session.
///
/// Each arm or cancel bumps the generation, so an event that was already in
/// flight when the timer was superseded no longer matches and is dropped.
#[derive(Debug, Default)]
pub struct QuestionTimer {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl QuestionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(
        &mut self,
        at: Instant,
        kind: TimerKind,
        question_index: usize,
        commands: &mpsc::UnboundedSender<SessionCommand>,
    ) -> u64 {
        self.cancel();
        let event = TimerEvent {
            kind,
            question_index,
            generation: self.generation,
        };
        let commands = commands.clone();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            // The session may already be gone; nothing to do then
            let _ = commands.send(SessionCommand::Timer(event));
        }));

        tracing::debug!(
            ?kind,
            question_index,
            generation = event.generation,
            "Question timer armed"
        );
        event.generation
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        self.generation += 1;
    }

    pub fn is_current(&self, event: &TimerEvent) -> bool {
        event.generation == self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for QuestionTimer {
    fn drop(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn expect_timer(command: Option<SessionCommand>) -> TimerEvent {
        match command {
            Some(SessionCommand::Timer(event)) => event,
            other => panic!("expected timer event, got {:?}", other.is_some()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_deadline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = QuestionTimer::new();
        let opened = Instant::now();
        timer.arm(
            opened + Duration::from_secs(30),
            TimerKind::QuestionDeadline,
            0,
            &tx,
        );

        let event = expect_timer(rx.recv().await);
        assert_eq!(event.kind, TimerKind::QuestionDeadline);
        assert_eq!(event.question_index, 0);
        assert!(timer.is_current(&event));
        assert!(Instant::now() >= opened + Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_delivery() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = QuestionTimer::new();
        timer.arm(
            Instant::now() + Duration::from_secs(5),
            TimerKind::QuestionDeadline,
            0,
            &tx,
        );
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_invalidates_older_generation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer = QuestionTimer::new();
        let first = timer.arm(
            Instant::now() + Duration::from_secs(5),
            TimerKind::QuestionDeadline,
            0,
            &tx,
        );
        let second = timer.arm(
            Instant::now() + Duration::from_secs(3),
            TimerKind::ResultsCountdown,
            0,
            &tx,
        );
        assert!(second > first);

        let stale = TimerEvent {
            kind: TimerKind::QuestionDeadline,
            question_index: 0,
            generation: first,
        };
        assert!(!timer.is_current(&stale));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_in_flight_is_stale_after_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = QuestionTimer::new();
        timer.arm(Instant::now(), TimerKind::QuestionDeadline, 2, &tx);

        // Let the task deliver before the cancel happens
        let event = expect_timer(rx.recv().await);
        timer.cancel();
        assert!(!timer.is_current(&event));
    }
}
