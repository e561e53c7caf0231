use super::Controller;
use crate::bus::MessageBus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Play/pause state of the animation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Stopped,
    Playing,
}

struct Progress {
    playback: Playback,
    position: usize,
    last_paused_time: usize,
    /// The previous run reached the last timestep
    completed: bool,
    /// Ticks since the last play
    ticks: usize,
    ticker: Option<JoinHandle<()>>,
}

struct Inner {
    controller: Controller,
    bus: Arc<MessageBus>,
    period: Duration,
    progress: Mutex<Progress>,
    playback_tx: watch::Sender<Playback>,
}

impl Inner {
    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_playback(&self, progress: &mut Progress, playback: Playback) {
        progress.playback = playback;
        self.playback_tx.send_replace(playback);
    }

    fn tick(&self) -> Playback {
        let mut progress = self.progress();
        if progress.playback != Playback::Playing {
            return Playback::Stopped;
        }

        let position = progress.position + 1;
        progress.position = position;
        progress.ticks += 1;
        self.controller.render(&self.bus, position);

        if position >= self.controller.timeline().last_position() {
            progress.completed = true;
            progress.last_paused_time = position;
            // May be the ticker itself; it stops at its next await
            if let Some(ticker) = progress.ticker.take() {
                ticker.abort();
            }
            self.set_playback(&mut progress, Playback::Stopped);
            info!(position = position, ticks = progress.ticks, "Animation finished");
        }

        progress.playback
    }
}

async fn run_ticker(inner: Arc<Inner>) {
    let mut ticker = interval(inner.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // First tick completes immediately; play already rendered the start frame
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if inner.tick() == Playback::Stopped {
            break;
        }
    }
}

/// Fixed-interval animation over the dashboard timeline.
///
/// Each tick renders the next timestep. Playback stops by itself on the
/// last timestep, so a timeline of `L` steps takes `L - 1` ticks. Pausing
/// only stops the ticks; data loads in flight are left alone.
#[derive(Clone)]
pub struct Animation {
    inner: Arc<Inner>,
}

impl Animation {
    pub fn new(controller: Controller, bus: Arc<MessageBus>, period: Duration) -> Self {
        let (playback_tx, _) = watch::channel(Playback::Stopped);

        Self {
            inner: Arc::new(Inner {
                controller,
                bus,
                period: period.max(Duration::from_millis(1)),
                progress: Mutex::new(Progress {
                    playback: Playback::Stopped,
                    position: 0,
                    last_paused_time: 0,
                    completed: false,
                    ticks: 0,
                    ticker: None,
                }),
                playback_tx,
            }),
        }
    }

    pub fn playback(&self) -> Playback {
        self.inner.progress().playback
    }

    /// Timeline position last rendered by the animation
    pub fn position(&self) -> usize {
        self.inner.progress().position
    }

    pub fn last_paused_time(&self) -> usize {
        self.inner.progress().last_paused_time
    }

    /// Ticks since the last play
    pub fn ticks(&self) -> usize {
        self.inner.progress().ticks
    }

    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Watch playback changes
    pub fn subscribe(&self) -> watch::Receiver<Playback> {
        self.inner.playback_tx.subscribe()
    }

    /// Start playing from where the last run paused, or from the start if it
    /// completed. Renders the start frame right away. Must be called from
    /// within a tokio runtime.
    pub fn play(&self) -> Playback {
        let inner = &self.inner;
        let mut progress = inner.progress();
        if progress.playback == Playback::Playing {
            return Playback::Playing;
        }

        let start = if progress.completed {
            0
        } else {
            progress.last_paused_time
        };
        progress.completed = false;
        progress.position = start;
        progress.ticks = 0;
        inner.controller.render(&inner.bus, start);

        if start >= inner.controller.timeline().last_position() {
            progress.completed = true;
            debug!(position = start, "Nothing left to play");
            return Playback::Stopped;
        }

        progress.ticker = Some(tokio::spawn(run_ticker(Arc::clone(inner))));
        inner.set_playback(&mut progress, Playback::Playing);

        info!(
            position = start,
            period_ms = inner.period.as_millis() as u64,
            "Animation playing"
        );
        Playback::Playing
    }

    /// Stop ticking and remember the position for the next play
    pub fn pause(&self) -> Playback {
        let inner = &self.inner;
        let mut progress = inner.progress();
        if progress.playback != Playback::Playing {
            return Playback::Stopped;
        }

        if let Some(ticker) = progress.ticker.take() {
            ticker.abort();
        }
        progress.last_paused_time = progress.position;
        inner.set_playback(&mut progress, Playback::Stopped);

        info!(position = progress.position, "Animation paused");
        Playback::Stopped
    }

    /// Advance one step, as the timer does. No-op unless playing.
    pub fn tick(&self) -> Playback {
        self.inner.tick()
    }

    /// Play and wait until playback stops
    pub async fn run(&self) {
        let mut playback = self.subscribe();
        if self.play() != Playback::Playing {
            return;
        }

        loop {
            if *playback.borrow_and_update() == Playback::Stopped {
                break;
            }
            if playback.changed().await.is_err() {
                break;
            }
        }
    }
}
