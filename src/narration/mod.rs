//! Read-aloud narration of recipes.
//!
//! A single [`Narrator`] owns the shared speech device. Starting a narration
//! cancels whatever is active first, so at most one target is ever speaking,
//! whoever started it. Each run belongs to the user who started it: only that
//! user sees its state, alerts and events, and only that user can cancel it.
//! Each run is one task walking its segments (speak, then wait) with a
//! [`CancellationToken`] raced against every await. Runs are numbered; a task
//! whose number is no longer current cannot touch the state.

pub mod device;
pub mod handlers;
pub mod segments;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use device::{CommandDevice, SilentDevice, SpeechDevice, SpeechError};
pub use handlers::router;

text_enum! {
    pub enum Target {
        Ingredients => "ingredients", "Ingredientes";
        Steps => "steps", "Pasos";
    }
}

text_enum! {
    pub enum Audience {
        Adult => "adult", "Adultos";
        Child => "child", "Niños";
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NarrationState {
    Idle,
    Speaking { target: Target, segment: usize, total: usize },
    Waiting { target: Target, segment: usize, total: usize },
}

impl NarrationState {
    pub fn target(&self) -> Option<Target> {
        match self {
            NarrationState::Idle => None,
            NarrationState::Speaking { target, .. } | NarrationState::Waiting { target, .. } => Some(*target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NarrationEvent {
    Started { target: Target, total: usize },
    Segment { target: Target, index: usize, total: usize, text: String },
    Finished { target: Target },
    Cancelled { target: Target },
    Alert { target: Target, message: String },
}

/// An event together with the user whose run produced it.
pub type OwnedEvent = (Arc<str>, NarrationEvent);

struct Run {
    generation: u64,
    owner: Option<Arc<str>>,
    state: NarrationState,
    token: Option<CancellationToken>,
    /// Unread device failures, by owner.
    alerts: HashMap<Arc<str>, String>,
}

impl Run {
    fn owned_by(&self, owner: &str) -> bool {
        self.owner.as_deref() == Some(owner)
    }
}

struct Inner {
    device: Arc<dyn SpeechDevice>,
    delay: Duration,
    voice: RwLock<String>,
    run: Mutex<Run>,
    events: broadcast::Sender<OwnedEvent>,
}

#[derive(Clone)]
pub struct Narrator {
    inner: Arc<Inner>,
}

impl Narrator {
    pub fn new(device: Arc<dyn SpeechDevice>, delay: Duration, voice: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                device,
                delay,
                voice: RwLock::new(voice.to_owned()),
                run: Mutex::new(Run {
                    generation: 0,
                    owner: None,
                    state: NarrationState::Idle,
                    token: None,
                    alerts: HashMap::new(),
                }),
                events: broadcast::channel(64).0,
            }),
        }
    }

    fn run(&self) -> MutexGuard<'_, Run> {
        self.inner.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, owner: &Arc<str>, event: NarrationEvent) {
        let _ = self.inner.events.send((owner.clone(), event));
    }

    /// Cancels any active narration, whoever owns it, then starts speaking
    /// `segments` on behalf of `owner`.
    pub fn start(&self, owner: &str, target: Target, segments: Vec<String>) -> NarrationState {
        let owner: Arc<str> = Arc::from(owner);
        let token = CancellationToken::new();
        let total = segments.len();

        let (generation, state) = {
            let mut run = self.run();
            self.cancel_locked(&mut run);
            run.generation += 1;
            run.owner = Some(owner.clone());
            run.state = NarrationState::Speaking { target, segment: 0, total };
            run.token = Some(token.clone());
            run.alerts.remove(&owner);
            (run.generation, run.state)
        };

        info!("narrating {target} ({total} segments) for {owner}");
        self.emit(&owner, NarrationEvent::Started { target, total });
        tokio::spawn(narrate(self.clone(), owner, generation, target, segments, token));
        state
    }

    /// Stops `owner`'s run and returns to idle. A no-op when nothing is
    /// active or the active run belongs to someone else.
    pub fn cancel(&self, owner: &str) -> NarrationState {
        let mut run = self.run();
        if run.owned_by(owner) {
            self.cancel_locked(&mut run);
        }
        NarrationState::Idle
    }

    fn cancel_locked(&self, run: &mut Run) {
        let Some(target) = run.state.target() else {
            return;
        };
        if let Some(token) = run.token.take() {
            token.cancel();
        }
        self.inner.device.stop();
        run.generation += 1;
        run.state = NarrationState::Idle;
        if let Some(owner) = run.owner.take() {
            debug!("cancelled {target} narration of {owner}");
            self.emit(&owner, NarrationEvent::Cancelled { target });
        }
    }

    /// The state of `owner`'s run; idle when the device is someone else's.
    pub fn state(&self, owner: &str) -> NarrationState {
        let run = self.run();
        if run.owned_by(owner) { run.state } else { NarrationState::Idle }
    }

    /// The last device failure of `owner`'s runs, cleared once read.
    pub fn take_alert(&self, owner: &str) -> Option<String> {
        self.run().alerts.remove(owner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OwnedEvent> {
        self.inner.events.subscribe()
    }

    /// Every event of `owner`'s runs from now on.
    pub fn events(&self, owner: &str) -> impl Stream<Item = NarrationEvent> + Send + 'static + use<> {
        let owner: Arc<str> = Arc::from(owner);
        BroadcastStream::new(self.subscribe()).filter_map(move |item| {
            let event = match item {
                Ok((to, event)) if to == owner => Some(event),
                Ok(_) => None,
                Err(err) => {
                    warn!("narration events for {owner}: {err}");
                    None
                }
            };
            futures_util::future::ready(event)
        })
    }

    pub fn voice(&self) -> String {
        self.inner.voice.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Takes effect from the next segment on.
    pub fn set_voice(&self, voice: &str) {
        *self.inner.voice.write().unwrap_or_else(PoisonError::into_inner) = voice.to_owned();
        info!("narration voice set to {voice}");
    }

    /// Moves a live run to `state`; false once the run has been superseded.
    fn advance(&self, generation: u64, state: NarrationState) -> bool {
        let mut run = self.run();
        if run.generation != generation {
            return false;
        }
        run.state = state;
        true
    }

    fn finish(&self, owner: &Arc<str>, generation: u64, target: Target, alert: Option<String>) {
        let mut run = self.run();
        if run.generation != generation {
            return;
        }
        run.state = NarrationState::Idle;
        run.token = None;
        run.owner = None;
        match alert {
            Some(message) => {
                warn!("{target} narration failed: {message}");
                run.alerts.insert(owner.clone(), message.clone());
                self.emit(owner, NarrationEvent::Alert { target, message });
            }
            None => {
                debug!("{target} narration finished");
                self.emit(owner, NarrationEvent::Finished { target });
            }
        }
    }
}

async fn narrate(
    narrator: Narrator,
    owner: Arc<str>,
    generation: u64,
    target: Target,
    segments: Vec<String>,
    token: CancellationToken,
) {
    let total = segments.len();
    let device = narrator.inner.device.clone();

    for (index, text) in segments.into_iter().enumerate() {
        if token.is_cancelled() || !narrator.advance(generation, NarrationState::Speaking { target, segment: index, total }) {
            return;
        }

        let voice = narrator.voice();
        narrator.emit(&owner, NarrationEvent::Segment { target, index, total, text: text.clone() });
        let spoken = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            spoken = device.speak(&text, &voice) => spoken,
        };
        if let Err(err) = spoken {
            // errors caused by a stop are not failures
            if !token.is_cancelled() {
                narrator.finish(&owner, generation, target, Some(err.to_string()));
            }
            return;
        }

        if index + 1 == total {
            break;
        }
        if !narrator.advance(generation, NarrationState::Waiting { target, segment: index, total }) {
            return;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(narrator.inner.delay) => {}
        }
    }

    narrator.finish(&owner, generation, target, None);
}
