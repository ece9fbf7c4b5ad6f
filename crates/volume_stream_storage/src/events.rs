use volume_stream_core::prelude::*;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Identifies one consumer of a `VolumeStreamer`: an attached 3-D view, or the slab for one slice orientation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ConsumerId {
    Volume(u64),
    Slab(Axis3),
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerId::Volume(n) => write!(f, "volume-{}", n),
            ConsumerId::Slab(axis) => write!(f, "slab-{:?}", axis),
        }
    }
}

/// Why a load was started.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TriggerReason {
    /// The first load after attaching.
    Initial,
    ClipPlanes,
    Viewport,
    SliceMoved,
    /// An explicit populate call.
    Manual,
    ConfigChanged,
}

/// Lifecycle notifications. Slab consumers report starting and finishing with the `Slab*` variants instead of
/// `LoadingStart` and `LoadingComplete`.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    LoadingStart {
        consumer: ConsumerId,
        target_level: usize,
        reason: TriggerReason,
    },
    LoadingComplete {
        consumer: ConsumerId,
        current_level: usize,
        target_level: usize,
        reason: TriggerReason,
    },
    /// A buffer at a different level than before was installed.
    ResolutionChange {
        consumer: ConsumerId,
        previous_level: Option<usize>,
        level: usize,
        reason: TriggerReason,
    },
    /// The consumer has no more queued work.
    PopulateComplete {
        consumer: ConsumerId,
        level: Option<usize>,
    },
    /// A queued request was replaced before it ran.
    RequestSuperseded {
        consumer: ConsumerId,
        reason: TriggerReason,
    },
    SlabLoadingStart {
        axis: Axis3,
        level: usize,
        slab_start: i64,
        slab_end: i64,
        reason: TriggerReason,
    },
    SlabLoadingComplete {
        axis: Axis3,
        level: usize,
        slab_start: i64,
        slab_end: i64,
        reason: TriggerReason,
    },
    ClipPlanesChanged {
        planes: Vec<ClipPlane>,
    },
    /// A fetch failed; the consumer kept its previous buffer.
    LoadFailed {
        consumer: ConsumerId,
        level: usize,
        reason: TriggerReason,
        error: String,
    },
}

/// Fans events out to every live subscriber. Subscribers that dropped their receiver are forgotten on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<UnboundedSender<StreamEvent>>>,
}

impl EventBus {
    pub fn subscribe(&self) -> UnboundedReceiver<StreamEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);

        rx
    }

    pub fn emit(&self, event: StreamEvent) {
        tracing::debug!(?event, "stream event");
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn every_subscriber_receives_events_and_dropped_ones_are_pruned() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let b = bus.subscribe();
        drop(b);

        let event = StreamEvent::ClipPlanesChanged { planes: vec![] };
        bus.emit(event.clone());

        assert_eq!(a.try_next().unwrap(), Some(event));
        assert_eq!(bus.subscribers.lock().unwrap().len(), 1);
    }

    #[test]
    fn consumer_ids_display_kind() {
        assert_eq!(ConsumerId::Volume(2).to_string(), "volume-2");
        assert_eq!(ConsumerId::Slab(Axis3::Z).to_string(), "slab-Z");
    }
}
