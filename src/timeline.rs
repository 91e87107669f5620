//! Ordered queue of scheduled events driving the simulation forward.
//!
//! Events are totally ordered by the `(time, sequence)` pair and
//! delivered one at a time. Time is logical, expressed in fractional
//! seconds; it advances only when an event is popped and never goes
//! backward. The sequence counter is assigned at schedule time and
//! breaks ties between equally-timed events deterministically, in
//! schedule order. No other ordering key exists.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use fnv::FnvHashMap;
use indexmap::IndexMap;

use crate::value::Value;
use crate::{EntityId, EventName, EventUid, Float};

/// A single pending or delivered event occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Queue-unique id. A recurring event keeps its id across automatic
    /// reschedules.
    pub id: EventUid,
    pub event_type: EventName,
    /// Absolute logical delivery time.
    pub time: Float,
    /// Tie-breaker within equal times; fresh for every insertion.
    pub sequence: u64,
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
    /// Flat event payload. `source` and `target` are mirrored in here
    /// so trigger bindings can name them like any other field.
    pub fields: IndexMap<String, Value>,
    pub recurring: bool,
    pub interval: Float,
}

/// Optional parts of a schedule request.
#[derive(Debug, Default, Clone)]
pub struct ScheduleOptions {
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
    pub fields: IndexMap<String, Value>,
    pub recurring: bool,
    pub interval: Float,
}

/// Key ordering the queue. Uses total float ordering; delays are
/// sanitized at insertion so times are always finite.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EventKey {
    time: Float,
    sequence: u64,
}

impl Eq for EventKey {}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The ordered timeline of future events.
#[derive(Debug, Default)]
pub struct Timeline {
    queue: BTreeMap<EventKey, ScheduledEvent>,
    /// Pending event keys by event id, for cancellation.
    index: FnvHashMap<EventUid, EventKey>,
    now: Float,
    next_uid: EventUid,
    next_sequence: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Timeline::default()
    }

    /// Current logical time. Monotonic; advances with each pop whose
    /// event time lies ahead of it.
    pub fn now(&self) -> Float {
        self.now
    }

    pub fn has_events(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Schedules an event `delay` seconds from now. Negative or
    /// non-finite delays clamp to zero. Returns the queue-unique id.
    pub fn schedule(
        &mut self,
        event_type: &str,
        delay: Float,
        options: ScheduleOptions,
    ) -> EventUid {
        let id = self.next_uid;
        self.next_uid += 1;

        let delay = if delay.is_finite() { delay.max(0.0) } else { 0.0 };
        let mut fields = options.fields;
        let mut source = options.source;
        let mut target = options.target;
        // source/target travel both as dedicated slots and as ordinary
        // fields, whichever way the caller supplied them
        if source.is_none() {
            source = fields.get("source").and_then(|v| v.as_entity());
        }
        if target.is_none() {
            target = fields.get("target").and_then(|v| v.as_entity());
        }
        if let Some(src) = source {
            fields
                .entry("source".to_string())
                .or_insert(Value::Entity(src));
        }
        if let Some(tgt) = target {
            fields
                .entry("target".to_string())
                .or_insert(Value::Entity(tgt));
        }

        let event = ScheduledEvent {
            id,
            event_type: event_type.to_string(),
            time: self.now + delay,
            sequence: 0,
            source,
            target,
            fields,
            recurring: options.recurring,
            interval: options.interval,
        };
        self.insert(event);
        id
    }

    /// Schedules with zero delay; the `emit` action maps to this.
    pub fn schedule_immediate(&mut self, event_type: &str, options: ScheduleOptions) -> EventUid {
        self.schedule(event_type, 0.0, options)
    }

    /// Schedules a recurring event. The popped instance is reinserted
    /// with the same id at `time + interval` before delivery.
    pub fn schedule_recurring(
        &mut self,
        event_type: &str,
        interval: Float,
        delay: Float,
        mut options: ScheduleOptions,
    ) -> EventUid {
        options.recurring = true;
        options.interval = interval;
        self.schedule(event_type, delay, options)
    }

    /// Removes a pending event. For recurring events this cancels all
    /// future occurrences. Returns false for unknown ids; an event that
    /// was already popped cannot be un-fired.
    pub fn cancel(&mut self, id: EventUid) -> bool {
        match self.index.remove(&id) {
            Some(key) => self.queue.remove(&key).is_some(),
            None => false,
        }
    }

    /// Removes and returns the earliest `(time, sequence)` event,
    /// advancing `now` to its time. Recurring events are reinserted
    /// with a fresh sequence before delivery.
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        let key = *self.queue.keys().next()?;
        let event = self.queue.remove(&key)?;
        self.index.remove(&event.id);
        if event.time > self.now {
            self.now = event.time;
        }
        if event.recurring && event.interval > 0.0 {
            let mut next = event.clone();
            next.time = event.time + event.interval;
            self.insert(next);
        }
        Some(event)
    }

    /// The earliest pending event, without delivering it.
    pub fn peek(&self) -> Option<&ScheduledEvent> {
        self.queue.values().next()
    }

    /// Drops every pending event. `now` is kept.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.index.clear();
    }

    fn insert(&mut self, mut event: ScheduledEvent) {
        event.sequence = self.next_sequence;
        self.next_sequence += 1;
        let key = EventKey {
            time: event.time,
            sequence: event.sequence,
        };
        self.index.insert(event.id, key);
        self.queue.insert(key, event);
    }
}
