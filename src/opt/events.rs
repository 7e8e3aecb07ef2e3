//! Record of what the optimizer did.
//!
//! Passes append an [`Event`] for every rewrite they perform and for pass boundaries.
//! Drivers and tests inspect the [`EventLog`] afterwards, or ignore it.
//!
//! # Example
//!
//! ```rust,ignore
//! use silcore::opt::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ClassMethodDevirtualized)
//!     .at(caller, call)
//!     .message("class_method Base.get -> @Leaf.get");
//! log.info("starting pipeline");
//!
//! println!("{}", log.summary());
//! ```

use std::{collections::HashMap, fmt};

use crate::ir::{FunctionId, InstId};

/// Categories of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A `class_method` call became a direct call.
    ClassMethodDevirtualized,
    /// A `super_method` call became a direct call.
    SuperMethodDevirtualized,
    /// A `witness_method` call became a direct call.
    WitnessMethodDevirtualized,
    /// A specialization of a generic function was created.
    FunctionSpecialized,
    /// A call to a generic function was redirected to a specialization.
    CallSpecialized,
    /// Instructions were deleted as a consequence of a rewrite.
    InstructionRemoved,

    /// A pass started.
    PassStarted,
    /// A pass completed.
    PassCompleted,

    /// Informational message.
    Info,
    /// Something unexpected but recoverable.
    Warning,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ClassMethodDevirtualized => "class method devirtualized",
            Self::SuperMethodDevirtualized => "super method devirtualized",
            Self::WitnessMethodDevirtualized => "witness method devirtualized",
            Self::FunctionSpecialized => "function specialized",
            Self::CallSpecialized => "call specialized",
            Self::InstructionRemoved => "instruction removed",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }

    /// Returns `true` for events describing a change to the module.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::ClassMethodDevirtualized
                | Self::SuperMethodDevirtualized
                | Self::WitnessMethodDevirtualized
                | Self::FunctionSpecialized
                | Self::CallSpecialized
                | Self::InstructionRemoved
        )
    }

    /// Returns `true` for devirtualization events.
    #[must_use]
    pub fn is_devirtualization(&self) -> bool {
        matches!(
            self,
            Self::ClassMethodDevirtualized
                | Self::SuperMethodDevirtualized
                | Self::WitnessMethodDevirtualized
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The function the event happened in.
    pub function: Option<FunctionId>,
    /// The instruction the event is about, e.g. the new call.
    pub inst: Option<InstId>,
    /// How many things the event covers, e.g. the number of removed instructions.
    pub count: usize,
    /// Human-readable description.
    pub message: String,
    /// Name of the pass that recorded the event.
    pub pass: Option<&'static str>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            function: None,
            inst: None,
            count: 1,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Fluent builder for an event.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Option<Event>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            event: Some(Event::new(kind, kind.description())),
        }
    }

    fn update(mut self, f: impl FnOnce(&mut Event)) -> Self {
        if let Some(event) = self.event.as_mut() {
            f(event);
        }
        self
    }

    /// Sets the function and instruction.
    pub fn at(self, function: FunctionId, inst: InstId) -> Self {
        self.update(|e| {
            e.function = Some(function);
            e.inst = Some(inst);
        })
    }

    /// Sets only the function.
    pub fn function(self, function: FunctionId) -> Self {
        self.update(|e| e.function = Some(function))
    }

    /// Sets the number of things the event covers.
    pub fn count(self, count: usize) -> Self {
        self.update(|e| e.count = count)
    }

    /// Sets a message describing the event.
    pub fn message(self, msg: impl Into<String>) -> Self {
        self.update(|e| e.message = msg.into())
    }

    /// Associates the event with a pass.
    pub fn pass(self, name: &'static str) -> Self {
        self.update(|e| e.pass = Some(name))
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.events.push(event);
        }
    }
}

/// Append-only collection of events.
///
/// Events are appended through shared references, so a log can be handed to several
/// consumers at once.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let log = Self::new();
        log.merge(self);
        log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns `true` if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Appends copies of the events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns `true` if an event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).count()
    }

    /// Sums the counts of the events of the given kind.
    #[must_use]
    pub fn total(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).map(|e| e.count).sum()
    }

    /// Returns an iterator over all events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over the events of a function.
    pub fn filter_function(&self, function: FunctionId) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.function == Some(function))
    }

    /// Returns an iterator over transformation events.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of calls that became direct.
    #[must_use]
    pub fn devirtualized_count(&self) -> usize {
        self.iter().filter(|e| e.kind.is_devirtualization()).count()
    }

    /// Generates a one-line summary of the transformations.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }
        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(kind, _)| kind.is_transformation())
            .map(|(kind, _)| format!("{} {}", self.total(*kind), kind.description()))
            .collect();
        if parts.is_empty() {
            return format!("{} events", self.len());
        }
        parts.sort();
        parts.join(", ")
    }
}

/// Iterator over the events of an [`EventLog`].
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}
