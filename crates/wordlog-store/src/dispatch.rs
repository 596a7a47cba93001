//! Ordered handler table for solver-defined log lines.
//!
//! Solvers register `(matcher, handler)` pairs; each payload goes to the
//! first handler whose matcher accepts it. The same table serves live
//! input and replay, so a line means the same thing either way.

use regex::{Captures, Regex};

use crate::replay::Snapshot;
use crate::warning::{Warning, WarningSink};

pub enum Matcher {
    /// Payload starts with this text.
    Prefix(String),
    /// Payload matches this regex (anchor it yourself if needed).
    Pattern(Regex),
}

impl Matcher {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Matcher::Prefix(prefix.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Pattern(Regex::new(pattern)?))
    }

    fn accept<'p>(&self, offset: f64, payload: &'p str) -> Option<Event<'p>> {
        match self {
            Matcher::Prefix(prefix) => payload.strip_prefix(prefix.as_str()).map(|rest| Event {
                offset,
                payload,
                rest: rest.trim_start(),
                captures: None,
            }),
            Matcher::Pattern(regex) => regex.captures(payload).map(|captures| {
                let end = captures.get(0).map_or(0, |m| m.end());
                Event {
                    offset,
                    payload,
                    rest: payload[end..].trim_start(),
                    captures: Some(captures),
                }
            }),
        }
    }
}

/// A payload accepted by a matcher.
pub struct Event<'p> {
    pub offset: f64,
    pub payload: &'p str,
    /// Text after the matched prefix or pattern, leading spaces trimmed.
    pub rest: &'p str,
    captures: Option<Captures<'p>>,
}

impl<'p> Event<'p> {
    /// Numbered capture group; always `None` for prefix matches.
    pub fn group(&self, index: usize) -> Option<&'p str> {
        self.captures
            .as_ref()
            .and_then(|c| c.get(index))
            .map(|m| m.as_str())
    }

    pub fn named(&self, name: &str) -> Option<&'p str> {
        self.captures
            .as_ref()
            .and_then(|c| c.name(name))
            .map(|m| m.as_str())
    }
}

pub type Handler<S> = Box<dyn FnMut(&mut S, &Event<'_>) -> Result<(), String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unhandled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: usize,
    pub unhandled: usize,
    pub failed: usize,
}

pub struct Dispatcher<S> {
    handlers: Vec<(Matcher, Handler<S>)>,
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Dispatcher<S> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Builder form of [`Dispatcher::register`].
    pub fn on<F>(mut self, matcher: Matcher, handler: F) -> Self
    where
        F: FnMut(&mut S, &Event<'_>) -> Result<(), String> + 'static,
    {
        self.register(matcher, handler);
        self
    }

    pub fn register<F>(&mut self, matcher: Matcher, handler: F)
    where
        F: FnMut(&mut S, &Event<'_>) -> Result<(), String> + 'static,
    {
        self.handlers.push((matcher, Box::new(handler)));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Hand `payload` to the first matching handler.
    pub fn dispatch(&mut self, state: &mut S, offset: f64, payload: &str) -> Result<Dispatch, String> {
        for (matcher, handler) in &mut self.handlers {
            if let Some(event) = matcher.accept(offset, payload) {
                handler(state, &event)?;
                return Ok(Dispatch::Handled);
            }
        }
        Ok(Dispatch::Unhandled)
    }

    /// Feed every replayed entry through the table. Handler failures are
    /// reported to `sink` and skipped.
    pub fn replay_into(
        &mut self,
        snapshot: &Snapshot,
        state: &mut S,
        sink: &mut dyn WarningSink,
    ) -> DispatchStats {
        let mut stats = DispatchStats::default();
        for entry in &snapshot.entries {
            match self.dispatch(state, entry.offset, &entry.payload) {
                Ok(Dispatch::Handled) => stats.handled += 1,
                Ok(Dispatch::Unhandled) => stats.unhandled += 1,
                Err(reason) => {
                    stats.failed += 1;
                    sink.warn(Warning::BadEvent {
                        line: entry.line,
                        payload: entry.payload.clone(),
                        reason,
                    });
                }
            }
        }
        stats
    }
}
