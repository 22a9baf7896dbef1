//! A table-driven finite state machine.
//!
//! The machine owns only its current state. Everything a guard inspects or an
//! action mutates lives in a context owned by the caller and lent to
//! [`Machine::fire`]. A guard that matches hands a payload (for example a
//! parsed message) to its paired action, so the action never re-parses what
//! the guard already looked at.

use std::fmt::Debug;

pub type Guard<C, E> = Box<dyn Fn(&C) -> Option<E>>;
pub type Action<C, E> = Box<dyn Fn(&mut C, E)>;

pub struct Rule<S, C, E> {
    from: S,
    guard: Guard<C, E>,
    to: S,
    action: Action<C, E>,
}

impl<S, C, E> Rule<S, C, E> {
    pub fn new(
        from: S,
        guard: impl Fn(&C) -> Option<E> + 'static,
        to: S,
        action: impl Fn(&mut C, E) + 'static,
    ) -> Self {
        Self {
            from,
            guard: Box::new(guard),
            to,
            action: Box::new(action),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
}

impl<S: PartialEq> Transition<S> {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Rules are evaluated in declaration order and the first rule whose source
/// state is current and whose guard matches wins. Callers must fire from a
/// single logical thread: there is no locking.
pub struct Machine<S, C, E> {
    name: String,
    state: S,
    rules: Vec<Rule<S, C, E>>,
}

impl<S: Clone + PartialEq + Debug, C, E> Machine<S, C, E> {
    pub fn new(name: impl Into<String>, initial: S, rules: Vec<Rule<S, C, E>>) -> Self {
        Self {
            name: name.into(),
            state: initial,
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Performs at most one transition. The action runs before the state
    /// is switched to the rule's destination.
    pub fn fire(&mut self, ctx: &mut C) -> Option<Transition<S>> {
        let state = &self.state;
        let (rule, payload) = self
            .rules
            .iter()
            .filter(|rule| rule.from == *state)
            .find_map(|rule| (rule.guard)(ctx).map(|payload| (rule, payload)))?;

        (rule.action)(ctx, payload);
        let from = std::mem::replace(&mut self.state, rule.to.clone());
        tracing::debug!(machine = %self.name, ?from, to = ?self.state, "transition");
        Some(Transition {
            from,
            to: self.state.clone(),
        })
    }
}
