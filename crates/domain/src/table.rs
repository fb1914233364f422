//! Explicit transition tables.
//!
//! A table is an ordered list of rules of the form
//! `state × event [guard] → next state; action; effects; reply`.
//! Evaluation picks the first rule for the exact current state, then falls
//! back to the first `Any` rule. If nothing matches the event is unhandled.

use std::fmt;
use std::time::Duration;

use crate::decision::{Decision, Effect, Transition};
use crate::machine::{InstanceOf, MachineEvent, StateMachine};

type Guard<D> = Box<dyn Fn(&D) -> bool + Send + Sync>;
type Action<D> = Box<dyn Fn(&mut D) + Send + Sync>;
type Select<S, D> = Box<dyn Fn(&D) -> S + Send + Sync>;

/// Which states a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter<S> {
    /// Only the given state.
    In(S),

    /// Every state.
    Any,
}

enum Target<S, D> {
    Stay,
    To(S),
    Computed(Select<S, D>),
}

/// One row of a transition table.
pub struct Rule<M: StateMachine> {
    from: StateFilter<M::State>,
    on: &'static str,
    guard: Option<Guard<M::Data>>,
    action: Option<Action<M::Data>>,
    target: Target<M::State, M::Data>,
    effects: Vec<Effect<M::Event>>,
    reply: bool,
    note: &'static str,
}

impl<M: StateMachine> Rule<M> {
    /// Starts a rule reacting to `event` while in the filtered states.
    ///
    /// Only the event's type is recorded; payloads are not compared.
    pub fn on(from: StateFilter<M::State>, event: &M::Event) -> Self {
        Self {
            from,
            on: event.event_type(),
            guard: None,
            action: None,
            target: Target::Stay,
            effects: Vec::new(),
            reply: false,
            note: "",
        }
    }

    /// Only fires when the guard holds for the current data.
    pub fn when(mut self, guard: impl Fn(&M::Data) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Mutates the data when the rule fires.
    pub fn then(mut self, action: impl Fn(&mut M::Data) + Send + Sync + 'static) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    /// Moves to a fixed state.
    pub fn to(mut self, state: M::State) -> Self {
        self.target = Target::To(state);
        self
    }

    /// Picks the next state from the data after the action ran.
    pub fn to_computed(
        mut self,
        select: impl Fn(&M::Data) -> M::State + Send + Sync + 'static,
    ) -> Self {
        self.target = Target::Computed(Box::new(select));
        self
    }

    /// Arms a timer slot.
    pub fn schedule(mut self, slot: &'static str, delay: Duration, event: M::Event) -> Self {
        self.effects.push(Effect::Schedule { slot, delay, event });
        self
    }

    /// Cancels a timer slot.
    pub fn unschedule(mut self, slot: &'static str) -> Self {
        self.effects.push(Effect::Unschedule { slot });
        self
    }

    /// Publishes a derived event for the same key.
    pub fn publish(mut self, event: M::Event) -> Self {
        self.effects.push(Effect::Publish(event));
        self
    }

    /// Replies to the caller with a snapshot.
    pub fn reply(mut self) -> Self {
        self.reply = true;
        self
    }

    /// Sets the log note.
    pub fn note(mut self, note: &'static str) -> Self {
        self.note = note;
        self
    }

    fn matches(&self, instance: &InstanceOf<M>, event: &M::Event) -> bool {
        self.on == event.event_type()
            && self
                .guard
                .as_ref()
                .is_none_or(|guard| guard(&instance.data))
    }

    fn fire(&self, instance: &InstanceOf<M>) -> Transition<M> {
        let mut data = instance.data.clone();
        if let Some(action) = &self.action {
            action(&mut data);
        }

        let state = match &self.target {
            Target::Stay => instance.state,
            Target::To(state) => *state,
            Target::Computed(select) => select(&data),
        };

        Transition {
            state,
            data,
            effects: self.effects.clone(),
            reply: self.reply,
            note: self.note,
        }
    }
}

impl<M: StateMachine> fmt::Debug for Rule<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("from", &self.from)
            .field("on", &self.on)
            .field("guarded", &self.guard.is_some())
            .field("effects", &self.effects)
            .field("reply", &self.reply)
            .field("note", &self.note)
            .finish()
    }
}

/// An ordered set of rules, evaluated as an interpreter.
pub struct TransitionTable<M: StateMachine> {
    rules: Vec<Rule<M>>,
}

impl<M: StateMachine> Default for TransitionTable<M> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<M: StateMachine> TransitionTable<M> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule.
    pub fn rule(mut self, rule: Rule<M>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Returns the number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the table has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluates the table for an instance and event.
    pub fn evaluate(&self, instance: &InstanceOf<M>, event: &M::Event) -> Decision<M> {
        let specific = self
            .rules
            .iter()
            .filter(|rule| rule.from == StateFilter::In(instance.state));
        let fallback = self
            .rules
            .iter()
            .filter(|rule| rule.from == StateFilter::Any);

        specific
            .chain(fallback)
            .find(|rule| rule.matches(instance, event))
            .map_or(Decision::Unhandled, |rule| Decision::Apply(rule.fire(instance)))
    }
}

impl<M: StateMachine> fmt::Debug for TransitionTable<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.rules).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use crate::machine::EventKind;
    use common::CorrelationId;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    enum Light {
        Off,
        On,
        Broken,
    }

    impl std::fmt::Display for Light {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Press {
        Flip,
        Smash,
        Look,
    }

    impl MachineEvent for Press {
        fn event_type(&self) -> &'static str {
            match self {
                Press::Flip => "Flip",
                Press::Smash => "Smash",
                Press::Look => "Look",
            }
        }

        fn kind(&self) -> EventKind {
            match self {
                Press::Look => EventKind::ReadOnly,
                _ => EventKind::Creating,
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Flips {
        count: u32,
    }

    struct Switch {
        table: TransitionTable<Switch>,
    }

    impl Switch {
        fn new() -> Self {
            let table = TransitionTable::new()
                .rule(
                    Rule::on(StateFilter::In(Light::Off), &Press::Flip)
                        .when(|d: &Flips| d.count < 3)
                        .then(|d: &mut Flips| d.count += 1)
                        .to(Light::On)
                        .reply()
                        .note("on"),
                )
                .rule(
                    Rule::on(StateFilter::In(Light::On), &Press::Flip)
                        .to_computed(|d: &Flips| {
                            if d.count >= 2 { Light::Broken } else { Light::Off }
                        })
                        .publish(Press::Look),
                )
                .rule(
                    Rule::on(StateFilter::In(Light::On), &Press::Look)
                        .reply()
                        .note("specific"),
                )
                .rule(Rule::on(StateFilter::Any, &Press::Look).reply().note("fallback"))
                .rule(
                    Rule::on(StateFilter::Any, &Press::Smash)
                        .to(Light::Broken)
                        .unschedule("bulb"),
                );
            Self { table }
        }
    }

    impl StateMachine for Switch {
        type State = Light;
        type Data = Flips;
        type Event = Press;
        type Snapshot = Light;

        fn saga_type() -> &'static str {
            "Switch"
        }

        fn initial_state() -> Light {
            Light::Off
        }

        fn is_terminal(state: &Light) -> bool {
            *state == Light::Broken
        }

        fn decide(&self, instance: &InstanceOf<Self>, event: &Press) -> Decision<Self> {
            self.table.evaluate(instance, event)
        }

        fn snapshot(instance: &InstanceOf<Self>) -> Light {
            instance.state
        }
    }

    fn instance(state: Light, count: u32) -> InstanceOf<Switch> {
        let mut instance = Instance::new(CorrelationId::new(), state);
        instance.data = Flips { count };
        instance
    }

    #[test]
    fn test_action_runs_before_target() {
        let switch = Switch::new();
        let transition = switch
            .decide(&instance(Light::Off, 0), &Press::Flip)
            .transition()
            .unwrap();

        assert_eq!(transition.state, Light::On);
        assert_eq!(transition.data.count, 1);
        assert!(transition.reply);
        assert_eq!(transition.note, "on");
    }

    #[test]
    fn test_failing_guard_leaves_event_unhandled() {
        let switch = Switch::new();
        assert!(switch.decide(&instance(Light::Off, 3), &Press::Flip).is_unhandled());
    }

    #[test]
    fn test_computed_target() {
        let switch = Switch::new();

        let low = switch.decide(&instance(Light::On, 1), &Press::Flip);
        assert_eq!(low.transition().unwrap().state, Light::Off);

        let high = switch
            .decide(&instance(Light::On, 2), &Press::Flip)
            .transition()
            .unwrap();
        assert_eq!(high.state, Light::Broken);
        assert_eq!(high.effects, vec![Effect::Publish(Press::Look)]);
    }

    #[test]
    fn test_specific_rule_wins_over_any() {
        let switch = Switch::new();

        let on = switch.decide(&instance(Light::On, 0), &Press::Look);
        assert_eq!(on.transition().unwrap().note, "specific");

        let off = switch.decide(&instance(Light::Off, 0), &Press::Look);
        assert_eq!(off.transition().unwrap().note, "fallback");
    }

    #[test]
    fn test_stay_keeps_state_and_data() {
        let switch = Switch::new();
        let current = instance(Light::Off, 2);
        let transition = switch.decide(&current, &Press::Look).transition().unwrap();

        assert_eq!(transition.state, current.state);
        assert_eq!(transition.data, current.data);
        assert!(transition.effects.is_empty());
    }

    #[test]
    fn test_any_rule_with_effects() {
        let switch = Switch::new();
        let transition = switch
            .decide(&instance(Light::On, 0), &Press::Smash)
            .transition()
            .unwrap();

        assert_eq!(transition.state, Light::Broken);
        assert_eq!(transition.effects, vec![Effect::Unschedule { slot: "bulb" }]);
        assert!(!transition.reply);
    }

    #[test]
    fn test_table_len() {
        assert_eq!(Switch::new().table.len(), 5);
        assert!(TransitionTable::<Switch>::new().is_empty());
    }
}
