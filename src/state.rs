use indexmap::IndexMap;

use crate::symbol::Symbol;

/// A stable index into the state arena. The automaton is a cyclic digraph,
/// so states refer to one another by index rather than by owning pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StateId(pub(crate) usize);

/// A node in the automaton.
#[derive(Debug, Default)]
pub(crate) struct State {
    /// Outgoing edges in insertion order; tie-breaking depends on it.
    pub(crate) branches: IndexMap<Symbol, StateId>,
    /// The rule to reduce by when no branch matches the lookahead.
    pub(crate) reduce_rule: Option<usize>,
    /// The rule whose walk first created this state; None only for the
    /// per-symbol roots. Used solely for conflict arbitration during merge.
    pub(crate) bind_rule: Option<usize>,
    /// The dot position within the bind rule.
    pub(crate) bind_index: usize,
    /// Branch labels snapshotted just before merge, for diagnostics.
    pub(crate) immediate_tokens: Vec<Symbol>,
}

#[derive(Debug, Default)]
pub(crate) struct StateTable {
    states: Vec<State>,
}

impl StateTable {
    pub(crate) fn alloc(&mut self, bind_rule: Option<usize>, bind_index: usize) -> StateId {
        let ident = StateId(self.states.len());
        self.states.push(State {
            bind_rule,
            bind_index,
            ..State::default()
        });
        ident
    }

    pub(crate) fn state(&self, ident: StateId) -> &State {
        &self.states[ident.0]
    }

    pub(crate) fn state_mut(&mut self, ident: StateId) -> &mut State {
        &mut self.states[ident.0]
    }

    /// Index-driven branch access: iteration that keeps observing branches
    /// appended behind the cursor, which plain iterators cannot.
    pub(crate) fn branch_at(&self, ident: StateId, index: usize) -> Option<(Symbol, StateId)> {
        self.states[ident.0]
            .branches
            .get_index(index)
            .map(|(symbol, target)| (symbol.clone(), *target))
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }
}
