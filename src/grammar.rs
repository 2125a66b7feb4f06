use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::error::Error;
use crate::parser;
use crate::production::{Production, Reducer};
use crate::state::{StateId, StateTable};
use crate::symbol::{
    Associativity, NonTerminal, Precedence, Symbol, SymbolTable, Terminal, TerminalOptions,
};
use crate::token::TokenValue;

/// The declarative accumulation of a grammar: interned symbols, productions
/// and the conflict-resolution policy. `compile` turns it into an
/// `Automaton`.
pub struct Grammar<A, C> {
    symbols: SymbolTable,
    productions: Vec<Production<A, C>>,
    auto_shift: bool,
}

impl<A, C> Default for Grammar<A, C> {
    fn default() -> Self {
        Grammar::new()
    }
}

impl<A, C> Grammar<A, C> {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            productions: vec![],
            auto_shift: true,
        }
    }

    /// Equal-precedence, equal-associativity ties between shifting and
    /// reducing become hard conflicts instead of defaulting to shift.
    pub fn without_auto_shift() -> Self {
        let mut grammar = Grammar::new();
        grammar.auto_shift = false;
        grammar
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn terminal(&mut self, name: &str, options: TerminalOptions) -> Result<Terminal, Error> {
        self.symbols.declare_terminal(name, options)
    }

    pub fn symbol(&mut self, name: &str) -> NonTerminal {
        self.symbols.declare_symbol(name, None)
    }

    pub fn symbol_named(&mut self, name: &str, show_name: &str) -> NonTerminal {
        self.symbols.declare_symbol(name, Some(show_name))
    }

    pub fn left(&mut self) {
        self.symbols.left()
    }

    pub fn right(&mut self) {
        self.symbols.right()
    }

    pub fn nonassoc(&mut self) {
        self.symbols.nonassoc()
    }

    pub fn increase(&mut self) {
        self.symbols.increase()
    }

    /// Append a production for `left_hand_side`. The effective precedence is
    /// the override if given, else derived from the right-hand side.
    pub fn rule(
        &mut self,
        left_hand_side: &NonTerminal,
        right_hand_side: &[Symbol],
        reducer: Option<Reducer<A, C>>,
        precedence: Option<Precedence>,
    ) {
        let ident = self.productions.len() as u32;
        self.productions.push(Production::new(
            ident,
            left_hand_side.clone(),
            right_hand_side.to_vec(),
            reducer,
            precedence,
        ));
    }

    /// Compile the grammar into an automaton accepting exactly `start`
    /// followed by end-of-file.
    pub fn compile(mut self, start: &str) -> Result<Automaton<A, C>, Error> {
        let start_symbol = match self.symbols.non_terminal(start) {
            Some(non_terminal) => non_terminal.clone(),
            None => return Err(Error::MissingStart(start.to_string())),
        };
        let eof = match self.symbols.eof_terminal() {
            Some(terminal) => terminal.clone(),
            None => Terminal::end_of_input(),
        };
        let wrapper = NonTerminal::new("__START__", None);
        let wrapper_rule = vec![Symbol::from(&start_symbol), Symbol::from(&eof)];
        let ident = self.productions.len() as u32;
        self.productions.push(Production::new(
            ident,
            wrapper.clone(),
            wrapper_rule,
            Some(Reducer::stateless(|mut values: Vec<A>| {
                values.swap_remove(0)
            })),
            None,
        ));

        let mut builder = TreeBuilder {
            productions: &self.productions,
            auto_shift: self.auto_shift,
            states: StateTable::default(),
            roots: HashMap::new(),
            pending: HashMap::new(),
            merged: HashSet::new(),
        };
        let start_state = builder.build_tree(&wrapper)?;
        builder.merge_tree(start_state)?;
        debug!(
            "grammar compiled: {} states over {} productions",
            builder.states.len(),
            self.productions.len()
        );
        let states = builder.states;
        Ok(Automaton {
            states,
            start: start_state,
            productions: self.productions,
            wrapper,
            eof,
        })
    }
}

/// Expands each non-terminal into a tree of states walking its productions,
/// then splices the per-symbol trees into one automaton.
struct TreeBuilder<'a, A, C> {
    productions: &'a [Production<A, C>],
    auto_shift: bool,
    states: StateTable,
    roots: HashMap<NonTerminal, StateId>,
    pending: HashMap<NonTerminal, Vec<usize>>,
    merged: HashSet<StateId>,
}

impl<'a, A, C> TreeBuilder<'a, A, C> {
    /// Memoised per-symbol tree generation. The pending list is drained from
    /// the back, so rules walk in reverse declaration order; a recursive
    /// call for the same symbol drains whatever the outer call has not.
    fn build_tree(&mut self, non_terminal: &NonTerminal) -> Result<StateId, Error> {
        let root = match self.roots.get(non_terminal) {
            Some(&root) => root,
            None => {
                let root = self.states.alloc(None, 0);
                self.roots.insert(non_terminal.clone(), root);
                root
            }
        };
        if !self.pending.contains_key(non_terminal) {
            let rules: Vec<usize> = self
                .productions
                .iter()
                .filter(|production| production.left_hand_side() == non_terminal)
                .map(|production| production.ident() as usize)
                .collect();
            if rules.is_empty() {
                warn!("non-terminal \"{}\" has no rules", non_terminal.name());
            }
            self.pending.insert(non_terminal.clone(), rules);
        }
        while let Some(rule) = self
            .pending
            .get_mut(non_terminal)
            .and_then(|rules| rules.pop())
        {
            self.walk_rule(root, rule)?;
        }
        Ok(root)
    }

    /// Walk a dot through the symbol's tree creating or following branch
    /// states, then attach the reduce action at the rule's end.
    fn walk_rule(&mut self, root: StateId, rule: usize) -> Result<(), Error> {
        let components = self.productions[rule].right_hand_side().to_vec();
        let mut current = root;
        for (index, component) in components.iter().enumerate() {
            let existing = self.states.state(current).branches.get(component).copied();
            let next = match existing {
                Some(next) => {
                    // A higher-precedence production claims the shared prefix.
                    if self.productions[rule].precedence().level
                        > self.bind_precedence(next).level
                    {
                        let state = self.states.state_mut(next);
                        state.bind_rule = Some(rule);
                        state.bind_index = index + 1;
                    }
                    next
                }
                None => {
                    let fresh = self.states.alloc(Some(rule), index + 1);
                    self.states
                        .state_mut(current)
                        .branches
                        .insert(component.clone(), fresh);
                    fresh
                }
            };
            if let Symbol::NonTerminal(lhs) = component {
                self.build_tree(lhs)?;
            }
            current = next;
        }
        match self.states.state(current).reduce_rule {
            None => self.states.state_mut(current).reduce_rule = Some(rule),
            Some(existing) if existing != rule => {
                if self.should_override(existing, rule)? {
                    self.states.state_mut(current).reduce_rule = Some(rule);
                }
            }
            _ => (),
        }
        Ok(())
    }

    /// Splice the trees of all non-terminal branch labels into `state`, then
    /// recurse into its children. Idempotent under reachability.
    fn merge_tree(&mut self, state: StateId) -> Result<(), Error> {
        if !self.merged.insert(state) {
            return Ok(());
        }
        let snapshot: Vec<Symbol> = self
            .states
            .state(state)
            .branches
            .keys()
            .cloned()
            .collect();
        self.states.state_mut(state).immediate_tokens = snapshot;
        // Splicing may append further non-terminal branches; they are
        // spliced too, so the cursor is index-driven.
        let mut index = 0;
        while let Some((symbol, _)) = self.states.branch_at(state, index) {
            index += 1;
            if let Symbol::NonTerminal(non_terminal) = symbol {
                if let Some(&root) = self.roots.get(&non_terminal) {
                    self.merge_state(state, root)?;
                }
            }
        }
        let mut index = 0;
        while let Some((_, child)) = self.states.branch_at(state, index) {
            index += 1;
            self.merge_tree(child)?;
        }
        Ok(())
    }

    /// Copy edges and reduce behaviour from `src` into `dest`, resolving
    /// collisions by precedence.
    fn merge_state(&mut self, dest: StateId, src: StateId) -> Result<(), Error> {
        if dest == src {
            return Ok(());
        }
        if let Some(src_rule) = self.states.state(src).reduce_rule {
            match self.states.state(dest).reduce_rule {
                None => self.states.state_mut(dest).reduce_rule = Some(src_rule),
                Some(dest_rule) if dest_rule != src_rule => {
                    if self.should_override(dest_rule, src_rule)? {
                        self.states.state_mut(dest).reduce_rule = Some(src_rule);
                    }
                }
                _ => (),
            }
        }
        let mut index = 0;
        while let Some((symbol, src_target)) = self.states.branch_at(src, index) {
            index += 1;
            match self.states.state(dest).branches.get(&symbol).copied() {
                Some(dest_target) => {
                    if self.states.state(dest_target).reduce_rule.is_some() {
                        // A state rebound to a higher precedence does not
                        // absorb a lower-precedence one.
                        let dest_bind = self.states.state(dest_target).bind_rule;
                        if self.should_reduce(dest_bind, src_target)? {
                            continue;
                        }
                    }
                    self.merge_state(dest_target, src_target)?;
                }
                None => {
                    if let Some(dest_rule) = self.states.state(dest).reduce_rule {
                        if self.should_reduce(Some(dest_rule), src_target)? {
                            // The reduction wins; do not extend the state
                            // with a lower-precedence chain.
                            continue;
                        }
                    }
                    self.states
                        .state_mut(dest)
                        .branches
                        .insert(symbol, src_target);
                }
            }
        }
        Ok(())
    }

    fn rule_precedence(&self, rule: Option<usize>) -> Precedence {
        rule.map(|rule| self.productions[rule].precedence())
            .unwrap_or_default()
    }

    fn bind_precedence(&self, state: StateId) -> Precedence {
        self.rule_precedence(self.states.state(state).bind_rule)
    }

    fn describe_rule(&self, rule: Option<usize>) -> String {
        match rule {
            Some(rule) => self.productions[rule].to_string(),
            None => "<root>".to_string(),
        }
    }

    /// The shift side of a conflict, rendered as its bind rule with the dot
    /// at the state's position.
    fn describe_state(&self, state: StateId) -> String {
        match self.states.state(state).bind_rule {
            Some(rule) => {
                self.productions[rule].display_with_dot(self.states.state(state).bind_index)
            }
            None => "<root>".to_string(),
        }
    }

    /// Decide shift-vs-reduce by precedence; equal levels fall back to the
    /// level's associativity and then the auto-shift policy.
    fn should_reduce(
        &self,
        reduce_rule: Option<usize>,
        shift_state: StateId,
    ) -> Result<bool, Error> {
        let reduce = self.rule_precedence(reduce_rule);
        let shift = self.bind_precedence(shift_state);
        if reduce.level > shift.level {
            return Ok(true);
        }
        if reduce.level < shift.level {
            return Ok(false);
        }
        if reduce.associativity != shift.associativity {
            return Err(Error::ShiftReduceConflict(
                self.describe_rule(reduce_rule),
                self.describe_state(shift_state),
            ));
        }
        match reduce.associativity {
            Associativity::Left => Ok(true),
            Associativity::Right => Ok(false),
            _ if self.auto_shift => Ok(false),
            _ => Err(Error::ShiftReduceConflict(
                self.describe_rule(reduce_rule),
                self.describe_state(shift_state),
            )),
        }
    }

    /// Decide reduce-vs-reduce: the candidate replaces the incumbent only on
    /// strictly greater level; a tie is a hard conflict.
    fn should_override(&self, incumbent: usize, candidate: usize) -> Result<bool, Error> {
        let to = self.productions[incumbent].precedence();
        let from = self.productions[candidate].precedence();
        if from.level > to.level {
            return Ok(true);
        }
        if from.level < to.level {
            return Ok(false);
        }
        Err(Error::ReduceReduceConflict(
            self.describe_rule(Some(incumbent)),
            self.describe_rule(Some(candidate)),
        ))
    }
}

/// A compiled grammar: the state graph plus everything the driver needs.
/// Immutable after compilation and shareable among parse sessions.
pub struct Automaton<A, C> {
    states: StateTable,
    start: StateId,
    productions: Vec<Production<A, C>>,
    wrapper: NonTerminal,
    eof: Terminal,
}

impl<A: Default, C> Automaton<A, C> {
    /// Drive the automaton over a token stream, applying reducers against
    /// `context`, and return the start symbol's semantic value.
    pub fn parse<I>(&self, tokens: I, context: &mut C) -> Result<A, Error>
    where
        I: IntoIterator<Item = Result<TokenValue<A>, Error>>,
    {
        parser::run(self, tokens.into_iter(), context)
    }
}

impl<A, C> Automaton<A, C> {
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn start(&self) -> StateId {
        self.start
    }

    pub(crate) fn state(&self, ident: StateId) -> &crate::state::State {
        self.states.state(ident)
    }

    pub(crate) fn production(&self, rule: usize) -> &Production<A, C> {
        &self.productions[rule]
    }

    pub(crate) fn wrapper(&self) -> &NonTerminal {
        &self.wrapper
    }

    pub(crate) fn eof(&self) -> &Terminal {
        &self.eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(grammar: &mut Grammar<(), ()>, name: &str, pattern: &str) -> Terminal {
        grammar
            .terminal(name, TerminalOptions::matching(pattern))
            .unwrap()
    }

    #[test]
    fn reduce_reduce_conflict_is_detected() {
        let mut grammar = Grammar::<(), ()>::new();
        let a = terminal(&mut grammar, "A", "a");
        let b = terminal(&mut grammar, "B", "b");
        let list = grammar.symbol("LIST");
        let expr = grammar.symbol("EXPR");
        grammar.rule(&list, &[Symbol::from(&a), Symbol::from(&b)], None, None);
        grammar.rule(&expr, &[Symbol::from(&list)], None, None);
        grammar.rule(&expr, &[Symbol::from(&a), Symbol::from(&b)], None, None);
        let result = grammar.compile("EXPR");
        assert!(matches!(result, Err(Error::ReduceReduceConflict(_, _))));
    }

    #[test]
    fn shift_reduce_conflict_without_auto_shift() {
        let mut grammar = Grammar::<(), ()>::without_auto_shift();
        let a = terminal(&mut grammar, "A", "a");
        let b = terminal(&mut grammar, "B", "b");
        let list = grammar.symbol("LIST");
        let expr = grammar.symbol("EXPR");
        grammar.rule(&list, &[Symbol::from(&a), Symbol::from(&b)], None, None);
        grammar.rule(&expr, &[Symbol::from(&list)], None, None);
        grammar.rule(&expr, &[Symbol::from(&a)], None, None);
        let result = grammar.compile("EXPR");
        assert!(matches!(result, Err(Error::ShiftReduceConflict(_, _))));
    }

    #[test]
    fn auto_shift_resolves_the_same_grammar() {
        let mut grammar = Grammar::<(), ()>::new();
        let a = terminal(&mut grammar, "A", "a");
        let b = terminal(&mut grammar, "B", "b");
        let list = grammar.symbol("LIST");
        let expr = grammar.symbol("EXPR");
        grammar.rule(&list, &[Symbol::from(&a), Symbol::from(&b)], None, None);
        grammar.rule(&expr, &[Symbol::from(&list)], None, None);
        grammar.rule(&expr, &[Symbol::from(&a)], None, None);
        assert!(grammar.compile("EXPR").is_ok());
    }

    #[test]
    fn missing_start_symbol() {
        let grammar = Grammar::<(), ()>::new();
        let result = grammar.compile("NOWHERE");
        assert!(matches!(result, Err(Error::MissingStart(name)) if name == "NOWHERE"));
    }

    #[test]
    fn terminal_start_symbol_is_missing_start() {
        let mut grammar = Grammar::<(), ()>::new();
        terminal(&mut grammar, "A", "a");
        let result = grammar.compile("A");
        assert!(matches!(result, Err(Error::MissingStart(name)) if name == "A"));
    }

    #[test]
    fn merge_prefers_the_higher_precedence_reduction() {
        let mut grammar = Grammar::<String, ()>::new();
        let a = grammar
            .terminal("A", TerminalOptions::matching("a"))
            .unwrap();
        let b = grammar
            .terminal("B", TerminalOptions::matching("b"))
            .unwrap();
        let list = grammar.symbol("LIST");
        let expr = grammar.symbol("EXPR");
        grammar.rule(
            &list,
            &[Symbol::from(&a), Symbol::from(&b)],
            Some(Reducer::stateless(|_| "list".to_string())),
            Some(Precedence::new(2, Associativity::Shift)),
        );
        grammar.rule(
            &expr,
            &[Symbol::from(&list)],
            Some(Reducer::stateless(|mut values: Vec<String>| {
                values.swap_remove(0)
            })),
            None,
        );
        grammar.rule(
            &expr,
            &[Symbol::from(&a), Symbol::from(&b)],
            Some(Reducer::stateless(|_| "expr".to_string())),
            None,
        );
        let automaton = grammar.compile("EXPR").unwrap();
        let tokens = vec![
            Ok(TokenValue::new(Symbol::from(&a), String::new(), None)),
            Ok(TokenValue::new(Symbol::from(&b), String::new(), None)),
        ];
        assert_eq!(automaton.parse(tokens, &mut ()).unwrap(), "list");
    }

    #[test]
    fn rebinding_claims_shared_prefixes() {
        // X -> A C carries level 2 and is declared before X -> A B, which is
        // walked first; the later walk must rebind the shared A state so the
        // level-1 empty reduction does not shadow the A edge during merge.
        let mut grammar = Grammar::<(), ()>::new();
        let a = grammar
            .terminal("A", TerminalOptions::matching("a"))
            .unwrap();
        let b = grammar
            .terminal("B", TerminalOptions::matching("b"))
            .unwrap();
        let c = grammar
            .terminal("C", TerminalOptions::matching("c"))
            .unwrap();
        let x = grammar.symbol("X");
        grammar.rule(
            &x,
            &[],
            None,
            Some(Precedence::new(1, Associativity::Left)),
        );
        grammar.rule(
            &x,
            &[Symbol::from(&a), Symbol::from(&c)],
            None,
            Some(Precedence::new(2, Associativity::Left)),
        );
        grammar.rule(&x, &[Symbol::from(&a), Symbol::from(&b)], None, None);
        let automaton = grammar.compile("X").unwrap();
        let ab = vec![
            Ok(TokenValue::new(Symbol::from(&a), (), None)),
            Ok(TokenValue::new(Symbol::from(&b), (), None)),
        ];
        assert!(automaton.parse(ab, &mut ()).is_ok());
        let empty: Vec<Result<TokenValue<()>, Error>> = vec![];
        assert!(automaton.parse(empty, &mut ()).is_ok());
    }

    #[test]
    fn compilation_is_deterministic() {
        let build = || {
            let mut grammar = Grammar::<(), ()>::new();
            let a = terminal(&mut grammar, "A", "a");
            let b = terminal(&mut grammar, "B", "b");
            let list = grammar.symbol("LIST");
            let expr = grammar.symbol("EXPR");
            grammar.rule(&list, &[Symbol::from(&a), Symbol::from(&b)], None, None);
            grammar.rule(&expr, &[Symbol::from(&list)], None, None);
            grammar.rule(&expr, &[Symbol::from(&a)], None, None);
            grammar.compile("EXPR").unwrap()
        };
        assert_eq!(build().state_count(), build().state_count());
    }
}
