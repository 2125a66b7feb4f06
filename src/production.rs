use std::fmt;

use log::debug;

use crate::symbol::{NonTerminal, Precedence, Symbol};

/// A semantic action applied at reduce time. Whether the user context is
/// forwarded is decided here, at registration, not on every call.
pub struct Reducer<A, C>(Box<dyn Fn(&mut C, Vec<A>) -> A + Send + Sync>);

impl<A, C> Reducer<A, C> {
    /// A reducer that receives the user context ahead of the values.
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(&mut C, Vec<A>) -> A + Send + Sync + 'static,
    {
        Reducer(Box::new(action))
    }

    /// A reducer that ignores the user context.
    pub fn stateless<F>(action: F) -> Self
    where
        F: Fn(Vec<A>) -> A + Send + Sync + 'static,
    {
        Reducer(Box::new(move |_, values| action(values)))
    }

    pub(crate) fn apply(&self, context: &mut C, values: Vec<A>) -> A {
        (self.0)(context, values)
    }
}

impl<A, C> fmt::Debug for Reducer<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Reducer(..)")
    }
}

/// A single production: left-hand non-terminal, ordered components, the
/// effective precedence and an optional reducer.
pub struct Production<A, C> {
    ident: u32,
    left_hand_side: NonTerminal,
    right_hand_side: Vec<Symbol>,
    precedence: Precedence,
    reducer: Option<Reducer<A, C>>,
}

impl<A, C> Production<A, C> {
    pub(crate) fn new(
        ident: u32,
        left_hand_side: NonTerminal,
        right_hand_side: Vec<Symbol>,
        reducer: Option<Reducer<A, C>>,
        precedence_override: Option<Precedence>,
    ) -> Self {
        let precedence = effective_precedence(&right_hand_side, precedence_override);
        Self {
            ident,
            left_hand_side,
            right_hand_side,
            precedence,
            reducer,
        }
    }

    pub fn ident(&self) -> u32 {
        self.ident
    }

    pub fn len(&self) -> usize {
        self.right_hand_side.len()
    }

    pub fn is_empty(&self) -> bool {
        self.right_hand_side.is_empty()
    }

    pub fn left_hand_side(&self) -> &NonTerminal {
        &self.left_hand_side
    }

    pub fn right_hand_side(&self) -> &[Symbol] {
        &self.right_hand_side
    }

    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    /// The production with a walking dot at `dot`, for conflict diagnostics.
    pub(crate) fn display_with_dot(&self, dot: usize) -> String {
        let mut string = format!("{}:", self.left_hand_side.name());
        if self.right_hand_side.is_empty() {
            string += " . <empty>";
        } else {
            for (index, symbol) in self.right_hand_side.iter().enumerate() {
                if index == dot {
                    string += &format!(" . {}", symbol);
                } else {
                    string += &format!(" {}", symbol);
                }
            }
            if dot >= self.right_hand_side.len() {
                string += " .";
            }
        }
        string
    }
}

impl<A: Default, C> Production<A, C> {
    /// Run the reducer over the popped values; a rule without one yields the
    /// default value.
    pub(crate) fn reduce(&self, context: &mut C, values: Vec<A>) -> A {
        match &self.reducer {
            Some(reducer) => reducer.apply(context, values),
            None => A::default(),
        }
    }
}

impl<A, C> fmt::Display for Production<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut string = format!("{}:", self.left_hand_side.name());
        if self.is_empty() {
            string += " <empty>";
        } else {
            for symbol in self.right_hand_side.iter() {
                string += &format!(" {}", symbol);
            }
        };
        write!(f, "{}", string)
    }
}

/// The explicit override if supplied, else the precedence of the rightmost
/// terminal with a non-zero level, else level 0.
fn effective_precedence(
    right_hand_side: &[Symbol],
    precedence_override: Option<Precedence>,
) -> Precedence {
    if let Some(precedence) = precedence_override {
        return precedence;
    }
    let mut chosen = Precedence::default();
    let mut highest_level = 0;
    for symbol in right_hand_side.iter() {
        if let Symbol::Terminal(terminal) = symbol {
            let precedence = terminal.precedence();
            highest_level = highest_level.max(precedence.level);
            if precedence.level > 0 {
                chosen = precedence;
            }
        }
    }
    if chosen.level < highest_level {
        debug!("rule binds below its highest terminal precedence");
    }
    chosen
}
