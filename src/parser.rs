use log::debug;

use crate::error::Error;
use crate::grammar::Automaton;
use crate::state::StateId;
use crate::symbol::{NonTerminal, Symbol, Terminal};
use crate::token::{Location, TokenValue};

/// One token of lookahead over the scanner's stream plus the value stack.
/// When the input runs out it synthesises end-of-file tokens indefinitely,
/// which is what lets the eof terminal appear as a rule component.
struct TokenReader<A, I> {
    tokens: I,
    eof: Terminal,
    next_token: Option<TokenValue<A>>,
    stack: Vec<TokenValue<A>>,
    exhausted: bool,
    last_location: Location,
}

impl<A, I> TokenReader<A, I>
where
    A: Default,
    I: Iterator<Item = Result<TokenValue<A>, Error>>,
{
    fn new(tokens: I, eof: Terminal) -> Self {
        Self {
            tokens,
            eof,
            next_token: None,
            stack: vec![],
            exhausted: false,
            last_location: Location::default(),
        }
    }

    fn pull(&mut self) -> Result<TokenValue<A>, Error> {
        if self.exhausted {
            return Ok(self.end_token());
        }
        match self.tokens.next() {
            Some(Ok(token)) => {
                if let Some(location) = &token.location {
                    self.last_location = location.clone();
                }
                Ok(token)
            }
            Some(Err(error)) => Err(error),
            None => {
                self.exhausted = true;
                Ok(self.end_token())
            }
        }
    }

    fn end_token(&self) -> TokenValue<A> {
        TokenValue::new(
            Symbol::from(&self.eof),
            A::default(),
            Some(self.last_location.clone()),
        )
    }

    fn peek_symbol(&mut self) -> Result<Symbol, Error> {
        if let Some(token) = &self.next_token {
            return Ok(token.symbol.clone());
        }
        let token = self.pull()?;
        let symbol = token.symbol.clone();
        self.next_token = Some(token);
        Ok(symbol)
    }

    /// Consume the lookahead onto the value stack.
    fn read(&mut self) -> Result<(), Error> {
        let token = match self.next_token.take() {
            Some(token) => token,
            None => self.pull()?,
        };
        self.stack.push(token);
        Ok(())
    }

    /// Drop the lookahead (ignorable terminal dispatch).
    fn discard(&mut self) {
        self.next_token = None;
    }

    /// Pop the top `n` values in left-to-right order.
    fn consume(&mut self, n: usize) -> Vec<TokenValue<A>> {
        let len = self.stack.len();
        self.stack.split_off(len - n)
    }

    /// Push a reduced token and make it the lookahead's symbol.
    fn commit(&mut self, token: TokenValue<A>) -> Symbol {
        let symbol = token.symbol.clone();
        self.stack.push(token);
        symbol
    }

    fn done(&self, wrapper: &NonTerminal) -> bool {
        if self.stack.len() != 1 {
            return false;
        }
        matches!(&self.stack[0].symbol, Symbol::NonTerminal(lhs) if lhs == wrapper)
    }

    fn pop(&mut self) -> Option<TokenValue<A>> {
        self.stack.pop()
    }

    fn location_hint(&self) -> Location {
        match &self.next_token {
            Some(token) => token
                .location
                .clone()
                .unwrap_or_else(|| self.last_location.clone()),
            None => self.last_location.clone(),
        }
    }
}

/// The LR-style loop: shift on a branch hit, reduce when the state says so,
/// skip ignorable terminals that block progress, otherwise report a syntax
/// error from the state's snapshotted expectations.
pub(crate) fn run<A, C, I>(
    automaton: &Automaton<A, C>,
    tokens: I,
    context: &mut C,
) -> Result<A, Error>
where
    A: Default,
    I: Iterator<Item = Result<TokenValue<A>, Error>>,
{
    let mut reader = TokenReader::new(tokens, automaton.eof().clone());
    let mut state_stack: Vec<StateId> = vec![automaton.start()];
    let mut lookahead = reader.peek_symbol()?;
    while !reader.done(automaton.wrapper()) {
        let current = *state_stack.last().expect("state stack underflow");
        if let Some(&next_state) = automaton.state(current).branches.get(&lookahead) {
            if lookahead.is_terminal() {
                reader.read()?;
            }
            state_stack.push(next_state);
            lookahead = reader.peek_symbol()?;
            continue;
        }
        if let Some(rule) = automaton.state(current).reduce_rule {
            let production = automaton.production(rule);
            let count = production.len();
            let values = reader
                .consume(count)
                .into_iter()
                .map(|token| token.value)
                .collect();
            let value = production.reduce(context, values);
            debug!("reduce by {}", production);
            let lhs = production.left_hand_side().clone();
            state_stack.truncate(state_stack.len() - count);
            lookahead = reader.commit(TokenValue::new(Symbol::from(&lhs), value, None));
            continue;
        }
        if let Symbol::Terminal(terminal) = &lookahead {
            if terminal.is_ignorable() {
                reader.discard();
                lookahead = reader.peek_symbol()?;
                continue;
            }
        }
        return Err(Error::SyntaxError {
            location: reader.location_hint(),
            observed: lookahead.to_string(),
            expected: automaton
                .state(current)
                .immediate_tokens
                .iter()
                .map(|symbol| symbol.to_string())
                .collect(),
        });
    }
    let token = reader
        .pop()
        .expect("parse ended with the start wrapper on the stack");
    Ok(token.value)
}
