use std::collections::HashMap;

use regex::Regex;

use crate::error::Error;
use crate::symbol::{Symbol, Terminal};
use crate::token::{Location, TokenValue};

/// A scan action: inspects the match through the context object and yields
/// the token's semantic value, or `None` to consume silently.
pub type ScanAction<A> =
    Box<dyn for<'a> Fn(&'a mut ScanCtx<A>) -> Result<Option<A>, Error> + Send + Sync>;

enum ScanOp<A> {
    Enter(String, Option<A>),
    Leave,
}

/// The interface scan actions see: the matched text, the location, the
/// current context's opaque user value, and the context-stack operations.
pub struct ScanCtx<A> {
    text: String,
    location: Location,
    value: Option<A>,
    ops: Vec<ScanOp<A>>,
}

impl<A> ScanCtx<A> {
    fn new(text: String, location: Location, value: Option<A>) -> Self {
        Self {
            text,
            location,
            value,
            ops: vec![],
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn value(&self) -> Option<&A> {
        self.value.as_ref()
    }

    pub fn value_mut(&mut self) -> &mut Option<A> {
        &mut self.value
    }

    /// Advance the column by `n` characters.
    pub fn step(&mut self, n: usize) {
        self.location.step(n)
    }

    /// Advance the column over the whole matched text.
    pub fn step_over(&mut self) {
        let n = self.text.chars().count();
        self.location.step(n)
    }

    /// Advance over `n` line breaks, resetting the column.
    pub fn lines(&mut self, n: usize) {
        self.location.lines(n)
    }

    /// Push a start condition carrying an opaque user value.
    pub fn enter(&mut self, name: &str, value: Option<A>) {
        self.ops.push(ScanOp::Enter(name.to_string(), value));
    }

    /// Pop the current start condition once this action returns. Leaving
    /// the initial context is an error.
    pub fn leave(&mut self) {
        self.ops.push(ScanOp::Leave);
    }
}

/// A compiled start condition: one anchored alternation over its terminals'
/// patterns, in declaration order, plus the terminals it remembers apart.
struct Condition {
    regex: Option<Regex>,
    /// Group name to terminal, parallel to the alternation's order.
    groups: Vec<(String, Terminal)>,
    eof: Option<Terminal>,
    capture: Option<Terminal>,
}

impl Condition {
    fn compile(terminals: &[Terminal], capture: Option<Terminal>) -> Result<Self, Error> {
        let mut alternatives = vec![];
        let mut groups = vec![];
        let mut eof = None;
        for terminal in terminals.iter() {
            if terminal.is_eof() {
                if eof.is_none() {
                    eof = Some(terminal.clone());
                }
                continue;
            }
            let pattern = match terminal.pattern() {
                Some(pattern) if !pattern.is_empty() => pattern,
                _ if terminal.is_discard() => continue,
                _ => return Err(Error::MissingPattern(terminal.name().to_string())),
            };
            // Group names use the reserved "aa" prefix so they cannot be
            // captured by user patterns' own group names.
            let group = format!("aa{}", groups.len());
            let alternative = match terminal.trailing() {
                Some(trailing) => format!("(?P<{}>{})(?:{})", group, pattern, trailing),
                None => format!("(?P<{}>{})", group, pattern),
            };
            alternatives.push(alternative);
            groups.push((group, terminal.clone()));
        }
        let regex = if alternatives.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"\A(?:{})", alternatives.join("|")))?)
        };
        Ok(Self {
            regex,
            groups,
            eof,
            capture,
        })
    }
}

/// Accumulates start conditions and scan actions, then compiles a `Scanner`.
pub struct ScannerBuilder<A> {
    conditions: Vec<(String, Vec<Terminal>, Option<Terminal>)>,
    actions: HashMap<String, ScanAction<A>>,
    default_action: ScanAction<A>,
}

impl<A> ScannerBuilder<A> {
    /// The default action runs for terminals without one of their own; it
    /// owns both the location advance and the token value.
    pub fn new<F>(default_action: F) -> Self
    where
        F: for<'a> Fn(&'a mut ScanCtx<A>) -> Result<Option<A>, Error> + Send + Sync + 'static,
    {
        Self {
            conditions: vec![],
            actions: HashMap::new(),
            default_action: Box::new(default_action),
        }
    }

    /// Append a start condition naming a subset of terminals plus an
    /// optional capture terminal. The first condition is the initial one.
    pub fn condition(
        mut self,
        name: &str,
        terminals: &[&Terminal],
        capture: Option<&Terminal>,
    ) -> Self {
        self.conditions.push((
            name.to_string(),
            terminals.iter().map(|t| (*t).clone()).collect(),
            capture.cloned(),
        ));
        self
    }

    pub fn action<F>(mut self, terminal: &Terminal, action: F) -> Self
    where
        F: for<'a> Fn(&'a mut ScanCtx<A>) -> Result<Option<A>, Error> + Send + Sync + 'static,
    {
        self.actions
            .insert(terminal.name().to_string(), Box::new(action));
        self
    }

    pub fn build(self) -> Result<Scanner<A>, Error> {
        let mut conditions = vec![];
        let mut index = HashMap::new();
        for (name, terminals, capture) in self.conditions.into_iter() {
            index.insert(name.clone(), conditions.len());
            conditions.push(Condition::compile(&terminals, capture)?);
        }
        Ok(Scanner {
            conditions,
            index,
            actions: self.actions,
            default_action: self.default_action,
        })
    }
}

/// Options for a single scan of one input text.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub filename: String,
    /// Silently stop at unmatched input instead of raising `TrailingJunk`.
    pub ignore_trailing: bool,
    /// Stop after emitting the end-of-file token instead of letting its
    /// action pop a context and keep scanning.
    pub eof_stop: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            filename: "<memory>".to_string(),
            ignore_trailing: false,
            eof_stop: true,
        }
    }
}

/// The compiled scanner. Immutable; each call to `token_stream` opens an
/// independent session over one input text.
pub struct Scanner<A> {
    conditions: Vec<Condition>,
    index: HashMap<String, usize>,
    actions: HashMap<String, ScanAction<A>>,
    default_action: ScanAction<A>,
}

impl<A> Scanner<A> {
    /// A lazy sequence of tokens; the producer runs one step per pull.
    /// Dropping the iterator abandons the scan.
    pub fn token_stream(&self, text: &str, options: ScanOptions) -> TokenIter<'_, A> {
        let location = Location::new(&options.filename);
        TokenIter {
            scanner: self,
            text: text.to_string(),
            options,
            pos: 0,
            location,
            stack: vec![ContextFrame {
                condition: 0,
                value: None,
                text: String::new(),
            }],
            leave: false,
            done: false,
        }
    }
}

/// One entry of the scan-time context stack.
struct ContextFrame<A> {
    condition: usize,
    value: Option<A>,
    /// The last text matched while this context was on top; capture actions
    /// see it.
    text: String,
}

pub struct TokenIter<'a, A> {
    scanner: &'a Scanner<A>,
    text: String,
    options: ScanOptions,
    pos: usize,
    location: Location,
    stack: Vec<ContextFrame<A>>,
    leave: bool,
    done: bool,
}

impl<'a, A: Default> TokenIter<'a, A> {
    fn apply_ops(&mut self, ops: Vec<ScanOp<A>>) -> Result<(), Error> {
        for op in ops {
            match op {
                ScanOp::Enter(name, value) => {
                    let condition = *self
                        .scanner
                        .index
                        .get(&name)
                        .ok_or_else(|| Error::UnknownCondition(name.clone()))?;
                    self.stack.push(ContextFrame {
                        condition,
                        value,
                        text: String::new(),
                    });
                }
                ScanOp::Leave => {
                    if self.stack.len() == 1 {
                        return Err(Error::LeaveRootContext(self.location.clone()));
                    }
                    self.leave = true;
                }
            }
        }
        Ok(())
    }

    /// Run the terminal's action (or the default) over a context assembled
    /// from the given pieces, write the location back, apply the action's
    /// stack effects, and hand back its result plus the residual value.
    fn run_action(
        &mut self,
        action_key: &str,
        text: String,
        value: Option<A>,
    ) -> (Result<Option<A>, Error>, Option<A>) {
        let mut ctx = ScanCtx::new(text, self.location.clone(), value);
        let result = match self.scanner.actions.get(action_key) {
            Some(action) => action(&mut ctx),
            None => (self.scanner.default_action)(&mut ctx),
        };
        let ScanCtx {
            location,
            value,
            ops,
            ..
        } = ctx;
        self.location = location;
        let result = match result {
            Ok(value) => self.apply_ops(ops).map(|_| value),
            Err(error) => Err(error),
        };
        (result, value)
    }

    /// Handle a pending `leave`: emit the capture token if the popped
    /// context's condition registered one, then continue with the outer
    /// context.
    fn pop_context(&mut self) -> Result<Option<TokenValue<A>>, Error> {
        self.leave = false;
        let mut frame = match self.stack.pop() {
            Some(frame) => frame,
            None => return Ok(None),
        };
        let condition = &self.scanner.conditions[frame.condition];
        let capture = match condition.capture.clone() {
            Some(capture) => capture,
            None => return Ok(None),
        };
        let text = frame.text.clone();
        let accumulated = frame.value.take();
        if self.scanner.actions.contains_key(capture.name()) {
            let (result, _residue) = self.run_action(capture.name(), text, accumulated);
            match result? {
                Some(value) => Ok(Some(TokenValue::new(
                    Symbol::from(&capture),
                    value,
                    Some(self.location.clone()),
                ))),
                None => Ok(None),
            }
        } else {
            Ok(Some(TokenValue::new(
                Symbol::from(&capture),
                accumulated.unwrap_or_default(),
                Some(self.location.clone()),
            )))
        }
    }

    /// End of input: emit the current condition's end-of-file token, letting
    /// its action pop a context when scanning is to continue.
    fn emit_eof(&mut self) -> Result<Option<TokenValue<A>>, Error> {
        let frame = match self.stack.last() {
            Some(frame) => frame,
            None => return Ok(None),
        };
        let condition = &self.scanner.conditions[frame.condition];
        let eof = match condition.eof.clone() {
            Some(eof) => eof,
            None => {
                self.done = true;
                return Ok(None);
            }
        };
        let value = if self.scanner.actions.contains_key(eof.name()) {
            let (result, _residue) = self.run_action(eof.name(), String::new(), None);
            result?
        } else {
            None
        };
        if self.options.eof_stop {
            self.done = true;
        }
        Ok(Some(TokenValue::new(
            Symbol::from(&eof),
            value.unwrap_or_default(),
            Some(self.location.clone()),
        )))
    }
}

impl<'a, A: Default> Iterator for TokenIter<'a, A> {
    type Item = Result<TokenValue<A>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.leave {
                match self.pop_context() {
                    Ok(Some(token)) => return Some(Ok(token)),
                    Ok(None) => continue,
                    Err(error) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                }
            }
            if self.pos >= self.text.len() {
                match self.emit_eof() {
                    Ok(Some(token)) => return Some(Ok(token)),
                    Ok(None) => return None,
                    Err(error) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                }
            }
            let top = self.stack.len() - 1;
            let condition = &self.scanner.conditions[self.stack[top].condition];
            let captures = condition
                .regex
                .as_ref()
                .and_then(|regex| regex.captures(&self.text[self.pos..]));
            let captures = match captures {
                Some(captures) => captures,
                None => {
                    self.done = true;
                    if self.options.ignore_trailing {
                        return None;
                    }
                    return Some(Err(Error::TrailingJunk(self.location.clone())));
                }
            };
            // The first named group present identifies the winning
            // alternative; the alternation commits to exactly one.
            let mut winner = None;
            for (group, terminal) in condition.groups.iter() {
                if let Some(found) = captures.name(group) {
                    winner = Some((found, terminal.clone()));
                    break;
                }
            }
            let (found, terminal) = match winner {
                Some(winner) => winner,
                None => {
                    self.done = true;
                    return Some(Err(Error::TrailingJunk(self.location.clone())));
                }
            };
            let lexeme = found.as_str().to_string();
            let token_location = self.location.clone();
            // Trailing lookahead is matched but never consumed.
            let end = self.pos + found.end();
            self.stack[top].text = lexeme.clone();
            let value = self.stack[top].value.take();
            let (result, residue) = self.run_action(terminal.name(), lexeme, value);
            self.stack[top].value = residue;
            self.pos = end;
            match result {
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
                Ok(Some(value)) if !terminal.is_discard() => {
                    return Some(Ok(TokenValue::new(
                        Symbol::from(&terminal),
                        value,
                        Some(token_location),
                    )));
                }
                Ok(_) => continue,
            }
        }
    }
}
