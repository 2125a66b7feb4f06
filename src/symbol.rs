use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Shift,
    Left,
    Right,
    NonAssoc,
}

impl Default for Associativity {
    fn default() -> Self {
        Associativity::Shift
    }
}

impl fmt::Display for Associativity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Associativity::*;
        match self {
            Shift => write!(f, "Shift"),
            Left => write!(f, "Left"),
            Right => write!(f, "Right"),
            NonAssoc => write!(f, "NonAssoc"),
        }
    }
}

/// A (level, associativity) pair. Levels ascend in declaration order;
/// level 0 is the unassigned default and always shifts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Precedence {
    pub level: u16,
    pub associativity: Associativity,
}

impl Precedence {
    pub fn new(level: u16, associativity: Associativity) -> Self {
        Self {
            level,
            associativity,
        }
    }
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Precedence({}, {})", self.level, self.associativity)
    }
}

/// Declaration-time options for a terminal.
#[derive(Debug, Clone, Default)]
pub struct TerminalOptions {
    pattern: Option<String>,
    trailing: Option<String>,
    show_name: Option<String>,
    discard: bool,
    ignorable: bool,
    is_eof: bool,
}

impl TerminalOptions {
    pub fn matching(pattern: &str) -> Self {
        TerminalOptions {
            pattern: Some(pattern.to_string()),
            ..TerminalOptions::default()
        }
    }

    pub fn eof() -> Self {
        TerminalOptions {
            is_eof: true,
            ..TerminalOptions::default()
        }
    }

    /// The scanner drops matches of this terminal after running its action.
    pub fn discard(mut self) -> Self {
        self.discard = true;
        self
    }

    /// The parser may silently skip this terminal when it blocks progress.
    pub fn ignorable(mut self) -> Self {
        self.ignorable = true;
        self
    }

    /// A zero-width lookahead pattern required after the main pattern.
    pub fn trailing(mut self, pattern: &str) -> Self {
        self.trailing = Some(pattern.to_string());
        self
    }

    /// Human readable name used in diagnostics.
    pub fn show_name(mut self, name: &str) -> Self {
        self.show_name = Some(name.to_string());
        self
    }
}

#[derive(Debug)]
struct TerminalData {
    name: String,
    show_name: String,
    pattern: Option<String>,
    trailing: Option<String>,
    precedence: Precedence,
    discard: bool,
    ignorable: bool,
    is_eof: bool,
}

/// An atomic token class. Interned by the `SymbolTable`; identity, ordering
/// and hashing are all by name.
#[derive(Debug, Clone)]
pub struct Terminal(Arc<TerminalData>);

impl Terminal {
    fn new(name: &str, options: TerminalOptions, precedence: Precedence) -> Self {
        let show_name = options.show_name.unwrap_or_else(|| name.to_string());
        Terminal(Arc::new(TerminalData {
            name: name.to_string(),
            show_name,
            pattern: options.pattern,
            trailing: options.trailing,
            precedence,
            discard: options.discard,
            ignorable: options.ignorable,
            is_eof: options.is_eof,
        }))
    }

    pub(crate) fn end_of_input() -> Self {
        Terminal::new(
            "__EOF__",
            TerminalOptions::eof().show_name("end-of-file"),
            Precedence::default(),
        )
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn show_name(&self) -> &str {
        &self.0.show_name
    }

    pub fn pattern(&self) -> Option<&str> {
        self.0.pattern.as_deref()
    }

    pub fn trailing(&self) -> Option<&str> {
        self.0.trailing.as_deref()
    }

    pub fn precedence(&self) -> Precedence {
        self.0.precedence
    }

    pub fn is_discard(&self) -> bool {
        self.0.discard
    }

    pub fn is_ignorable(&self) -> bool {
        self.0.ignorable
    }

    pub fn is_eof(&self) -> bool {
        self.0.is_eof
    }
}

impl PartialEq for Terminal {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Terminal {}

impl PartialOrd for Terminal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Terminal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name())
    }
}

impl Hash for Terminal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state)
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.show_name())
    }
}

#[derive(Debug)]
struct NonTerminalData {
    name: String,
    show_name: String,
}

/// A grammar variable defined by production rules.
#[derive(Debug, Clone)]
pub struct NonTerminal(Arc<NonTerminalData>);

impl NonTerminal {
    pub(crate) fn new(name: &str, show_name: Option<&str>) -> Self {
        NonTerminal(Arc::new(NonTerminalData {
            name: name.to_string(),
            show_name: show_name.unwrap_or(name).to_string(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn show_name(&self) -> &str {
        &self.0.show_name
    }
}

impl PartialEq for NonTerminal {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for NonTerminal {}

impl PartialOrd for NonTerminal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NonTerminal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name())
    }
}

impl Hash for NonTerminal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state)
    }
}

impl fmt::Display for NonTerminal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.show_name())
    }
}

/// A rule component or automaton edge label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    Terminal(Terminal),
    NonTerminal(NonTerminal),
}

impl Symbol {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }

    pub fn is_non_terminal(&self) -> bool {
        matches!(self, Symbol::NonTerminal(_))
    }
}

impl From<&Terminal> for Symbol {
    fn from(terminal: &Terminal) -> Self {
        Symbol::Terminal(terminal.clone())
    }
}

impl From<&NonTerminal> for Symbol {
    fn from(non_terminal: &NonTerminal) -> Self {
        Symbol::NonTerminal(non_terminal.clone())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Symbol::Terminal(terminal) => terminal.fmt(f),
            Symbol::NonTerminal(non_terminal) => non_terminal.fmt(f),
        }
    }
}

/// The sole owner of interned terminals and non-terminals plus the
/// precedence ledger. Other components hold read-only handles.
#[derive(Debug, Default)]
pub struct SymbolTable {
    terminals: BTreeMap<String, Terminal>,
    non_terminals: BTreeMap<String, NonTerminal>,
    current_precedence: Precedence,
    eof_terminal: Option<Terminal>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Register a new terminal under the current precedence level.
    pub fn declare_terminal(
        &mut self,
        name: &str,
        options: TerminalOptions,
    ) -> Result<Terminal, Error> {
        if self.terminals.contains_key(name) {
            return Err(Error::DuplicateTerminal(name.to_string()));
        }
        let terminal = Terminal::new(name, options, self.current_precedence);
        if terminal.is_eof() && self.eof_terminal.is_none() {
            self.eof_terminal = Some(terminal.clone());
        }
        self.terminals.insert(name.to_string(), terminal.clone());
        Ok(terminal)
    }

    /// Register (or fetch) a non-terminal. Idempotent; a `show_name` is only
    /// honoured on first declaration.
    pub fn declare_symbol(&mut self, name: &str, show_name: Option<&str>) -> NonTerminal {
        if let Some(non_terminal) = self.non_terminals.get(name) {
            return non_terminal.clone();
        }
        let non_terminal = NonTerminal::new(name, show_name);
        self.non_terminals
            .insert(name.to_string(), non_terminal.clone());
        non_terminal
    }

    pub fn terminal(&self, name: &str) -> Option<&Terminal> {
        self.terminals.get(name)
    }

    pub fn non_terminal(&self, name: &str) -> Option<&NonTerminal> {
        self.non_terminals.get(name)
    }

    pub fn terminals(&self) -> impl Iterator<Item = &Terminal> {
        self.terminals.values()
    }

    pub fn non_terminals(&self) -> impl Iterator<Item = &NonTerminal> {
        self.non_terminals.values()
    }

    pub fn eof_terminal(&self) -> Option<&Terminal> {
        self.eof_terminal.as_ref()
    }

    pub fn current_precedence(&self) -> Precedence {
        self.current_precedence
    }

    fn open_level(&mut self, associativity: Associativity) {
        self.current_precedence =
            Precedence::new(self.current_precedence.level + 1, associativity);
    }

    /// Open a new level whose terminals reduce on equal-precedence ties.
    pub fn left(&mut self) {
        self.open_level(Associativity::Left)
    }

    /// Open a new level whose terminals shift on equal-precedence ties.
    pub fn right(&mut self) {
        self.open_level(Associativity::Right)
    }

    pub fn nonassoc(&mut self) {
        self.open_level(Associativity::NonAssoc)
    }

    /// Open a new level with the default shift associativity.
    pub fn increase(&mut self) {
        self.open_level(Associativity::Shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_terminal_is_rejected() {
        let mut table = SymbolTable::new();
        assert!(table
            .declare_terminal("NUMBER", TerminalOptions::matching(r"[0-9]+"))
            .is_ok());
        let result = table.declare_terminal("NUMBER", TerminalOptions::matching(r"\d+"));
        assert!(matches!(result, Err(Error::DuplicateTerminal(name)) if name == "NUMBER"));
    }

    #[test]
    fn precedence_levels_ascend() {
        let mut table = SymbolTable::new();
        let plain = table
            .declare_terminal("COMMA", TerminalOptions::matching(","))
            .unwrap();
        assert_eq!(plain.precedence(), Precedence::new(0, Associativity::Shift));
        table.right();
        let equals = table
            .declare_terminal("EQUALS", TerminalOptions::matching("="))
            .unwrap();
        assert_eq!(equals.precedence(), Precedence::new(1, Associativity::Right));
        table.left();
        let plus = table
            .declare_terminal("PLUS", TerminalOptions::matching(r"\+"))
            .unwrap();
        assert_eq!(plus.precedence(), Precedence::new(2, Associativity::Left));
        table.increase();
        let lpar = table
            .declare_terminal("LPAR", TerminalOptions::matching(r"\("))
            .unwrap();
        assert_eq!(lpar.precedence(), Precedence::new(3, Associativity::Shift));
    }

    #[test]
    fn symbols_intern_once() {
        let mut table = SymbolTable::new();
        let first = table.declare_symbol("EXPR", Some("Expression"));
        let second = table.declare_symbol("EXPR", None);
        assert_eq!(first, second);
        assert_eq!(second.show_name(), "Expression");
    }

    #[test]
    fn first_eof_terminal_is_the_sentinel() {
        let mut table = SymbolTable::new();
        assert!(table.eof_terminal().is_none());
        let eof = table.declare_terminal("EOF", TerminalOptions::eof()).unwrap();
        assert_eq!(table.eof_terminal(), Some(&eof));
    }

    #[test]
    fn terminals_and_symbols_do_not_collide() {
        let mut table = SymbolTable::new();
        let terminal = table
            .declare_terminal("X", TerminalOptions::matching("x"))
            .unwrap();
        let non_terminal = table.declare_symbol("X", None);
        assert_ne!(Symbol::from(&terminal), Symbol::from(&non_terminal));
    }
}
