//! A runtime parser-generator toolkit.
//!
//! A grammar is declared against a [`Grammar`]: terminals with regex
//! patterns, non-terminals with production rules and reducers, operator
//! precedence annotations. Compiling it yields an immutable [`Automaton`]
//! that a pull-driven [`Scanner`] feeds at parse time; the driver applies
//! the user reducers and returns the start symbol's semantic value.

mod error;
mod grammar;
mod parser;
mod production;
mod scanner;
mod state;
mod symbol;
mod token;

pub use crate::error::Error;
pub use crate::grammar::{Automaton, Grammar};
pub use crate::production::Reducer;
pub use crate::scanner::{ScanCtx, ScanOptions, Scanner, ScannerBuilder, TokenIter};
pub use crate::symbol::{
    Associativity, NonTerminal, Precedence, Symbol, SymbolTable, Terminal, TerminalOptions,
};
pub use crate::token::{Location, TokenValue};
