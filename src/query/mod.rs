//! Query engine.
//!
//! # Data Flow
//! ```text
//! "level:ERROR AND service:checkout"
//!     → lexer.rs (tokens: terms, AND/OR/NOT, parens, quotes)
//!     → parser.rs (precedence: NOT > AND > OR; time terms resolved here)
//!     → Predicate (immutable, Send + Sync)
//!
//! FilterConfiguration (viewer JSON)
//!     → filter.rs compile() → CompiledFilter { levels, services, ..., query }
//!
//! Hub broadcast / history / export
//!     → CompiledFilter::matches(&LogEvent)
//! ```
//!
//! # Design Decisions
//! - Unknown fields never match (their negation always does)
//! - Needles are lowercased once at compile time
//! - Predicates are values; sharing them needs no locks

pub mod error;
pub mod filter;
pub mod lexer;
pub mod parser;
pub mod predicate;
pub mod time;

pub use error::QueryError;
pub use filter::{CompiledFilter, FilterConfiguration, TimeRange};
pub use lexer::Cmp;
pub use parser::{parse, parse_at};
pub use predicate::{LevelTest, Predicate};
