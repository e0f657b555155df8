#![forbid(unsafe_code)]

pub mod table;

use std::io::IsTerminal as _;

#[must_use]
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}
