//! # Partsmith
//!
//! Library half of the `partsmith` binary: the command-line interface over
//! a redb model catalogue, exposed so the commands can be driven from tests.

pub mod cli;
