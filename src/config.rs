// ABOUTME: Crate version and CLI text used by clap's derived --help/--version

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ABOUT: &str = "A tree-walking interpreter for the L scripting language";

pub const LONG_ABOUT: &str = "\
Reads a source file, runs it against a fresh global scope, and writes \
program output and WATCH: diagnostics to stdout.";
