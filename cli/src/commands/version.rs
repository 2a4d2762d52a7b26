//! Version command

/// Run the version command.
pub fn run() {
    println!("hostprep {}", env!("CARGO_PKG_VERSION"));
}
