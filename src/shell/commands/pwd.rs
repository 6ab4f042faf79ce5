use crate::println;

/// pwd — print the shell's current working directory.
pub fn run(_args: &str) {
    println!("{}", crate::shell::state::CWD.lock());
}
