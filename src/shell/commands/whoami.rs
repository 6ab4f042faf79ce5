use crate::println;

/// whoami — show the current user.
pub fn run(_args: &str) {
    println!("root");
}
