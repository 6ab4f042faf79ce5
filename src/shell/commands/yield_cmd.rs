use crate::println;
use crate::scheduler::{dispatcher, lifecycle, READY_TABLE};

/// yield — voluntarily give up the remainder of the current quantum.
pub fn run(_args: &str) {
    println!("yield: switching away...");
    lifecycle::yield_(&READY_TABLE, dispatcher::current_cpu_id());
}
