use crate::println;
use crate::scheduler;

/// schedlog <n> — enable the scheduler's diagnostic trace for the next
/// <n> timer ticks. Each line traces one staircase/level pair; see
/// `scheduler::schedlog` for the wire format.
pub fn run(args: &str) {
    let n: u64 = match args.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            println!("schedlog: usage: schedlog <n>");
            return;
        }
    };

    scheduler::schedlog::enable(scheduler::ticks_now(), n);
    println!("schedlog: tracing for the next {} ticks", n);
}
