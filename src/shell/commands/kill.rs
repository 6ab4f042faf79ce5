use crate::println;
use crate::scheduler::{lifecycle, ProcessId, READY_TABLE};

/// kill <pid> — mark a process for termination.
pub fn run(args: &str) {
    let pid_str = args.trim();
    if pid_str.is_empty() {
        println!("kill: usage: kill <pid>");
        return;
    }

    let pid: u64 = match pid_str.parse() {
        Ok(v) => v,
        Err(_) => {
            println!("kill: invalid pid: {}", pid_str);
            return;
        }
    };

    if pid == 0 {
        println!("kill: cannot kill init (pid 0)");
        return;
    }

    // Ready Table lock must only ever be held with interrupts off (§5).
    let result = x86_64::instructions::interrupts::without_interrupts(|| {
        let mut rt = READY_TABLE.lock();
        lifecycle::kill(&mut rt, ProcessId(pid))
    });
    match result {
        Ok(()) => println!("kill: sent to pid {}", pid),
        Err(_) => println!("kill: no such process: {}", pid),
    }
}
