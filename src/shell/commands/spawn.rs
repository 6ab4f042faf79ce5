use crate::println;
use crate::scheduler::{config, dispatcher, lifecycle, READY_TABLE};

/// spawn <name> — create a demo process at the default home level.
pub fn run(args: &str) {
    let name = args.trim();
    if name.is_empty() {
        println!("spawn: usage: spawn <task_name>");
        println!("  Available demo tasks: counter, ticker, hello");
        return;
    }

    let entry: u64 = match name {
        "counter" => task_counter as *const () as u64,
        "ticker" => task_ticker as *const () as u64,
        "hello" => task_hello as *const () as u64,
        _ => {
            println!("spawn: unknown task '{}'", name);
            return;
        }
    };

    // Ready Table lock must only ever be held with interrupts off (§5).
    let result = x86_64::instructions::interrupts::without_interrupts(|| {
        let mut rt = READY_TABLE.lock();
        lifecycle::create_process(&mut rt, entry, name, config::DEFAULT_HOME)
    });
    match result {
        Ok(pid) => println!("Spawned '{}' as pid {}", name, pid.0),
        Err(e) => println!("spawn: failed to create '{}': {:?}", name, e),
    }
}

/// Demo task: counts to 5 then exits.
fn task_counter() {
    let cpu_id = dispatcher::current_cpu_id();
    for i in 1..=5 {
        crate::println!("[counter] tick {}", i);
        for _ in 0..500_000 {
            core::hint::spin_loop();
        }
        lifecycle::yield_(&READY_TABLE, cpu_id);
    }
    crate::println!("[counter] done!");
    lifecycle::exit(&READY_TABLE, cpu_id, 0);
}

/// Demo task: prints 3 ticks then exits.
fn task_ticker() {
    let cpu_id = dispatcher::current_cpu_id();
    for _ in 0..3 {
        crate::println!("[ticker] *");
        for _ in 0..300_000 {
            core::hint::spin_loop();
        }
        lifecycle::yield_(&READY_TABLE, cpu_id);
    }
    crate::println!("[ticker] finished.");
    lifecycle::exit(&READY_TABLE, cpu_id, 0);
}

/// Demo task: prints hello and exits immediately.
fn task_hello() {
    crate::println!("[hello] Hello from a background task!");
    lifecycle::exit(&READY_TABLE, dispatcher::current_cpu_id(), 0);
}
