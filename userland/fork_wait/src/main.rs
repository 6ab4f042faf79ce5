//! Exercises `fork`/`wait`/`exit` from userland: a parent forks a handful of
//! children, each of which prints its own pid and exits with a distinct
//! status, then the parent reaps every child in turn and reports what it
//! found.

#![no_std]
#![no_main]

atomiclibc::entry_point!(main);

const CHILDREN: u64 = 3;

fn main() -> ! {
    let parent_pid = atomiclibc::getpid();
    atomiclibc::println!("fork_wait: parent pid {}", parent_pid);

    for i in 0..CHILDREN {
        match atomiclibc::fork() {
            0 => {
                // Child: announce, yield a couple times to give siblings a
                // chance to interleave, then exit with a status tied to i.
                atomiclibc::println!("fork_wait: child {} pid {}", i, atomiclibc::getpid());
                atomiclibc::yield_now();
                atomiclibc::yield_now();
                atomiclibc::exit(100 + i);
            }
            -1 => {
                atomiclibc::println!("fork_wait: fork failed for child {}", i);
            }
            child_pid => {
                atomiclibc::println!("fork_wait: spawned child {} as pid {}", i, child_pid);
            }
        }
    }

    for _ in 0..CHILDREN {
        let reaped = atomiclibc::wait();
        if reaped < 0 {
            atomiclibc::println!("fork_wait: wait failed, no more children");
            break;
        }
        atomiclibc::println!("fork_wait: reaped pid {}", reaped);
    }

    atomiclibc::println!("fork_wait: done");
    atomiclibc::exit(0)
}
