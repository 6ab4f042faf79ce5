//! Minimal smoke test for the ELF loader and syscall ABI: prints a line and
//! exits cleanly.

#![no_std]
#![no_main]

atomiclibc::entry_point!(main);

fn main() -> ! {
    atomiclibc::println!("hello from userland, pid {}", atomiclibc::getpid());
    atomiclibc::exit(0)
}
