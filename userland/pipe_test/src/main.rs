//! Exercises the pipe + fd-table + fork interaction: a parent opens a pipe,
//! forks, the child writes a message into the write end and exits, and the
//! parent reads it back out of the read end.

#![no_std]
#![no_main]

atomiclibc::entry_point!(main);

const MESSAGE: &[u8] = b"ping from the child\n";

fn main() -> ! {
    let Some([read_fd, write_fd]) = atomiclibc::pipe() else {
        atomiclibc::println!("pipe_test: pipe() failed");
        atomiclibc::exit(1);
    };
    let read_fd = read_fd as usize;
    let write_fd = write_fd as usize;

    match atomiclibc::fork() {
        0 => {
            // Child: only needs the write end.
            atomiclibc::close(read_fd);
            let n = atomiclibc::write(write_fd, MESSAGE);
            atomiclibc::close(write_fd);
            atomiclibc::println!("pipe_test: child wrote {} bytes", n);
            atomiclibc::exit(0);
        }
        -1 => {
            atomiclibc::println!("pipe_test: fork failed");
            atomiclibc::exit(1);
        }
        _child_pid => {
            // Parent: only needs the read end.
            atomiclibc::close(write_fd);
            let mut buf = [0u8; 64];
            let n = atomiclibc::read(read_fd, &mut buf);
            atomiclibc::close(read_fd);
            if n > 0 {
                if let Ok(s) = core::str::from_utf8(&buf[..n as usize]) {
                    atomiclibc::println!("pipe_test: parent read: {}", s.trim_end());
                } else {
                    atomiclibc::println!("pipe_test: parent read {} non-utf8 bytes", n);
                }
            } else {
                atomiclibc::println!("pipe_test: parent read failed ({})", n);
            }

            let reaped = atomiclibc::wait();
            atomiclibc::println!("pipe_test: reaped pid {}", reaped);
            atomiclibc::exit(0);
        }
    }
}
