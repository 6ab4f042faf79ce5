pub mod commands;
pub mod state;

use alloc::vec::Vec;
use crate::println;

/// Parse input line into command + arguments, then dispatch.
pub fn exec_command(input: &str) {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return;
    }

    let parts: Vec<&str> = trimmed.splitn(2, ' ').collect();
    let cmd = parts[0];
    let args = if parts.len() > 1 { parts[1] } else { "" };

    state::log_cmd(trimmed);

    match cmd {
        "echo"       => commands::echo::run(args),
        "ls"         => commands::ls::run(args),
        "cat"        => commands::cat::run(args),
        "catbin"     => commands::catbin::run(args),
        "clear"      => commands::clear::run(args),
        "help"       => commands::help::run(args),
        "date"       => commands::date::run(args),
        "whoami"     => commands::whoami::run(args),
        "pwd"        => commands::pwd::run(args),
        "cd"         => commands::cd::run(args),
        "uptime"     => commands::uptime::run(args),
        "version"    => commands::version::run(args),
        "neofetch"   => commands::neofetch::run(args),
        "mkdir"      => commands::mkdir::run(args),
        "rm"         => commands::rm::run(args),
        "touch"      => commands::touch::run(args),
        "write"      => commands::write::run(args),
        "mv"         => commands::mv::run(args),
        "cp"         => commands::cp::run(args),
        "log"        => commands::log::run(args),
        "objdump"    => commands::objdump::run(args),
        "vfstest"    => commands::vfstest::run(args),
        "atatest"    => commands::atatest::run(args),
        "shellscript" => commands::shellscript::run(args),
        "ps"         => commands::ps::run(args),
        "kill"       => commands::kill::run(args),
        "spawn"      => commands::spawn::run(args),
        "yield"      => commands::yield_cmd::run(args),
        "exec"       => commands::exec::run(args),
        "schedlog"   => commands::schedlog::run(args),
        _            => println!("{}: command not found", cmd),
    }
}
