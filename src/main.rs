use colored::*;
use std::{env, path::PathBuf, process::ExitCode};

use mini_fat::{
    fs::{config::DEFAULT_BLOCK_SIZE_KB, FileSystem},
    logging,
    shell::{
        command::{execute_command, Session},
        parse::{parse_command, USAGE},
        start_shell,
    },
};

fn print_usage() {
    eprintln!("Usage: minifat <volume> <operation> <parameters>");
    eprintln!("       minifat <volume> shell");
    eprintln!("Operations:");
    for (usage, _) in USAGE {
        eprintln!("  {}", usage);
    }
}

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }
    let volume = PathBuf::from(&args[0]);

    if args[1] == "shell" {
        return match start_shell(&volume) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{} {}", "❌ Error:".red().bold(), e);
                ExitCode::from(1)
            }
        };
    }

    let tokens: Vec<&str> = args[1..].iter().map(String::as_str).collect();
    let Some(cmd) = parse_command(&tokens) else {
        print_usage();
        return ExitCode::from(1);
    };

    let mut fs = match FileSystem::open_or_format(&volume, DEFAULT_BLOCK_SIZE_KB) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("{} {}", "❌ Error:".red().bold(), e);
            return ExitCode::from(1);
        }
    };

    // 操作失败只打印诊断，卷照常保存
    let mut session = Session::new(false);
    if let Err(e) = execute_command(&mut fs, &cmd, &mut session) {
        eprintln!("{} {}", "❌ Error:".red().bold(), e);
    }
    if let Err(e) = fs.save() {
        eprintln!("{} {}", "❌ Error:".red().bold(), e);
    }
    ExitCode::SUCCESS
}
