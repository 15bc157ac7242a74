pub mod boot;
pub mod command;
pub mod parse;

use crate::{
    fs::FileSystem,
    shell::{
        command::{execute_command, Command, Session},
        parse::parse_command,
    },
};
use colored::*;
use log::warn;
use reedline::{
    DefaultCompleter, DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal,
};
use std::{error::Error, path::Path, path::PathBuf};

const HISTORY_FILE: &str = ".minifat_history";
const HISTORY_SIZE: usize = 100;

pub fn start_shell(volume: &Path) -> Result<(), Box<dyn Error>> {
    let mut fs = boot::boot(volume)?;

    let username = whoami::username();
    let hostname = whoami::fallible::hostname().unwrap_or_else(|_| String::from("localhost"));
    let mut session = Session::new(true);

    println!(
        "{}",
        "Type 'help' for available commands. Use ↑↓ for history, Tab for auto-completion.\n"
            .bright_black()
    );

    let mut line_editor = Reedline::create();

    // 历史记录文件放在家目录下
    let history_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HISTORY_FILE);
    match FileBackedHistory::with_file(HISTORY_SIZE, history_path) {
        Ok(history) => line_editor = line_editor.with_history(Box::new(history)),
        Err(e) => warn!("shell history disabled: {}", e),
    }

    // 命令补全
    let commands = [
        "help", "ls", "pwd", "cd", "exit", "dir", "mkdir", "rmdir", "dumpe2fs", "writeDirect",
        "write", "read", "del", "chmod", "addpw", "test",
    ];
    let completer =
        DefaultCompleter::new_with_wordlen(commands.iter().map(|c| c.to_string()).collect(), 2);
    line_editor = line_editor.with_completer(Box::new(completer));

    loop {
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(format!(
                "{}:{}",
                format!("{}@{}", username, hostname).green(),
                session.current_dir.blue()
            )),
            DefaultPromptSegment::Basic("MiniFAT".bright_blue().bold().to_string()),
        );

        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                let tokens: Vec<&str> = buffer.split_ascii_whitespace().collect();
                if tokens.is_empty() {
                    continue;
                }

                match parse_command(&tokens) {
                    Some(cmd) => {
                        if let Err(e) = execute_command(&mut fs, &cmd, &mut session) {
                            println!("{} {}", "❌ Error:".red().bold(), e);
                        }
                        // 和命令行模式一样，每条命令之后都落盘
                        if let Err(e) = fs.save() {
                            println!("{} {}", "❌ Error:".red().bold(), e);
                        }
                        if cmd == Command::Exit {
                            break;
                        }
                    }
                    None => println!(
                        "{}",
                        "⚠️  Unknown command or wrong arguments. Type 'help' for command list."
                            .yellow()
                    ),
                }
            }
            Ok(Signal::CtrlC) => {
                println!();
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("{}", "Exiting MiniFAT...".yellow());
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                println!("Error reading line: {}", e);
                break;
            }
        }
    }

    fs.save()?;
    println!("{}", "GoodBye!".bright_yellow());
    Ok(())
}
