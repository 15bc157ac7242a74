use colored::*;
use dialoguer::Password;
use std::error::Error;

use crate::{
    fs::{
        directory::{DirectoryEntry, PermissionDelta},
        path::{join, leaf_name},
        FileSystem,
    },
    shell::parse::USAGE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Ls,
    Pwd,
    Cd(String),
    Exit,
    Dir(String),
    Mkdir(String),
    Rmdir(String),
    Dumpe2fs,
    WriteDirect(String, String),
    Write(String, String),
    Read(String, String, Option<String>),
    Del(String),
    Chmod(String, String),
    Addpw(String, String),
    Test,
}

/// 一次会话的状态：当前目录，以及能否交互式地询问密码
#[derive(Debug, Clone)]
pub struct Session {
    pub current_dir: String,
    pub interactive: bool,
}

impl Session {
    pub fn new(interactive: bool) -> Self {
        Self {
            current_dir: String::from("/"),
            interactive,
        }
    }

    fn resolve(&self, path: &str) -> String {
        join(&self.current_dir, path)
    }
}

pub fn execute_command(
    fs: &mut FileSystem,
    cmd: &Command,
    session: &mut Session,
) -> Result<(), Box<dyn Error>> {
    match cmd {
        Command::Help => print_help(),
        Command::Ls => {
            for entry in fs.list() {
                print_entry(&entry);
            }
        }
        Command::Pwd => println!("📍 {}", session.current_dir.cyan()),
        Command::Cd(path) => {
            let target = session.resolve(path);
            // 目标必须是一个存在的目录
            fs.list_directory(&target)?;
            session.current_dir = target;
            println!("📂 Moved to {}", session.current_dir.blue());
        }
        Command::Exit => println!("{}", "👋 Exiting MiniFAT shell...".yellow().bold()),
        Command::Dir(path) => {
            let target = session.resolve(path);
            println!("{} {}", "📂 Directory".bright_yellow().bold(), target.cyan());
            for record in fs.list_directory(&target)? {
                print_entry(&record);
            }
        }
        Command::Mkdir(path) => {
            let target = session.resolve(path);
            fs.make_directory(&target)?;
            println!("✅ Created directory: {}", target.green());
        }
        Command::Rmdir(path) => {
            let target = session.resolve(path);
            fs.remove_directory(&target)?;
            println!("🗑️ Removed directory: {}", target.red());
        }
        Command::Dumpe2fs => print!("{}", fs.dump_summary()),
        Command::WriteDirect(path, content) => {
            let target = session.resolve(path);
            fs.write_file(&target, content.as_bytes())?;
            println!(
                "✏️  Wrote {} bytes to {}",
                content.len(),
                target.cyan()
            );
        }
        Command::Write(path, src) => {
            let target = session.resolve(path);
            fs.write_file_from_existing(&target, &session.resolve(src))?;
            println!("📝 Created file: {}", target.green());
        }
        Command::Read(path, dest, password) => {
            let source = session.resolve(path);
            let dest = session.resolve(dest);
            let password = match password {
                Some(password) => Some(password.clone()),
                None if session.interactive && needs_password(fs, &source) => Some(
                    Password::new()
                        .with_prompt(format!("🔒 Password for {}", source))
                        .interact()?,
                ),
                None => None,
            };

            let content = fs.read_file(&source, &dest, password.as_deref())?;
            println!(
                "📖 Read {} bytes from {} into {}",
                content.len(),
                source.cyan(),
                dest.cyan()
            );
            println!("{}", String::from_utf8_lossy(&content).bright_black());
        }
        Command::Del(path) => {
            let target = session.resolve(path);
            fs.delete_file(&target)?;
            println!("❌ Deleted file: {}", target.red());
        }
        Command::Chmod(path, delta) => {
            let delta: PermissionDelta = delta.parse()?;
            let target = session.resolve(path);
            fs.change_mode(&target, delta)?;
            println!("🔧 Changed permissions of {}", target.green());
        }
        Command::Addpw(path, password) => {
            let target = session.resolve(path);
            fs.add_password(&target, password)?;
            println!("🔒 Password set on {}", target.green());
        }
        Command::Test => {
            print!("{}", fs.allocation_table());
            println!("{}", "Entries:".bright_yellow().bold());
            for entry in fs.entries().iter() {
                println!("    {}", entry);
            }
            for page in fs.directory_pages()? {
                print!("{}", page);
            }
            for dump in fs.block_contents()? {
                println!("{}", dump);
            }
        }
    }

    Ok(())
}

fn needs_password(fs: &FileSystem, path: &str) -> bool {
    leaf_name(path)
        .and_then(|leaf| fs.find_entry(leaf))
        .map_or(false, DirectoryEntry::has_password)
}

fn print_entry(entry: &DirectoryEntry) {
    let icon = if entry.is_directory() { "📁" } else { "📄" };
    let name = if entry.is_directory() {
        entry.name().blue().bold()
    } else {
        entry.name().normal()
    };
    let lock = if entry.has_password() { " 🔒" } else { "" };
    println!(
        "{}  {:<10} {:>8}  {}  {} {}{}",
        icon,
        name,
        entry.size(),
        entry.attributes().permission_string(),
        entry.formatted_date().bright_black(),
        entry.formatted_time().bright_black(),
        lock
    );
}

fn print_help() {
    println!("{}", "📘 MiniFAT Commands".bright_cyan().bold());
    for (usage, desc) in USAGE {
        println!("  {:<38} {}", usage, desc.bright_black());
    }
    println!(
        "{}",
        "
  ls                                     List every entry on the volume
  cd <path>                              Change directory
  pwd                                    Print current path
  help                                   Show this help message
  exit                                   Quit the shell
"
        .bright_black()
    );
}
