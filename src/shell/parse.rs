use crate::shell::command::Command;

/// 把一行输入（或命令行参数）解析成命令。参数个数不对时返回 None，调用方打印用法。
pub fn parse_command(tokens: &[&str]) -> Option<Command> {
    let (&cmd, args) = tokens.split_first()?;
    let arg = |i: usize| args.get(i).map(|s| s.to_string());

    match (cmd, args.len()) {
        ("help", 0) => Some(Command::Help),
        ("ls", 0) => Some(Command::Ls),
        ("pwd", 0) => Some(Command::Pwd),
        ("exit", 0) => Some(Command::Exit),
        ("cd", 1) => Some(Command::Cd(arg(0)?)),
        ("dir", 0) => Some(Command::Dir(String::from("."))),
        ("dir", 1) => Some(Command::Dir(arg(0)?)),
        ("mkdir", 1) => Some(Command::Mkdir(arg(0)?)),
        ("rmdir", 1) => Some(Command::Rmdir(arg(0)?)),
        ("dumpe2fs", 0) => Some(Command::Dumpe2fs),
        // 内容可以带空格，剩下的参数全部拼起来
        ("writeDirect", n) if n >= 2 => Some(Command::WriteDirect(arg(0)?, args[1..].join(" "))),
        ("write", 2) => Some(Command::Write(arg(0)?, arg(1)?)),
        ("read", 2) => Some(Command::Read(arg(0)?, arg(1)?, None)),
        ("read", 3) => Some(Command::Read(arg(0)?, arg(1)?, arg(2))),
        ("del", 1) => Some(Command::Del(arg(0)?)),
        ("chmod", 2) => Some(Command::Chmod(arg(0)?, arg(1)?)),
        ("addpw", 2) => Some(Command::Addpw(arg(0)?, arg(1)?)),
        ("test", 0) => Some(Command::Test),
        _ => None,
    }
}

/// 每个命令的参数格式，用于提示和 help
pub const USAGE: &[(&str, &str)] = &[
    ("dir [path]", "List the records of a directory"),
    ("mkdir <path>", "Create directory"),
    ("rmdir <path>", "Remove directory"),
    ("dumpe2fs", "Show volume summary"),
    ("writeDirect <path> <content>", "Write a string into a new file"),
    ("write <path> <srcPath>", "Copy an existing file into a new file"),
    ("read <path> <destPath> [password]", "Read a file and copy it to destPath"),
    ("del <path>", "Delete file"),
    ("chmod <path> <+rw|+r|+w|-rw|-r|-w>", "Change permissions"),
    ("addpw <path> <password>", "Protect a file with a password"),
    ("test", "Dump allocation table, directories and blocks"),
];
