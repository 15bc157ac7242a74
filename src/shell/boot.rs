use colored::*;
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    error::Error,
    io::stdout,
    path::{Path, PathBuf},
    sync::mpsc::{self, Sender},
    thread,
    time::Duration,
};

use crate::fs::{config::DEFAULT_BLOCK_SIZE_KB, error::FileSystemError, FileSystem};

/// 后台挂载线程发给界面的进度消息
pub enum BootProgress {
    Step(&'static str),
    Progress(u64),
    Finished(Result<FileSystem, FileSystemError>),
}

// 在后台线程里打开或格式化卷文件，通过 channel 汇报进度
fn perform_volume_initialization(path: PathBuf, tx: Sender<BootProgress>) {
    let _ = tx.send(BootProgress::Step("🧠 Opening volume file..."));
    if !path.exists() {
        let _ = tx.send(BootProgress::Step(
            "🔧 No volume found, formatting a new one...",
        ));
    }
    let _ = tx.send(BootProgress::Progress(30));

    let result = FileSystem::open_or_format(&path, DEFAULT_BLOCK_SIZE_KB);
    let _ = tx.send(BootProgress::Step("⚙️  Loading allocation table and entries..."));
    for i in 50..=100 {
        let _ = tx.send(BootProgress::Progress(i));
        thread::sleep(Duration::from_millis(5));
    }

    let _ = tx.send(BootProgress::Finished(result));
}

/// 开机动画：挂载在后台进行，前台显示步骤和进度条
pub fn boot(path: &Path) -> Result<FileSystem, Box<dyn Error>> {
    let mut stdout = stdout();
    execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    println!("{}", "[MiniFAT Booting...]".bright_yellow().bold());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );

    let (tx, rx) = mpsc::channel();
    let path = path.to_path_buf();
    let worker = thread::spawn(move || perform_volume_initialization(path, tx));

    let mut mounted = None;
    for message in rx {
        match message {
            BootProgress::Step(step) => pb.println(step),
            BootProgress::Progress(pos) => pb.set_position(pos),
            BootProgress::Finished(result) => mounted = Some(result),
        }
    }
    if worker.join().is_err() {
        return Err("volume initialization thread panicked".into());
    }

    let fs = match mounted {
        Some(Ok(fs)) => fs,
        Some(Err(e)) => {
            pb.abandon_with_message("❌ Failed");
            return Err(Box::new(e));
        }
        None => return Err("volume initialization did not finish".into()),
    };
    pb.finish_with_message("✅ Ready!");

    thread::sleep(Duration::from_millis(300));
    execute!(
        stdout,
        Clear(ClearType::All),
        cursor::MoveTo(0, 0),
        SetForegroundColor(Color::Cyan),
        Print(format!(
            "Welcome to MiniFAT v{}\n",
            env!("CARGO_PKG_VERSION")
        )),
        ResetColor
    )?;
    Ok(fs)
}
