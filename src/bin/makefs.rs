use colored::*;
use std::{env, process::ExitCode};

use mini_fat::{fs::FileSystem, logging};

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (Some(block_size), Some(volume)) = (args.first(), args.get(1)) else {
        eprintln!("Usage: makefs <blockSizeKB> <volume>");
        return ExitCode::from(1);
    };
    let Ok(block_size_kb) = block_size.parse::<f64>() else {
        eprintln!("Usage: makefs <blockSizeKB> <volume>");
        eprintln!("{} not a number: {}", "❌ Error:".red().bold(), block_size);
        return ExitCode::from(1);
    };

    match FileSystem::open_or_format(volume, block_size_kb).and_then(|fs| {
        fs.save()?;
        Ok(fs)
    }) {
        Ok(fs) => {
            let sb = fs.super_block();
            println!(
                "✅ Volume {} ready: {} blocks of {} bytes (id {})",
                volume.green(),
                sb.total_blocks,
                sb.block_size,
                sb.volume_id.bright_black()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "❌ Error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}
