use clap::{Arg, ArgAction, Command};
use log::{info, warn, LevelFilter};
use std::fs;
use std::io;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use synvm::cli::format::listing;
use synvm::cli::{debugger, CliError, Debugger};
use synvm::config::{parse_word, VMConfig};
use synvm::vm::{ThreadedInput, VMError, Word, WriteMode, VM};

#[derive(Debug, Error)]
enum AppError {
    #[error("VM error: {0}")]
    VM(#[from] VMError),

    #[error("{0}")]
    Cli(#[from] CliError),

    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Other(s.to_string())
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let matches = Command::new("synvm")
        .version("0.5.1")
        .about("15-bit register VM with a transactional word store")
        .arg(
            Arg::new("image")
                .value_name("IMAGE")
                .help("Binary image of little-endian 16-bit words"),
        )
        .arg(
            Arg::new("base")
                .short('b')
                .long("base")
                .value_name("ADDR")
                .help("Load address for the image (decimal or 0x hex)"),
        )
        .arg(
            Arg::new("journaled")
                .short('j')
                .long("journaled")
                .help("Route instruction memory traffic through the transaction journal")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Start the interactive debugger")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("disasm")
                .long("disasm")
                .help("Print a disassembly of the image and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("count")
                .short('n')
                .long("count")
                .value_name("N")
                .help("Number of instructions to disassemble")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log output (-v debug, -vv trace)")
                .action(ArgAction::Count),
        )
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .init();

    let mut config = VMConfig::from_env();
    if matches.get_flag("journaled") {
        config.write_mode = WriteMode::Journaled;
    }
    if let Some(base) = matches.get_one::<String>("base") {
        match parse_word(base) {
            Some(base) => config.load_base = base,
            None => {
                eprintln!("Error: invalid load address '{}'", base);
                process::exit(1);
            }
        }
    }

    let image = matches.get_one::<String>("image").cloned();
    let result = if matches.get_flag("disasm") {
        let count = matches.get_one::<usize>("count").copied();
        run_disasm(image, config, count)
    } else if matches.get_flag("debug") {
        run_debugger(image, config).await
    } else {
        run_program(image, config).await
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn load_vm(image: Option<&str>, config: VMConfig) -> Result<VM, AppError> {
    let base = config.load_base as usize;
    let mut vm = VM::with_config(config, ThreadedInput::stdin(), io::stdout());
    if let Some(path) = image {
        let bytes = fs::read(path)?;
        let words = vm.load_image(&bytes, base)?;
        info!("Loaded {} words from {} at {:#06x}", words, path, base);
        vm.set_pc(base as Word);
    }
    Ok(vm)
}

/// Raise `flag` on every Ctrl+C
fn spawn_interrupt_listener(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            info!("Ctrl+C received, interrupting the VM");
            flag.store(true, Ordering::SeqCst);
        }
    });
}

async fn run_program(image: Option<String>, config: VMConfig) -> Result<(), AppError> {
    let path = image.ok_or("No image given; pass IMAGE or use --debug")?;
    let mut vm = load_vm(Some(&path), config)?;
    spawn_interrupt_listener(vm.interrupt_handle());

    let halt = tokio::task::spawn_blocking(move || vm.execute())
        .await
        .map_err(|e| AppError::Other(e.to_string()))??;

    eprintln!("{}", debugger::halted(&halt));
    Ok(())
}

async fn run_debugger(image: Option<String>, config: VMConfig) -> Result<(), AppError> {
    let vm = load_vm(image.as_deref(), config)?;
    spawn_interrupt_listener(vm.interrupt_handle());

    tokio::task::spawn_blocking(move || Debugger::new(vm).run())
        .await
        .map_err(|e| AppError::Other(e.to_string()))??;
    Ok(())
}

fn run_disasm(image: Option<String>, config: VMConfig, count: Option<usize>) -> Result<(), AppError> {
    let path = image.ok_or("No image given")?;
    let base = config.load_base as usize;
    let vm = load_vm(Some(&path), config)?;
    for line in listing(base, vm.peek(base, None), count.unwrap_or(usize::MAX)) {
        println!("{}", line);
    }
    Ok(())
}
