//! A small interactive shell over [`sectorfs::FileSystem`], backed by an
//! in-memory disk image that is read from and written back to a plain
//! file on disk between invocations.
//!
//! It exists so a human can poke at the engine directly: `format`, `ls`,
//! `cat`, `mkdir`, `touch`, `write`, `rm`.

use std::fs::OpenOptions;
use std::io::{Read as _, Write as _};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sectorfs::block_device::MemoryDisk;
use sectorfs::layout::SECTOR_SIZE;
use sectorfs::{BlockDevice, FileSystem};

/// Total sectors in a freshly formatted image: generous enough to run a
/// max-size file without exhausting the allocator.
const DEFAULT_SECTOR_COUNT: u32 = 20_000;

#[derive(Parser)]
#[command(name = "sectorfs-shell", about = "Inspect and drive a sectorfs image")]
struct Cli {
    /// Path to the disk image file.
    #[arg(long, default_value = "sectorfs.img")]
    image: PathBuf,

    /// Format the image before running the command.
    #[arg(long)]
    format: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lists the entries of a directory.
    Ls { path: Option<String> },
    /// Prints a file's contents to stdout.
    Cat { path: String },
    /// Creates an empty file.
    Touch { path: String },
    /// Creates a directory.
    Mkdir { path: String },
    /// Removes a file or empty directory.
    Rm { path: String },
    /// Writes stdin into a file, creating it if necessary.
    Write { path: String },
}

fn load_image(path: &PathBuf, format: bool) -> (Box<dyn BlockDevice>, bool) {
    if format || !path.exists() {
        return (Box::new(MemoryDisk::new(DEFAULT_SECTOR_COUNT)), true);
    }
    let mut bytes = Vec::new();
    OpenOptions::new()
        .read(true)
        .open(path)
        .expect("failed to open disk image")
        .read_to_end(&mut bytes)
        .expect("failed to read disk image");
    let sectors = (bytes.len() / SECTOR_SIZE) as u32;
    let mut disk = MemoryDisk::new(sectors);
    let mut buf = [0u8; SECTOR_SIZE];
    for s in 0..sectors {
        buf.copy_from_slice(&bytes[(s as usize) * SECTOR_SIZE..(s as usize + 1) * SECTOR_SIZE]);
        disk.write_sector(s, &buf);
    }
    (Box::new(disk), false)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let (disk, just_formatted) = load_image(&cli.image, cli.format);
    let fs = FileSystem::mount(disk, just_formatted);
    let mut proc = fs.new_process();

    match cli.command {
        Command::Ls { path } => {
            let path = path.unwrap_or_else(|| ".".to_string());
            let fd = fs.open(&mut proc, &path);
            if fd < 0 {
                eprintln!("ls: {path}: no such file or directory");
                std::process::exit(1);
            }
            if !fs.isdir(&proc, fd) {
                eprintln!("ls: {path}: not a directory");
                std::process::exit(1);
            }
            while let Some(name) = fs.readdir(&mut proc, fd) {
                println!("{name}");
            }
            fs.close(&mut proc, fd);
        }
        Command::Cat { path } => {
            let fd = fs.open(&mut proc, &path);
            if fd < 0 {
                eprintln!("cat: {path}: no such file or directory");
                std::process::exit(1);
            }
            let mut out = std::io::stdout();
            let mut buf = [0u8; SECTOR_SIZE];
            loop {
                let n = fs.read(&mut proc, fd, &mut buf);
                if n <= 0 {
                    break;
                }
                out.write_all(&buf[..n as usize]).expect("stdout write failed");
            }
            fs.close(&mut proc, fd);
        }
        Command::Touch { path } => {
            if !fs.create(&proc, &path, 0) {
                eprintln!("touch: {path}: could not create");
                std::process::exit(1);
            }
        }
        Command::Mkdir { path } => {
            if !fs.mkdir(&proc, &path) {
                eprintln!("mkdir: {path}: could not create");
                std::process::exit(1);
            }
        }
        Command::Rm { path } => {
            if !fs.remove(&proc, &path) {
                eprintln!("rm: {path}: could not remove");
                std::process::exit(1);
            }
        }
        Command::Write { path } => {
            if fs.open(&mut proc, &path) < 0 {
                fs.create(&proc, &path, 0);
            }
            let fd = fs.open(&mut proc, &path);
            let mut input = Vec::new();
            std::io::stdin().read_to_end(&mut input).expect("stdin read failed");
            let n = fs.write(&mut proc, fd, &input);
            if (n as usize) < input.len() {
                eprintln!("write: short write ({n} of {} bytes)", input.len());
            }
            fs.close(&mut proc, fd);
        }
    }

    fs.drop_process(&mut proc);
    fs.shutdown();
    std::fs::write(&cli.image, fs.snapshot()).expect("failed to write disk image");
}
