// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI frontend: one multi-call binary unifying the four original
//! `xfsr-*` tools (`ls`, `dump`, `dirfind`, `rawsearch`) behind a single
//! `clap`-derived argument parser. Everything here is wiring: open the
//! device, load the superblock, convert ino/iadr, dispatch to the
//! library, and map the result to a process exit code.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use log::{error, info};

use xfsr::device::Device;
use xfsr::error::Error;
use xfsr::filter::Filter;
use xfsr::geometry::{Iadr, Ino};
use xfsr::superblock::Superblock;
use xfsr::traverse::{self, ExtractOptions, ListOptions};
use xfsr::{dump, scan};

#[derive(Parser)]
#[command(name = "xfsr", version, about = "Forensic/recovery toolkit for damaged XFS filesystems")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory at a given ino/iadr.
    Ls(LsArgs),
    /// Dump a regular file or symlink at a given ino/iadr.
    Dump(DumpArgs),
    /// Sweep inode-sized slots for directory inodes.
    Dirfind(DirfindArgs),
    /// Search the device for a raw byte pattern.
    Rawsearch(RawsearchArgs),
}

#[derive(Args)]
#[command(group(ArgGroup::new("addr").required(true).args(["ino", "iadr"])))]
struct LsArgs {
    device: PathBuf,
    #[arg(short = 'N', long)]
    ino: Option<u64>,
    #[arg(short = 'A', long)]
    iadr: Option<u64>,
    #[arg(short = 'R', long, default_value_t = 0)]
    recurse: u32,
    #[arg(short = 'm', long)]
    minimal: bool,
    #[arg(short = 'H', long, help = "hide dotfiles (shown by default)")]
    hide_hidden: bool,
    #[arg(short = 'P', long)]
    pattern: Option<String>,
    #[arg(short = 'i', long)]
    case_insensitive: bool,
    #[arg(short = 'D', long, value_name = "DIR")]
    dump: Option<PathBuf>,
    #[arg(short = 'p', long)]
    preserve: bool,
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'L', long)]
    log_file: Option<PathBuf>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("addr").required(true).args(["ino", "iadr"])))]
struct DumpArgs {
    device: PathBuf,
    #[arg(short = 'N', long)]
    ino: Option<u64>,
    #[arg(short = 'A', long)]
    iadr: Option<u64>,
    #[arg(short = 'o', long)]
    out: PathBuf,
    #[arg(short = 'p', long)]
    preserve: bool,
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'L', long)]
    log_file: Option<PathBuf>,
}

#[derive(Args)]
struct DirfindArgs {
    device: PathBuf,
    #[arg(short = 'I', long, default_value_t = 0)]
    start_ino: u64,
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args)]
struct RawsearchArgs {
    device: PathBuf,
    /// A hex byte string (e.g. "7a4453"), or a literal string prefixed with 's'.
    needle: String,
    /// Number of fixed-size blocks to skip before searching.
    skip_blocks: Option<u64>,
}

fn init_logging(verbose: u8, log_file: Option<&PathBuf>) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Some(path) = log_file {
        if let Ok(file) = File::create(path) {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        } else {
            eprintln!("warning: could not open log file {}; logging to stderr", path.display());
        }
    }
    builder.init();
}

/// Maps each error kind to a distinct, stable, nonzero exit code.
fn exit_code_for(err: &Error) -> i32 {
    match err {
        Error::BadSuperblock => 2,
        Error::InvalidInode { .. } => 3,
        Error::NotADirectory { .. } => 4,
        Error::NotRegularOrSymlink { .. } => 5,
        Error::CorruptDirectory { .. } => 6,
        Error::InvalidExtentList { .. } => 7,
        Error::Unsupported(_) => 8,
        Error::ShortRead { .. } => 9,
        Error::WriteFailed { .. } => 10,
        Error::IoError(_) => 11,
    }
}

fn fail(err: Error) -> ! {
    error!("{err}");
    std::process::exit(exit_code_for(&err));
}

fn resolve_addr(geo: &xfsr::Geometry, ino: Option<u64>, iadr: Option<u64>) -> Iadr {
    match (ino, iadr) {
        (_, Some(iadr)) => Iadr(iadr),
        (Some(ino), None) => geo.ino_to_iadr(Ino(ino)),
        (None, None) => unreachable!("clap ArgGroup guarantees one of ino/iadr is set"),
    }
}

fn open_device(path: &PathBuf) -> (Device<File>, xfsr::Geometry) {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => fail(Error::IoError(e)),
    };
    let device = Device::new(file);
    let sb = match Superblock::read(&device) {
        Ok(sb) => sb,
        Err(e) => fail(e),
    };
    info!("loaded superblock: block_size={} inode_size={} agblocks={}", sb.geometry.block_size, sb.geometry.inode_size, sb.geometry.agblocks);
    (device, sb.geometry)
}

fn run_ls(args: LsArgs) {
    init_logging(args.verbose, args.log_file.as_ref());
    let (device, geo) = open_device(&args.device);
    let iadr = resolve_addr(&geo, args.ino, args.iadr);

    let filter = match Filter::new(args.pattern.as_deref(), args.case_insensitive, !args.hide_hidden) {
        Ok(f) => f,
        Err(e) => fail(e),
    };
    let opts = ListOptions { depth_cap: args.recurse, minimal: args.minimal, filter: &filter };

    let extract = args.dump.as_ref().map(|root| ExtractOptions { root: root.as_path(), preserve: args.preserve });
    if let Some(root) = &args.dump {
        if let Err(e) = std::fs::create_dir_all(root) {
            fail(Error::IoError(e));
        }
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = traverse::traverse(&device, &geo, iadr, &opts, &mut out, extract.as_ref()) {
        fail(e);
    }
    let _ = out.flush();
}

fn run_dump(args: DumpArgs) {
    init_logging(args.verbose, args.log_file.as_ref());
    let (device, geo) = open_device(&args.device);
    let iadr = resolve_addr(&geo, args.ino, args.iadr);

    match dump::dump(&device, &geo, iadr, &args.out) {
        Ok(written) => info!("dumped {written} bytes to {}", args.out.display()),
        Err(e) => fail(e),
    }
    if args.preserve {
        if let Ok(inode) = xfsr::inode::read_inode(&device, &geo, iadr) {
            xfsr::restore::restore_stats(&args.out, &inode);
        }
    }
}

fn run_dirfind(args: DirfindArgs) {
    init_logging(args.verbose, None);
    let (device, geo) = open_device(&args.device);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for ino in scan::dirfind(&device, &geo, args.start_ino) {
        let _ = writeln!(out, "0x{ino:x}");
    }
}

fn run_rawsearch(args: RawsearchArgs) {
    init_logging(0, None);
    let needle = parse_needle(&args.needle);
    let file = match File::open(&args.device) {
        Ok(f) => f,
        Err(e) => fail(Error::IoError(e)),
    };
    let device = Device::new(file);
    match scan::rawsearch(&device, &needle, args.skip_blocks.unwrap_or(0)) {
        Ok(matches) => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for m in &matches {
                let _ = writeln!(out, "{}:{}", m.block, m.offset_in_block);
            }
            info!("found {} matches", matches.len());
        }
        Err(e) => fail(Error::IoError(e)),
    }
}

/// Decodes a needle argument: `s`-prefixed means a literal string;
/// otherwise it is a string of hex byte pairs (e.g. "7a4453").
fn parse_needle(arg: &str) -> Vec<u8> {
    if let Some(literal) = arg.strip_prefix('s') {
        return literal.as_bytes().to_vec();
    }
    let mut bytes = Vec::with_capacity(arg.len() / 2);
    let chars: Vec<char> = arg.chars().collect();
    for pair in chars.chunks(2) {
        if pair.len() != 2 {
            eprintln!("invalid hexadecimal search string '{arg}'");
            std::process::exit(1);
        }
        let hi = pair[0].to_digit(16);
        let lo = pair[1].to_digit(16);
        match (hi, lo) {
            (Some(hi), Some(lo)) => bytes.push((hi * 16 + lo) as u8),
            _ => {
                eprintln!("invalid hexadecimal character in '{arg}'");
                std::process::exit(1);
            }
        }
    }
    bytes
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::Ls(args) => run_ls(args),
        Command::Dump(args) => run_dump(args),
        Command::Dirfind(args) => run_dirfind(args),
        Command::Rawsearch(args) => run_rawsearch(args),
    }
}
