use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::{
    alloc::{Primitive, SystemAllocator},
    driver::{Config, Driver, Interval, ThreadSleeper},
    fill::FillPolicy,
    layout::Layout,
    pattern::Pattern,
    units::ByteSize,
};

mod alloc;
mod driver;
mod fill;
mod identity;
mod layout;
mod pattern;
mod units;

const DEFAULT_SIZE: ByteSize = ByteSize::new(1 << 20);
const UNBOUNDED: i64 = -1;

fn parse_count(s: &str) -> Result<i64, String> {
    match s.trim().parse::<i64>() {
        Ok(count) if count == UNBOUNDED || count >= 1 => Ok(count),
        Ok(count) => Err(format!("count must be at least 1 or {} for no limit, got {}", UNBOUNDED, count)),
        Err(err) => Err(format!("count {:?}: {}", s, err)),
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about = "A program to experiment with memory allocation")]
struct Opt {
    #[clap(short, long, default_value_t = false, help = "produce verbose output")]
    verbose: bool,

    #[clap(
        short,
        long,
        default_value_t = false,
        conflicts_with_all = ["pattern_fill", "random_fill"],
        help = "fill allocated memory with data (de ad be ef)"
    )]
    fill: bool,

    #[clap(
        short = 'F',
        long,
        value_name = "BYTESEQ",
        conflicts_with = "random_fill",
        help = "fill allocated memory with the given pattern (hex)"
    )]
    pattern_fill: Option<Pattern>,

    #[clap(short, long, default_value_t = false, help = "fill allocated memory with random data")]
    random_fill: bool,

    #[clap(long, help = "seed for --random-fill. random data is different on every run if not set")]
    seed: Option<u64>,

    #[clap(short = 'C', long, default_value_t = false, help = "use calloc() instead of malloc()")]
    calloc: bool,

    #[clap(
        short,
        long,
        value_name = "MSEC",
        default_value = "1000",
        allow_hyphen_values = true,
        help = "time in milliseconds (or a duration such as 250ms) between allocations.
negative value stops after the first allocation"
    )]
    interval: Interval,

    #[clap(
        short,
        long,
        value_name = "NUM",
        default_value_t = UNBOUNDED,
        allow_hyphen_values = true,
        value_parser = parse_count,
        help = "limit number of memory allocations to NUM, then sleep forever. -1 allocates without limit"
    )]
    count: i64,

    #[clap(
        short = 'I',
        long,
        value_name = "BYTES",
        default_value = "0",
        help = "increase allocation size by BYTES on each step. accepts K, Ki, KiB (1024) and kB (1000) suffixes"
    )]
    increment: ByteSize,

    #[clap(
        short,
        long,
        value_name = "BYTES",
        default_value_t = DEFAULT_SIZE,
        help = "bytes to allocate on each step. accepts K, Ki, KiB (1024) and kB (1000) suffixes"
    )]
    size: ByteSize,

    #[clap(
        short,
        long,
        help = "process name shown by ps and in /proc/<pid>/comm. the program is executed again to change it"
    )]
    name: Option<String>,
}

impl Opt {
    fn fill(&self) -> FillPolicy {
        if self.fill {
            FillPolicy::Constant
        } else if let Some(pattern) = &self.pattern_fill {
            FillPolicy::Custom(pattern.clone())
        } else if self.random_fill {
            FillPolicy::Random
        } else {
            FillPolicy::None
        }
    }

    fn config(&self) -> Result<Config> {
        Ok(Config {
            fill: self.fill(),
            size: usize::try_from(self.size.bytes()).with_context(|| format!("size {} is not addressable", self.size))?,
            increment: usize::try_from(self.increment.bytes())
                .with_context(|| format!("increment {} is not addressable", self.increment))?,
            primitive: if self.calloc {
                Primitive::Calloc
            } else {
                Primitive::Malloc
            },
            count: u64::try_from(self.count).ok(),
            interval: self.interval,
            seed: self.seed,
        })
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let default_level = if opt.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_ansi(io::stdout().is_terminal())
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();

    if let Some(name) = &opt.name {
        identity::rename(name).with_context(|| format!("rename process to {}", name))?;
    }

    let cfg = opt.config()?;
    debug!("running with {:?}", cfg);

    Layout::current().report();
    info!(
        "mallocer is going to allocate {} bytes every {}, growing by {}",
        cfg.size, cfg.interval, cfg.increment
    );

    Driver::new(cfg, SystemAllocator, ThreadSleeper).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Opt, clap::Error> {
        Opt::try_parse_from(std::iter::once("mallocer").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cfg = parse(&[]).unwrap().config().unwrap();
        assert_eq!(cfg.size, 1 << 20);
        assert_eq!(cfg.increment, 0);
        assert_eq!(cfg.fill, FillPolicy::None);
        assert_eq!(cfg.primitive, Primitive::Malloc);
        assert_eq!(cfg.count, None);
        assert_eq!(cfg.interval, Interval::Every(std::time::Duration::from_secs(1)));
    }

    #[test]
    fn test_all_options() {
        let opt = parse(&[
            "-v", "-C", "-i", "250ms", "-c", "5", "-I", "4K", "-s", "4kB", "-F", "0102", "--seed", "9", "-n", "hog",
        ])
        .unwrap();
        assert!(opt.verbose);
        assert_eq!(opt.name.as_deref(), Some("hog"));
        let cfg = opt.config().unwrap();
        assert_eq!(cfg.size, 4000);
        assert_eq!(cfg.increment, 4096);
        assert_eq!(cfg.fill, FillPolicy::Custom("0102".parse().unwrap()));
        assert_eq!(cfg.primitive, Primitive::Calloc);
        assert_eq!(cfg.count, Some(5));
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.interval, Interval::Every(std::time::Duration::from_millis(250)));
    }

    #[test]
    fn test_negative_interval() {
        let cfg = parse(&["--interval", "-1"]).unwrap().config().unwrap();
        assert_eq!(cfg.interval, Interval::Park);
        let cfg = parse(&["-i", "-1"]).unwrap().config().unwrap();
        assert_eq!(cfg.interval, Interval::Park);
    }

    #[test]
    fn test_unbounded_count() {
        assert_eq!(parse(&["-c", "-1"]).unwrap().config().unwrap().count, None);
        assert_eq!(parse(&["--count", "-1"]).unwrap().config().unwrap().count, None);
        assert_eq!(parse(&["--count", "1"]).unwrap().config().unwrap().count, Some(1));
    }

    #[test]
    fn test_fill_flags() {
        assert_eq!(parse(&["-f"]).unwrap().fill(), FillPolicy::Constant);
        assert_eq!(parse(&["-r"]).unwrap().fill(), FillPolicy::Random);
        assert!(parse(&["-f", "-r"]).is_err());
        assert!(parse(&["-f", "-F", "00"]).is_err());
        assert!(parse(&["-r", "-F", "00"]).is_err());
    }

    #[test]
    fn test_invalid_input() {
        assert!(parse(&["-F", "abc"]).is_err());
        assert!(parse(&["-F", "zz"]).is_err());
        assert!(parse(&["-s", "4X"]).is_err());
        assert!(parse(&["-I", "many"]).is_err());
        assert!(parse(&["-c", "0"]).is_err());
        assert!(parse(&["-c", "-2"]).is_err());
        assert!(parse(&["-c", "many"]).is_err());
        assert!(parse(&["-i", "soon"]).is_err());
    }
}
