use std::{
    fmt::{self, Display, Formatter},
    mem::MaybeUninit,
    str::FromStr,
    thread,
    time::{Duration, Instant},
};

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::{
    alloc::{Allocator, Primitive},
    fill::FillPolicy,
};

/// Pause after the allocator refused a request, before the same request is made again.
pub(crate) const BACKOFF: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
pub(crate) enum IntervalError {
    #[error("invalid interval {0:?}. expected milliseconds or a duration such as 250ms")]
    Invalid(String, #[source] humantime::DurationError),
}

/// Delay between two successful allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interval {
    Every(Duration),
    /// Stop after the first successful allocation.
    Park,
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(millis) = s.parse::<i64>() {
            return Ok(match u64::try_from(millis) {
                Ok(millis) => Interval::Every(Duration::from_millis(millis)),
                Err(_) => Interval::Park,
            });
        }
        let parsed = match s.strip_prefix('-') {
            Some(negative) => humantime::parse_duration(negative).map(|_| Interval::Park),
            None => humantime::parse_duration(s).map(Interval::Every),
        };
        parsed.map_err(|err| IntervalError::Invalid(s.to_string(), err))
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Every(duration) => write!(f, "{}", humantime::format_duration(*duration)),
            Interval::Park => write!(f, "park"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub fill: FillPolicy,
    pub size: usize,
    pub increment: usize,
    pub primitive: Primitive,
    pub count: Option<u64>,
    pub interval: Interval,
    pub seed: Option<u64>,
}

impl Config {
    /// Size requested by the allocation with 1-based `index`, None if it is not representable.
    pub(crate) fn size_of(&self, index: u64) -> Option<usize> {
        let steps = usize::try_from(index.checked_sub(1)?).ok()?;
        self.increment.checked_mul(steps)?.checked_add(self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParkReason {
    CountReached,
    NegativeInterval,
    SizeOverflow,
}

impl Display for ParkReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParkReason::CountReached => write!(f, "allocation count reached"),
            ParkReason::NegativeInterval => write!(f, "negative interval"),
            ParkReason::SizeOverflow => write!(f, "allocation size overflow"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Running,
    Parked(ParkReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Allocation {
    pub index: u64,
    pub size: usize,
    pub address: usize,
    /// Signed distance to the previous successful allocation, previous minus current.
    pub distance: Option<isize>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Allocated(Allocation),
    Failed { index: u64, size: usize },
    Parked(ParkReason),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stats {
    pub allocations: u64,
    pub failures: u64,
    pub total: u64,
    pub last_address: Option<usize>,
}

pub(crate) trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default)]
pub(crate) struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub(crate) fn park_forever() -> ! {
    loop {
        // park may return spuriously
        thread::park();
    }
}

#[derive(Debug)]
pub(crate) struct Driver<A: Allocator, S: Sleeper> {
    cfg: Config,
    allocator: A,
    sleeper: S,
    rng: StdRng,
    state: State,
    stats: Stats,
}

impl<A: Allocator, S: Sleeper> Driver<A, S> {
    pub(crate) fn new(cfg: Config, allocator: A, sleeper: S) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Driver {
            cfg,
            allocator,
            sleeper,
            rng,
            state: State::Running,
            stats: Stats::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> State {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Allocates until parked. Never returns, the process has to be killed.
    pub(crate) fn run(&mut self) -> ! {
        while self.state == State::Running {
            match self.step() {
                Step::Allocated(allocation) => debug!(
                    index = allocation.index,
                    size = allocation.size,
                    address = allocation.address,
                    distance = ?allocation.distance,
                    total = allocation.total,
                    "allocated"
                ),
                Step::Failed { index, size } => debug!(index, size, "refused"),
                Step::Parked(_) => {}
            }
        }
        park_forever()
    }

    /// Performs one iteration: allocate, report, fill and pace.
    /// A refused allocation keeps the index so the next step retries the same size.
    pub(crate) fn step(&mut self) -> Step {
        if let State::Parked(reason) = self.state {
            return Step::Parked(reason);
        }
        let index = self.stats.allocations + 1;
        let Some(size) = self.cfg.size_of(index) else {
            error!(
                "{}) size {} + {} * {} is not representable",
                index,
                self.cfg.size,
                self.cfg.increment,
                index - 1
            );
            self.park(ParkReason::SizeOverflow);
            return Step::Parked(ParkReason::SizeOverflow);
        };

        info!("{}) trying to allocate {} with {}", index, size, self.cfg.primitive);
        let Some(block) = self.allocator.allocate(size, self.cfg.primitive) else {
            self.stats.failures += 1;
            warn!(
                "out of memory, sleeping for {}, then trying again",
                humantime::format_duration(BACKOFF)
            );
            self.sleeper.sleep(BACKOFF);
            return Step::Failed { index, size };
        };

        let address = block.as_ptr() as *mut u8 as usize;
        let distance = self
            .stats
            .last_address
            .map(|last| (last as isize).wrapping_sub(address as isize));
        self.stats.allocations = index;
        self.stats.total = self.stats.total.saturating_add(size as u64);
        self.stats.last_address = Some(address);
        info!(
            "allocation successful, new total memory: {} at {:#x}",
            self.stats.total, address
        );
        if let Some(distance) = distance {
            info!("distance to last allocation {}", distance);
        }

        if !self.cfg.fill.is_none() {
            info!("filling memory with {}", self.cfg.fill);
            let start = Instant::now();
            // block is exclusively ours until the next allocate call, fill only writes
            let bytes: &mut [MaybeUninit<u8>] = unsafe { &mut *block.as_ptr() };
            self.cfg.fill.apply(bytes, &mut self.rng);
            debug!("filled {} bytes in {:?}", size, start.elapsed());
        }

        match self.pace() {
            Some(reason) => self.park(reason),
            None => {
                if let Interval::Every(delay) = self.cfg.interval {
                    self.sleeper.sleep(delay);
                }
            }
        }
        Step::Allocated(Allocation {
            index,
            size,
            address,
            distance,
            total: self.stats.total,
        })
    }

    fn pace(&self) -> Option<ParkReason> {
        if self.cfg.interval == Interval::Park {
            Some(ParkReason::NegativeInterval)
        } else if self.cfg.count.is_some_and(|count| self.stats.allocations >= count) {
            Some(ParkReason::CountReached)
        } else {
            None
        }
    }

    fn park(&mut self, reason: ParkReason) {
        info!(
            "going to sleep forever ({}), {} allocations with {} bytes in total, {} refused requests",
            reason, self.stats.allocations, self.stats.total, self.stats.failures
        );
        self.state = State::Parked(reason);
    }

    #[cfg(test)]
    fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }

    #[cfg(test)]
    fn allocator(&self) -> &A {
        &self.allocator
    }

    #[cfg(test)]
    fn sleeper(&self) -> &S {
        &self.sleeper
    }
}
