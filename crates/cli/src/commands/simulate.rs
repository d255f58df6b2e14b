use blockttl::{
    Cache, CacheBuilder, CacheSettings, CacheStatistics, Clock, ManualClock, ManualScheduler,
    TimerCache,
};
use clap::{Args, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Entries share one reclamation task per block
    Blocked,
    /// One removal task per key
    Timer,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of inserts to perform
    #[arg(short = 'n', long, default_value = "100000")]
    entries: u64,

    /// Distinct keys to cycle through (defaults to one per insert)
    #[arg(long)]
    keys: Option<u64>,

    /// Exclusive upper bound on entry lifetimes, overriding the environment
    #[arg(long)]
    max_life_ms: Option<u64>,

    /// Block width, overriding the environment
    #[arg(long)]
    block_width: Option<u32>,

    /// Virtual time between consecutive inserts
    #[arg(long, default_value = "1")]
    step_ms: u64,

    #[arg(long, value_enum, default_value = "blocked")]
    variant: Variant,

    /// Seed for lifetime selection
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Log progress every this many inserts (0 disables)
    #[arg(long, default_value = "10000")]
    report_every: u64,
}

/// Outcome of one simulation run
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub variant: Variant,
    pub settings: CacheSettings,
    pub entries: u64,
    pub virtual_ms: u64,
    /// Most reclamation or removal tasks outstanding at once
    pub peak_tasks: usize,
    /// Most entries held at once, expired ones included
    pub peak_resident: usize,
    pub live_keys_at_end: usize,
    pub tasks_after_drain: usize,
    pub resident_after_drain: usize,
    pub stats: CacheStatistics,
}

enum SimCache {
    Blocked(Cache<u64, u64>),
    Timer(TimerCache<u64, u64>),
}

impl SimCache {
    fn add(&self, key: u64, value: u64, lifetime: Duration) -> blockttl::Result<()> {
        match self {
            SimCache::Blocked(cache) => cache.add(key, value, lifetime),
            SimCache::Timer(cache) => cache.add(key, value, lifetime),
        }
    }

    fn contains(&self, key: u64) -> blockttl::Result<bool> {
        match self {
            SimCache::Blocked(cache) => cache.contains(&key),
            SimCache::Timer(cache) => cache.get(&key).map(|value| value.is_some()),
        }
    }

    fn resident(&self) -> blockttl::Result<usize> {
        match self {
            SimCache::Blocked(cache) => cache.size(),
            SimCache::Timer(cache) => cache.len(),
        }
    }

    fn statistics(&self) -> CacheStatistics {
        match self {
            SimCache::Blocked(cache) => cache.statistics(),
            SimCache::Timer(cache) => cache.statistics(),
        }
    }

    fn destroy(&self) {
        match self {
            SimCache::Blocked(cache) => cache.destroy(),
            SimCache::Timer(cache) => cache.destroy(),
        }
    }
}

fn resolve_settings(args: &SimulateArgs) -> eyre::Result<CacheSettings> {
    let mut settings = CacheSettings::from_env()?;
    if let Some(max_life_ms) = args.max_life_ms {
        settings.max_entry_life_ms = max_life_ms;
    }
    if let Some(block_width) = args.block_width {
        settings.block_width = block_width;
    }
    settings.validate()?;

    if settings.max_entry_life_ms < 2 {
        eyre::bail!("max entry life of 1ms admits no lifetime");
    }
    Ok(settings)
}

/// Runs the simulation entirely on virtual time
pub fn run(args: &SimulateArgs) -> eyre::Result<SimulationReport> {
    let settings = resolve_settings(args)?;
    let keys = args.keys.unwrap_or(args.entries).max(1);

    let clock = Arc::new(ManualClock::new(0));
    let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
    let builder = CacheBuilder::from_settings(&settings)
        .with_clock(clock.clone())
        .with_scheduler(scheduler.clone());
    let cache = match args.variant {
        Variant::Blocked => SimCache::Blocked(builder.build()?),
        Variant::Timer => SimCache::Timer(builder.build_timer()?),
    };

    tracing::info!(
        variant = ?args.variant,
        entries = args.entries,
        keys,
        max_entry_life_ms = settings.max_entry_life_ms,
        block_width = settings.block_width,
        step_ms = args.step_ms,
        "starting simulation"
    );

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut peak_tasks = 0;
    let mut peak_resident = 0;

    for i in 0..args.entries {
        if i > 0 {
            scheduler.advance(Duration::from_millis(args.step_ms));
        }

        let lifetime = rng.gen_range(1..settings.max_entry_life_ms);
        cache.add(i % keys, i, Duration::from_millis(lifetime))?;

        peak_tasks = peak_tasks.max(scheduler.pending());
        peak_resident = peak_resident.max(cache.resident()?);

        if args.report_every > 0 && (i + 1) % args.report_every == 0 {
            tracing::info!(
                inserted = i + 1,
                now_ms = clock.now_millis(),
                tasks = scheduler.pending(),
                resident = cache.resident()?,
                "progress"
            );
        }
    }

    let virtual_ms = clock.now_millis();
    let mut live_keys_at_end = 0;
    for key in 0..keys.min(args.entries) {
        if cache.contains(key)? {
            live_keys_at_end += 1;
        }
    }

    // Everything inserted so far is due within one block span
    let drain_ms = settings.block_span_ms().unwrap_or(settings.max_entry_life_ms);
    scheduler.advance(Duration::from_millis(drain_ms));

    let report = SimulationReport {
        variant: args.variant,
        settings,
        entries: args.entries,
        virtual_ms,
        peak_tasks,
        peak_resident,
        live_keys_at_end,
        tasks_after_drain: scheduler.pending(),
        resident_after_drain: cache.resident()?,
        stats: cache.statistics(),
    };
    cache.destroy();

    Ok(report)
}

pub fn execute(args: SimulateArgs) -> eyre::Result<()> {
    let report = run(&args)?;
    tracing::info!(
        peak_tasks = report.peak_tasks,
        peak_resident = report.peak_resident,
        "simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
