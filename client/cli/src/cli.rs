//! Command-line surface: login/mount entry points plus the cache-management
//! tool verbatim from spec §6 (`list, stats, clear, pin, unpin, pinned,
//! evict, prefetch, json`), generalized from the teacher's `clap` derive
//! `Commands` enum shape (`main.rs`'s `Setup`/`Start`/`Down`/... variants).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "driftbox")]
#[command(about = "Driftbox on-demand file sync client", long_about = None)]
pub struct Cli {
    /// Override the cache directory (default: platform cache dir).
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Soft cache size budget in bytes; unpinned entries are evicted LRU-first
    /// above this, pinned entries are never evicted.
    #[arg(long, global = true)]
    pub budget: Option<u64>,

    /// Override the configured server URL.
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and save a bearer token to the config file.
    Login {
        #[arg(long)]
        username: Option<String>,
    },
    /// Log out and discard the stored token.
    Logout,
    /// Mount the remote tree at a local path (Linux only).
    Mount {
        mountpoint: PathBuf,
    },
    /// List cached objects.
    List,
    /// Show cache entry count and size totals.
    Stats,
    /// Evict every unpinned cache entry.
    Clear,
    /// Pin a cache entry by remote path so it survives eviction.
    Pin {
        id: String,
    },
    /// Unpin a previously pinned entry.
    Unpin {
        id: String,
    },
    /// List pinned entries.
    Pinned,
    /// Evict a single unpinned entry by remote path.
    Evict {
        id: String,
    },
    /// Hydrate files matching a glob, a path prefix, or "all" into the cache.
    Prefetch {
        pattern: String,

        /// How many files to hydrate concurrently.
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Pin every file this prefetch hydrates.
        #[arg(long)]
        pin_after_prefetch: bool,
    },
    /// Dump the cache index as JSON.
    Json,
}
