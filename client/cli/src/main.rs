use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod cli;
mod config;
mod core;
mod hydrate;
mod mount;
mod range;
mod sse;
mod sync;
mod tree;

use cli::{Cli, Commands};
use config::Config;
use core::ClientCore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "driftbox=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    if let Some(server) = &cli.server {
        config.server_url = Some(server.clone());
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.to_string_lossy().into_owned());
    }
    if cli.budget.is_some() {
        config.cache_budget_bytes = cli.budget;
    }

    match cli.command {
        Commands::Login { username } => login(&mut config, username).await,
        Commands::Logout => logout(&mut config),
        Commands::Mount { mountpoint } => mount_cmd(&config, mountpoint).await,
        Commands::List => cache_cmd(&config, |cache| {
            for entry in cache.list()? {
                let pin = if entry.pinned { "*" } else { " " };
                println!("{pin} {:>10}  {}", entry.size, entry.path);
            }
            Ok(())
        }),
        Commands::Stats => cache_cmd(&config, |cache| {
            let (count, total, unpinned) = cache.stats()?;
            println!("entries: {count}");
            println!("total size: {total} bytes");
            println!("unpinned size: {unpinned} bytes");
            Ok(())
        }),
        Commands::Clear => cache_cmd(&config, |cache| {
            let evicted = cache.clear()?;
            println!("evicted {evicted} entries");
            Ok(())
        }),
        Commands::Pin { id } => cache_cmd(&config, move |cache| {
            if cache.pin(&id)? {
                println!("pinned {id}");
            } else {
                println!("not cached: {id}");
            }
            Ok(())
        }),
        Commands::Unpin { id } => cache_cmd(&config, move |cache| {
            if cache.unpin(&id)? {
                println!("unpinned {id}");
            } else {
                println!("not cached: {id}");
            }
            Ok(())
        }),
        Commands::Pinned => cache_cmd(&config, |cache| {
            for entry in cache.pinned()? {
                println!("{:>10}  {}", entry.size, entry.path);
            }
            Ok(())
        }),
        Commands::Evict { id } => cache_cmd(&config, move |cache| {
            if cache.evict_one(&id)? {
                println!("evicted {id}");
            } else {
                println!("not cached (or pinned): {id}");
            }
            Ok(())
        }),
        Commands::Json => cache_cmd(&config, |cache| {
            let entries = cache.list()?;
            println!("{}", serde_json::to_string_pretty(&entries.iter().map(|e| {
                serde_json::json!({
                    "id": e.id,
                    "path": e.path,
                    "size": e.size,
                    "pinned": e.pinned,
                    "last_access": e.last_access,
                })
            }).collect::<Vec<_>>())?);
            Ok(())
        }),
        Commands::Prefetch { pattern, concurrency, pin_after_prefetch } => {
            prefetch(&config, &pattern, concurrency, pin_after_prefetch).await
        }
    }
}

fn cache_cmd(config: &Config, f: impl FnOnce(&cache::Cache) -> anyhow::Result<()>) -> anyhow::Result<()> {
    let dir = config.cache_dir_or_default()?;
    let cache = cache::Cache::open(&dir)?;
    f(&cache)
}

async fn login(config: &mut Config, username: Option<String>) -> anyhow::Result<()> {
    let server = config.require_server()?.to_string();
    let username = match username {
        Some(u) => u,
        None => {
            use std::io::Write;
            print!("username: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    let password = rpassword::prompt_password("password: ")?;

    let client = api::ApiClient::new(&server);
    let token = client.login(&username, &password).await?;

    config.access_token = Some(token.access_token);
    config.refresh_token = Some(token.refresh_token);
    config.username = Some(username);
    config.save()?;

    println!("logged in");
    Ok(())
}

/// Per spec §7: a `401` clears the stored token and forces re-login. Reloads
/// and re-saves rather than mutating the caller's in-memory `Config`, since
/// background loops only raise [`ClientCore::is_unauthorized`] after the
/// command's own `config` was already read.
fn clear_stored_token() -> anyhow::Result<()> {
    let mut disk = Config::load()?;
    disk.access_token = None;
    disk.refresh_token = None;
    disk.save()?;
    eprintln!("token rejected by server; run `driftbox login` again");
    Ok(())
}

fn logout(config: &mut Config) -> anyhow::Result<()> {
    config.access_token = None;
    config.refresh_token = None;
    config.save()?;
    println!("logged out");
    Ok(())
}

async fn bootstrap(config: &Config) -> anyhow::Result<Arc<ClientCore>> {
    let server = config.require_server()?;
    let token = config.require_auth()?.to_string();
    let cache_dir = config.cache_dir_or_default()?;
    ClientCore::connect(server, token, cache_dir, config.cache_budget_bytes).await
}

async fn mount_cmd(config: &Config, mountpoint: PathBuf) -> anyhow::Result<()> {
    let core = bootstrap(config).await?;
    let mut loops = sync::start_all(&core);
    let core_for_mount = core.clone();

    let result = tokio::task::spawn_blocking(move || mount::mount(core_for_mount, &mountpoint)).await?;

    loops.stop_all();
    if core.is_unauthorized() {
        clear_stored_token()?;
    }
    result
}

async fn prefetch(config: &Config, pattern: &str, concurrency: usize, pin_after: bool) -> anyhow::Result<()> {
    let core = bootstrap(config).await?;
    let root = core.tree().root().await;

    let mut matches = Vec::new();
    collect_matching(&root, pattern, &mut matches);

    if matches.is_empty() {
        println!("no files match {pattern}");
        return Ok(());
    }

    let progress = indicatif::ProgressBar::new(matches.len() as u64);
    progress.set_style(
        indicatif::ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar()),
    );

    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::new();

    for path in matches {
        let core = core.clone();
        let semaphore = semaphore.clone();
        let progress = progress.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await;
            match hydrate::open(&core, &path).await {
                Ok(hydrate::FileHandle::Cached(_)) => {
                    if pin_after {
                        let _ = core.cache().pin(&path);
                    }
                    progress.set_message(format!("ok {path}"));
                }
                Ok(hydrate::FileHandle::Ranged { .. }) => {
                    progress.set_message(format!("range {path} (over threshold, not fully cached)"));
                }
                Err(e) => progress.set_message(format!("fail {path}: {e}")),
            }
            progress.inc(1);
        }));
    }

    for task in tasks {
        let _ = task.await;
    }
    progress.finish_with_message("done");

    if core.is_unauthorized() {
        clear_stored_token()?;
    }

    Ok(())
}

fn collect_matching(node: &tree::Node, pattern: &str, out: &mut Vec<String>) {
    if !node.is_dir && matches_pattern(&node.path, pattern) {
        out.push(node.path.clone());
    }
    for child in &node.children {
        collect_matching(child, pattern, out);
    }
}

/// `"all"` matches everything; a pattern with no `*` is a path prefix;
/// otherwise `*` is treated as a single-segment wildcard, matched greedily.
fn matches_pattern(path: &str, pattern: &str) -> bool {
    if pattern == "all" {
        return true;
    }
    if !pattern.contains('*') {
        return path.starts_with(pattern);
    }
    glob_match(pattern, path)
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let (mut star_pi, mut star_ti) = (None, 0);

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == text[ti] || pattern[pi] == b'?') {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == b'*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(sp) = star_pi {
            pi = sp + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == b'*' {
        pi += 1;
    }
    pi == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_matches_everything() {
        assert!(matches_pattern("/any/path.txt", "all"));
    }

    #[test]
    fn plain_pattern_is_a_prefix() {
        assert!(matches_pattern("/docs/readme.md", "/docs"));
        assert!(!matches_pattern("/src/main.rs", "/docs"));
    }

    #[test]
    fn star_matches_across_segments() {
        assert!(matches_pattern("/docs/a/b.txt", "/docs/*.txt"));
        assert!(matches_pattern("/photos/2024/trip.jpg", "*.jpg"));
        assert!(!matches_pattern("/photos/2024/trip.png", "*.jpg"));
    }

    #[test]
    fn glob_match_handles_question_mark() {
        assert!(glob_match("file?.txt", "file1.txt"));
        assert!(!glob_match("file?.txt", "file12.txt"));
    }
}
