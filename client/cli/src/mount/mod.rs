//! OS mount layer for [`crate::core::ClientCore`].
//!
//! On Linux this is a FUSE filesystem (`fuse.rs`, gated on `fuser`). On every
//! other platform there is no mount layer: `ClientCore` still works as a
//! library (the cache CLI operates fine without a mount), matching the
//! degrade-to-library-only behavior spec calls out for non-Linux hosts.

#[cfg(target_os = "linux")]
pub mod fuse;

#[cfg(target_os = "linux")]
pub use fuse::mount;

#[cfg(not(target_os = "linux"))]
pub fn mount(_core: std::sync::Arc<crate::core::ClientCore>, _mountpoint: &std::path::Path) -> anyhow::Result<()> {
    anyhow::bail!("mounting is only supported on Linux; use the cache CLI subcommands on this platform")
}
