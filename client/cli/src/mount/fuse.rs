//! Read-only FUSE adapter over [`ClientCore`].
//!
//! Translates `lookup`/`getattr`/`opendir`/`readdir`/`open`/`read` into
//! `Tree`/`hydrate` calls, in the request-to-vfs-call idiom of the retrieval
//! pack's onedrive/NFS adapters, composed with `tokio::runtime::Handle::
//! block_on` since `fuser::Filesystem` methods are synchronous and
//! `ClientCore` is async throughout. Every other operation (`write`,
//! `setattr`, `mknod`, ...) is left at the trait's default `ENOSYS` reply —
//! Driftbox mounts are read-through caches, not a place to create files.

use crate::core::ClientCore;
use crate::hydrate::{self, FileHandle};
use crate::tree::Node;
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyOpen, Request,
};
use libc::ENOENT;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;

struct Inodes {
    path_to_ino: HashMap<String, u64>,
    ino_to_path: HashMap<u64, String>,
    next: u64,
}

impl Inodes {
    fn new() -> Self {
        let mut path_to_ino = HashMap::new();
        let mut ino_to_path = HashMap::new();
        path_to_ino.insert("/".to_string(), ROOT_INO);
        ino_to_path.insert(ROOT_INO, "/".to_string());
        Self { path_to_ino, ino_to_path, next: ROOT_INO + 1 }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.ino_to_path.get(&ino).cloned()
    }

    fn ino_for(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.path_to_ino.get(path) {
            return *ino;
        }
        let ino = self.next;
        self.next += 1;
        self.path_to_ino.insert(path.to_string(), ino);
        self.ino_to_path.insert(ino, path.to_string());
        ino
    }
}

pub struct DriftboxFs {
    core: Arc<ClientCore>,
    runtime: tokio::runtime::Handle,
    inodes: Mutex<Inodes>,
    handles: Mutex<HashMap<u64, FileHandle>>,
    next_fh: AtomicU64,
}

impl DriftboxFs {
    pub fn new(core: Arc<ClientCore>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            core,
            runtime,
            inodes: Mutex::new(Inodes::new()),
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    fn node_at(&self, path: &str) -> Option<Arc<Node>> {
        self.runtime.block_on(self.core.tree().get(path))
    }

    fn attr_for(&self, ino: u64, node: &Node) -> FileAttr {
        let kind = if node.is_dir { FileType::Directory } else { FileType::RegularFile };
        let perm = if node.is_dir { 0o555 } else { 0o444 };
        let mtime: SystemTime = node.modified_at.into();
        let size = if node.is_dir { 0 } else { node.size.max(0) as u64 };

        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind,
            perm,
            nlink: 1,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }
}

impl Filesystem for DriftboxFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(ENOENT);
            return;
        };
        let Some(parent_path) = self.inodes.lock().unwrap().path_of(parent) else {
            reply.error(ENOENT);
            return;
        };
        let child_path = join_path(&parent_path, name);

        match self.node_at(&child_path) {
            Some(node) => {
                let ino = self.inodes.lock().unwrap().ino_for(&child_path);
                reply.entry(&TTL, &self.attr_for(ino, &node), 0);
            }
            None => reply.error(ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.inodes.lock().unwrap().path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        match self.node_at(&path) {
            Some(node) => reply.attr(&TTL, &self.attr_for(ino, &node)),
            None => reply.error(ENOENT),
        }
    }

    fn opendir(&mut self, _req: &Request, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.inodes.lock().unwrap().path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        let Some(node) = self.node_at(&path) else {
            reply.error(ENOENT);
            return;
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        for child in &node.children {
            let child_ino = self.inodes.lock().unwrap().ino_for(&child.path);
            let kind = if child.is_dir { FileType::Directory } else { FileType::RegularFile };
            entries.push((child_ino, kind, child.name.clone()));
        }

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.inodes.lock().unwrap().path_of(ino) else {
            reply.error(ENOENT);
            return;
        };

        match self.runtime.block_on(hydrate::open(&self.core, &path)) {
            Ok(handle) => {
                let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
                self.handles.lock().unwrap().insert(fh, handle);
                reply.opened(fh, 0);
            }
            Err(_) => reply.error(libc::EIO),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let handle = match self.handles.lock().unwrap().get(&fh).cloned() {
            Some(h) => h,
            None => {
                reply.error(libc::EBADF);
                return;
            }
        };

        match self.runtime.block_on(hydrate::read(&self.core, &handle, offset.max(0) as u64, size)) {
            Ok(bytes) => reply.data(&bytes),
            Err(_) => reply.error(libc::EIO),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        self.handles.lock().unwrap().remove(&fh);
        reply.ok();
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Mount `core` at `mountpoint` and block until it's unmounted.
pub fn mount(core: Arc<ClientCore>, mountpoint: &Path) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Handle::current();
    let fs = DriftboxFs::new(core, runtime);
    let options = vec![
        MountOption::RO,
        MountOption::FSName("driftbox".to_string()),
        MountOption::AutoUnmount,
    ];
    fuser::mount2(fs, mountpoint, &options)?;
    Ok(())
}
