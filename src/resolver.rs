//! The namespace-scoped resolver configuration,
//! `<root>/<namespace>/resolv.conf`.  `ip netns exec` bind-mounts it
//! over `/etc/resolv.conf` for processes in the namespace.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::err::*;
use crate::namespace::NamespaceHandle;

pub const DEFAULT_CONFIG_ROOT: &str = "/etc/netns";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    dir: PathBuf,
}

impl ResolverConfig {
    pub fn new(root: &Path, ns: &NamespaceHandle) -> ResolverConfig {
        ResolverConfig { dir: root.join(ns.name()) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("resolv.conf")
    }

    /// Create the directory if needed and (over)write resolv.conf.
    pub fn write(&self, domain: Option<&str>, servers: &[String]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| map_fs_err(e, &self.dir))?;
        let path = self.path();
        fs::write(&path, render(domain, servers)).map_err(|e| map_fs_err(e, &path))?;
        debug!(path = %path.display(), servers = servers.len(), "wrote resolver config");
        Ok(())
    }

    /// Remove resolv.conf, then its directory.  Either being absent,
    /// or the directory holding anything else, is an error.
    pub fn remove(&self) -> Result<()> {
        let path = self.path();
        fs::remove_file(&path).map_err(|e| map_fs_err(e, &path))?;
        fs::remove_dir(&self.dir).map_err(|e| map_fs_err(e, &self.dir))?;
        debug!(path = %path.display(), "removed resolver config");
        Ok(())
    }
}

/// At most one `domain` line, then one `nameserver` line per server
/// in the order given.
pub fn render(domain: Option<&str>, servers: &[String]) -> String {
    let mut out = String::new();
    if let Some(d) = domain {
        out.push_str(&format!("domain {}\n", d));
    }
    for s in servers {
        out.push_str(&format!("nameserver {}\n", s));
    }
    out
}
