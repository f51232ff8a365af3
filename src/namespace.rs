//! The network namespace the tunnel is isolated in.

use std::fmt;

use tracing::{debug, info};

use crate::err::*;
use crate::subprocess::CommandRunner;

pub const DEFAULT_NAMESPACE: &str = "ns1";

/// Names a network namespace.  The name is passed explicitly to
/// every operation; several tunnels may use distinct namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceHandle(String);

impl NamespaceHandle {
    pub fn new(name: &str) -> NamespaceHandle {
        NamespaceHandle(String::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for NamespaceHandle {
    fn default() -> NamespaceHandle {
        NamespaceHandle::new(DEFAULT_NAMESPACE)
    }
}

impl fmt::Display for NamespaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a successful `ensure_namespace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceStatus {
    Created,
    AlreadyPresent,
}

/// Parse the output of `ip netns list`.  Each line is a name,
/// optionally followed by `(id: N)`.
fn parse_netns_list(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .filter_map(|l| l.split_whitespace().next())
        .map(String::from)
        .collect()
}

pub fn namespace_exists<R: CommandRunner + ?Sized>(runner: &mut R,
                                                   ns: &NamespaceHandle)
                                                   -> Result<bool> {
    let raw = runner.run_output("ip netns list", &[])?;
    Ok(parse_netns_list(&raw).iter().any(|n| n == ns.name()))
}

/// Create `ns` unless it already exists.  If `ip netns add` fails
/// and the namespace is then found to exist, that counts as
/// `AlreadyPresent`; any other failure is returned unchanged.
pub fn ensure_namespace<R: CommandRunner + ?Sized>(runner: &mut R,
                                                   ns: &NamespaceHandle)
                                                   -> Result<NamespaceStatus> {
    match runner.run("ip netns add ?", &[ns]) {
        Ok(()) => Ok(NamespaceStatus::Created),
        Err(e @ HLError::CommandFailed { .. }) => {
            debug!(namespace = %ns, error = %e, "netns add failed, probing");
            if namespace_exists(runner, ns)? {
                info!(namespace = %ns, "namespace already exists");
                Ok(NamespaceStatus::AlreadyPresent)
            } else {
                Err(e)
            }
        }
        Err(e) => Err(e),
    }
}

pub fn delete_namespace<R: CommandRunner + ?Sized>(runner: &mut R,
                                                   ns: &NamespaceHandle)
                                                   -> Result<()> {
    runner.run("ip netns delete ?", &[ns])
}
