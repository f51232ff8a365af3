//! The three generations of isolation policy.  They share one
//! up/down sequence and differ only in the switches below.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyGeneration {
    /// Inbound and forwarded traffic denied; IPv4 egress unrestricted.
    /// Writes a `domain` line.  The namespace is deleted on down.
    Minimal,
    /// Same firewall as `Minimal`; the search domain is no longer
    /// written.
    EstablishedOnly,
    /// All IPv4 egress denied except through the tunnel; routes are
    /// flushed and DNS is written before the device is moved in.  The
    /// namespace survives the down path.
    #[default]
    LeakHardened,
}

impl PolicyGeneration {
    pub const ALL: [PolicyGeneration; 3] = [PolicyGeneration::Minimal,
                                            PolicyGeneration::EstablishedOnly,
                                            PolicyGeneration::LeakHardened];

    pub fn flushes_routes(self) -> bool {
        self == PolicyGeneration::LeakHardened
    }

    pub fn restricts_ipv4_output(self) -> bool {
        self == PolicyGeneration::LeakHardened
    }

    /// Whether resolv.conf is written before the tunnel device is
    /// moved into the namespace, rather than after addressing.
    pub fn dns_before_device_move(self) -> bool {
        self == PolicyGeneration::LeakHardened
    }

    pub fn writes_domain(self) -> bool {
        self == PolicyGeneration::Minimal
    }

    pub fn deletes_namespace_on_down(self) -> bool {
        self != PolicyGeneration::LeakHardened
    }
}

impl fmt::Display for PolicyGeneration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            PolicyGeneration::Minimal => "minimal",
            PolicyGeneration::EstablishedOnly => "established-only",
            PolicyGeneration::LeakHardened => "leak-hardened",
        })
    }
}

impl FromStr for PolicyGeneration {
    type Err = String;

    fn from_str(s: &str) -> Result<PolicyGeneration, String> {
        match s {
            "minimal" | "1" => Ok(PolicyGeneration::Minimal),
            "established-only" | "2" => Ok(PolicyGeneration::EstablishedOnly),
            "leak-hardened" | "3" => Ok(PolicyGeneration::LeakHardened),
            _ => Err(format!("unknown policy generation '{}' (expected \
                              minimal, established-only or leak-hardened)", s)),
        }
    }
}
