//! Construction of the namespace firewall.
//!
//! Rules are inserted with `-I`, i.e. at the head of their chain, so
//! the last rule inserted is the first one evaluated.  The builder
//! therefore emits each chain's broad DROP first and its narrow
//! ACCEPT exceptions last.  `effective_order` replays a rule list the
//! same way the kernel would, for checking the outcome rather than
//! the call order.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;

use tracing::debug;

use crate::err::*;
use crate::namespace::NamespaceHandle;
use crate::policy::PolicyGeneration;
use crate::subprocess::CommandRunner;

/// Private IPv4 ranges that must never be reached outside the tunnel.
pub const PRIVATE_V4_NETS: [&str; 3] = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn program(self) -> &'static str {
        match self {
            Family::V4 => "iptables",
            Family::V6 => "ip6tables",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Chain {
    Input,
    Forward,
    Output,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Chain::Input => "INPUT",
            Chain::Forward => "FORWARD",
            Chain::Output => "OUTPUT",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Drop,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Verdict::Accept => "ACCEPT",
            Verdict::Drop => "DROP",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    Any,
    InIface(String),
    OutIface(String),
    Destination(String),
    EstablishedRelated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub family: Family,
    pub chain: Chain,
    pub verdict: Verdict,
    pub matcher: Match,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirewallOp {
    /// Remove every rule from every chain of the filter table.
    Flush(Family),
    /// Insert a rule at the head of its chain.
    Insert(Rule),
}

impl FirewallOp {
    /// The command template and its arguments, without the
    /// namespace prefix.
    pub fn command(&self) -> (String, Vec<String>) {
        match *self {
            FirewallOp::Flush(fam) => (format!("{} -F", fam.program()), Vec::new()),
            FirewallOp::Insert(ref r) => {
                let mut args = vec![r.chain.to_string()];
                let sel = match r.matcher {
                    Match::Any => "",
                    Match::InIface(ref d) => { args.push(d.clone()); " -i ?" }
                    Match::OutIface(ref d) => { args.push(d.clone()); " -o ?" }
                    Match::Destination(ref n) => { args.push(n.clone()); " -d ?" }
                    Match::EstablishedRelated => " -m state --state ESTABLISHED,RELATED",
                };
                args.push(r.verdict.to_string());
                (format!("{} -I ?{} -j ?", r.family.program(), sel), args)
            }
        }
    }
}

/// Accumulates operations in emission order.
struct Builder {
    ops: Vec<FirewallOp>,
}

impl Builder {
    fn flush(&mut self, family: Family) -> &mut Self {
        self.ops.push(FirewallOp::Flush(family));
        self
    }

    fn insert(&mut self, family: Family, chain: Chain, matcher: Match,
              verdict: Verdict) -> &mut Self {
        self.ops.push(FirewallOp::Insert(Rule { family, chain, verdict, matcher }));
        self
    }

    fn drop_all(&mut self, family: Family, chain: Chain) -> &mut Self {
        self.insert(family, chain, Match::Any, Verdict::Drop)
    }

    fn accept(&mut self, family: Family, chain: Chain, matcher: Match) -> &mut Self {
        self.insert(family, chain, matcher, Verdict::Accept)
    }
}

fn lo() -> String {
    String::from("lo")
}

/// Build the firewall for the up path.  `ipv6_available` is true
/// only if a complete IPv6 configuration was negotiated; otherwise
/// IPv6 stays closed in both directions apart from loopback.
pub fn build_rules(generation: PolicyGeneration, device: &str,
                   ipv6_available: bool) -> Vec<FirewallOp> {
    use self::Chain::*;
    use self::Family::*;

    let dev = || String::from(device);
    let mut b = Builder { ops: Vec::new() };

    b.flush(V4)
        .drop_all(V4, Input)
        .drop_all(V4, Forward);
    if generation.restricts_ipv4_output() {
        b.drop_all(V4, Output);
        for net in PRIVATE_V4_NETS.iter() {
            b.insert(V4, Output, Match::Destination(net.to_string()), Verdict::Drop);
        }
        b.accept(V4, Output, Match::OutIface(lo()))
            .accept(V4, Output, Match::OutIface(dev()));
    }
    b.accept(V4, Input, Match::EstablishedRelated)
        .accept(V4, Input, Match::InIface(lo()));

    b.flush(V6)
        .drop_all(V6, Input)
        .accept(V6, Input, Match::InIface(lo()))
        .drop_all(V6, Forward)
        .drop_all(V6, Output)
        .accept(V6, Output, Match::OutIface(lo()));
    if generation == PolicyGeneration::LeakHardened && ipv6_available {
        b.accept(V6, Input, Match::EstablishedRelated)
            .accept(V6, Output, Match::EstablishedRelated)
            .accept(V6, Output, Match::OutIface(dev()));
    }

    b.ops
}

/// Replay `ops` as the kernel would and return, per chain, the rules
/// in evaluation order (first evaluated first).  Chains with no rules
/// are omitted.
pub fn effective_order(ops: &[FirewallOp]) -> BTreeMap<(Family, Chain), Vec<Rule>> {
    let mut chains: BTreeMap<(Family, Chain), Vec<Rule>> = BTreeMap::new();
    for op in ops {
        match *op {
            FirewallOp::Flush(fam) => chains.retain(|&(f, _), _| f != fam),
            FirewallOp::Insert(ref r) => {
                chains.entry((r.family, r.chain)).or_default().insert(0, r.clone());
            }
        }
    }
    chains
}

/// Run every operation inside `ns`, in order.  Stops at the first
/// failure.
pub fn apply<R: CommandRunner + ?Sized>(runner: &mut R, ns: &NamespaceHandle,
                                        ops: &[FirewallOp]) -> Result<()> {
    for op in ops {
        let (template, args) = op.command();
        let args: Vec<&dyn Display> = args.iter().map(|a| a as &dyn Display).collect();
        runner.run_in_namespace(ns, &template, &args)?;
    }
    debug!(namespace = %ns, rules = ops.len(), "firewall applied");
    Ok(())
}
