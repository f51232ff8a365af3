//! The up/down sequences.
//!
//! Both are strictly sequential with no retries and no rollback: the
//! first failing step aborts the hook and leaves whatever it had
//! already done in place.  OpenVPN treats a failed hook as a failed
//! connection.

use std::fmt;
use std::path::PathBuf;

use tracing::info;

use crate::err::*;
use crate::firewall;
use crate::namespace::{self, NamespaceHandle};
use crate::netmask::mask_to_prefix_len;
use crate::params::{HookMode, TunnelParameters};
use crate::policy::PolicyGeneration;
use crate::resolver::{ResolverConfig, DEFAULT_CONFIG_ROOT};
use crate::subprocess::CommandRunner;

/// Settings that do not come from OpenVPN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookConfig {
    pub namespace: NamespaceHandle,
    pub generation: PolicyGeneration,
    pub config_root: PathBuf,
    /// Log filesystem changes instead of making them.
    pub dryrun: bool,
}

impl Default for HookConfig {
    fn default() -> HookConfig {
        HookConfig {
            namespace: NamespaceHandle::default(),
            generation: PolicyGeneration::default(),
            config_root: PathBuf::from(DEFAULT_CONFIG_ROOT),
            dryrun: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    NamespaceEnsured,
    FirewallApplied,
    DeviceMoved,
    AddressesConfigured,
    DnsConfigured,
    Up,
    DnsRemoved,
    NamespaceDeleted,
    NamespaceRetained,
    Down,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct Orchestrator<R> {
    runner: R,
    config: HookConfig,
    resolver: ResolverConfig,
    history: Vec<LifecycleState>,
}

impl<R: CommandRunner> Orchestrator<R> {
    pub fn new(runner: R, config: HookConfig) -> Orchestrator<R> {
        let resolver = ResolverConfig::new(&config.config_root, &config.namespace);
        Orchestrator {
            runner,
            config,
            resolver,
            history: vec![LifecycleState::Uninitialized],
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.history.last().copied().unwrap_or(LifecycleState::Uninitialized)
    }

    /// Every state reached so far, oldest first.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    fn advance(&mut self, next: LifecycleState) {
        info!(namespace = %self.config.namespace, from = %self.state(), to = %next,
              "state change");
        self.history.push(next);
    }

    /// Dispatch on the hook mode.  Tunnel parameters are needed only
    /// for the up path.
    pub fn run(&mut self, mode: HookMode, params: Option<&TunnelParameters>) -> Result<()> {
        match (mode, params) {
            (HookMode::Up, Some(p)) => self.up(p),
            (HookMode::Up, None) => Err(missing("dev")),
            (HookMode::Down, _) => self.down(),
        }
    }

    pub fn up(&mut self, p: &TunnelParameters) -> Result<()> {
        let ns = self.config.namespace.clone();
        let generation = self.config.generation;
        info!(namespace = %ns, device = %p.device, %generation, "bringing tunnel up");

        namespace::ensure_namespace(&mut self.runner, &ns)?;
        self.advance(LifecycleState::NamespaceEnsured);

        if generation.flushes_routes() {
            self.runner.run_in_namespace(&ns, "ip route flush table all", &[])?;
            self.runner.run_in_namespace(&ns, "ip -6 route flush table all", &[])?;
        }

        let rules = firewall::build_rules(generation, &p.device, p.v6.is_some());
        firewall::apply(&mut self.runner, &ns, &rules)?;
        self.advance(LifecycleState::FirewallApplied);

        // The device must not be moved in until the firewall is up.
        if generation.dns_before_device_move() {
            self.write_dns(p)?;
        }

        self.runner.run("ip link set ? netns ?", &[&p.device, &ns])?;
        self.advance(LifecycleState::DeviceMoved);

        self.runner.run_in_namespace(&ns, "ip link set lo up", &[])?;
        self.runner.run_in_namespace(&ns, "ip link set ? up", &[&p.device])?;
        self.runner.run_in_namespace(&ns, "ip link set dev ? mtu ?", &[&p.device, &p.mtu])?;

        let prefix = mask_to_prefix_len(&p.v4_netmask)?;
        let address = format!("{}/{}", p.v4_local, prefix);
        self.runner.run_in_namespace(&ns, "ip addr change ? dev ?", &[&address, &p.device])?;
        self.runner.run_in_namespace(&ns, "ip route add default via ?", &[&p.v4_gateway])?;

        match p.v6 {
            Some(ref v6) => {
                let address = format!("{}/{}", v6.local, v6.netbits);
                self.runner.run_in_namespace(&ns, "ip -6 addr change ? dev ?",
                                             &[&address, &p.device])?;
                self.runner.run_in_namespace(&ns, "ip -6 route add default via ?",
                                             &[&v6.gateway])?;
            }
            None => info!(device = %p.device, "no IPv6 configuration, skipping"),
        }
        self.advance(LifecycleState::AddressesConfigured);

        if !generation.dns_before_device_move() {
            self.write_dns(p)?;
        }

        self.advance(LifecycleState::Up);
        Ok(())
    }

    fn write_dns(&mut self, p: &TunnelParameters) -> Result<()> {
        let domain = if self.config.generation.writes_domain() {
            p.domain.as_deref()
        } else {
            None
        };
        if self.config.dryrun {
            info!(path = %self.resolver.path().display(), "dry run: not writing resolver config");
        } else {
            self.resolver.write(domain, &p.dns_servers)?;
        }
        self.advance(LifecycleState::DnsConfigured);
        Ok(())
    }

    pub fn down(&mut self) -> Result<()> {
        let ns = self.config.namespace.clone();
        info!(namespace = %ns, generation = %self.config.generation, "tearing tunnel down");

        if self.config.dryrun {
            info!(path = %self.resolver.path().display(), "dry run: not removing resolver config");
        } else {
            self.resolver.remove()?;
        }
        self.advance(LifecycleState::DnsRemoved);

        if self.config.generation.deletes_namespace_on_down() {
            namespace::delete_namespace(&mut self.runner, &ns)?;
            self.advance(LifecycleState::NamespaceDeleted);
        } else {
            // Other processes may still live in the namespace.
            self.advance(LifecycleState::NamespaceRetained);
        }

        self.advance(LifecycleState::Down);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl CommandRunner for Recorder {
        fn run_argv(&mut self, argv: &[String]) -> Result<()> {
            let line = argv.join(" ");
            self.calls.push(line.clone());
            match self.fail_on {
                Some(f) if line.contains(f) => Err(HLError::CommandFailed {
                    status: String::from("exited unsuccessfully (code 2)"),
                    cmdline: line,
                }),
                _ => Ok(()),
            }
        }
        fn run_argv_output(&mut self, argv: &[String]) -> Result<Vec<u8>> {
            self.calls.push(argv.join(" "));
            Ok(Vec::new())
        }
    }

    fn params() -> TunnelParameters {
        TunnelParameters {
            device: "tun0".into(),
            mtu: 1500,
            v4_local: "10.8.0.2".into(),
            v4_netmask: "255.255.255.0".into(),
            v4_gateway: "10.8.0.1".into(),
            v6: None,
            dns_servers: vec!["8.8.8.8".into()],
            domain: Some("example.com".into()),
        }
    }

    fn config(root: &TempDir, generation: PolicyGeneration) -> HookConfig {
        HookConfig {
            generation,
            config_root: root.path().to_path_buf(),
            ..HookConfig::default()
        }
    }

    fn index_of(calls: &[String], needle: &str) -> usize {
        calls.iter().position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("no call containing {:?} in {:#?}", needle, calls))
    }

    #[test]
    fn leak_hardened_ordering() {
        let root = TempDir::new().unwrap();
        let mut o = Orchestrator::new(Recorder::default(),
                                      config(&root, PolicyGeneration::LeakHardened));
        o.up(&params()).unwrap();
        assert_eq!(o.history(), &[LifecycleState::Uninitialized,
                                  LifecycleState::NamespaceEnsured,
                                  LifecycleState::FirewallApplied,
                                  LifecycleState::DnsConfigured,
                                  LifecycleState::DeviceMoved,
                                  LifecycleState::AddressesConfigured,
                                  LifecycleState::Up]);
        let calls = &o.runner().calls;
        assert_eq!(calls[0], "ip netns add ns1");
        let flush = index_of(calls, "ip route flush table all");
        let last_rule = calls.iter().rposition(|c| c.contains("tables -I")).unwrap();
        let mv = index_of(calls, "ip link set tun0 netns ns1");
        assert!(flush < index_of(calls, "iptables -F"));
        assert!(last_rule < mv);
        assert!(mv < index_of(calls, "ip addr change 10.8.0.2/24 dev tun0"));
        assert!(!calls.iter().any(|c| c.contains("-6 addr")));
    }

    #[test]
    fn minimal_writes_dns_last_with_domain() {
        let root = TempDir::new().unwrap();
        let mut o = Orchestrator::new(Recorder::default(),
                                      config(&root, PolicyGeneration::Minimal));
        o.up(&params()).unwrap();
        let h = o.history();
        assert_eq!(h[h.len() - 2], LifecycleState::DnsConfigured);
        assert!(!o.runner().calls.iter().any(|c| c.contains("route flush")));
        let rc = root.path().join("ns1").join("resolv.conf");
        assert_eq!(std::fs::read_to_string(rc).unwrap(),
                   "domain example.com\nnameserver 8.8.8.8\n");
    }

    #[test]
    fn established_only_drops_domain() {
        let root = TempDir::new().unwrap();
        let mut o = Orchestrator::new(Recorder::default(),
                                      config(&root, PolicyGeneration::EstablishedOnly));
        o.up(&params()).unwrap();
        let rc = root.path().join("ns1").join("resolv.conf");
        assert_eq!(std::fs::read_to_string(rc).unwrap(), "nameserver 8.8.8.8\n");
    }

    #[test]
    fn failure_aborts_without_rollback() {
        let root = TempDir::new().unwrap();
        let rec = Recorder { fail_on: Some("netns ns1"), ..Recorder::default() };
        let mut o = Orchestrator::new(rec, config(&root, PolicyGeneration::LeakHardened));
        match o.up(&params()) {
            Err(HLError::CommandFailed { cmdline, .. }) =>
                assert_eq!(cmdline, "ip link set tun0 netns ns1"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(o.state(), LifecycleState::DnsConfigured);
        // nothing after the failing step ran, nothing before it was undone
        assert!(o.runner().calls.last().unwrap().ends_with("netns ns1"));
        assert!(root.path().join("ns1").join("resolv.conf").exists());
    }

    #[test]
    fn bad_netmask_fails_after_device_move() {
        let root = TempDir::new().unwrap();
        let mut p = params();
        p.v4_netmask = "255.255.x.0".into();
        let mut o = Orchestrator::new(Recorder::default(),
                                      config(&root, PolicyGeneration::LeakHardened));
        assert!(matches!(o.up(&p), Err(HLError::InvalidConfiguration { .. })));
        assert_eq!(o.state(), LifecycleState::DeviceMoved);
    }

    #[test]
    fn down_retains_or_deletes_namespace() {
        for &(g, deleted) in [(PolicyGeneration::LeakHardened, false),
                              (PolicyGeneration::Minimal, true)].iter() {
            let root = TempDir::new().unwrap();
            let mut o = Orchestrator::new(Recorder::default(), config(&root, g));
            o.up(&params()).unwrap();
            o.down().unwrap();
            assert_eq!(o.state(), LifecycleState::Down);
            let deleted_call = o.runner().calls.iter().any(|c| c == "ip netns delete ns1");
            assert_eq!(deleted_call, deleted);
            assert!(o.history().contains(&if deleted { LifecycleState::NamespaceDeleted }
                                          else { LifecycleState::NamespaceRetained }));
        }
    }

    #[test]
    fn dry_run_leaves_filesystem_alone() {
        let root = TempDir::new().unwrap();
        let cfg = HookConfig { dryrun: true, ..config(&root, PolicyGeneration::LeakHardened) };
        let mut o = Orchestrator::new(Recorder::default(), cfg);
        o.up(&params()).unwrap();
        assert!(!root.path().join("ns1").exists());
        o.down().unwrap();
    }

    #[test]
    fn up_without_parameters() {
        let mut o = Orchestrator::new(Recorder::default(), HookConfig::default());
        assert!(matches!(o.run(HookMode::Up, None),
                         Err(HLError::MissingConfiguration { .. })));
        assert!(o.runner().calls.is_empty());
    }
}
