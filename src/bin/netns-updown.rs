/* OpenVPN up/down hook confining the tunnel to a network namespace.
 *
 * Copyright © 2015 Zack Weinberg
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 * http://www.apache.org/licenses/LICENSE-2.0
 * There is NO WARRANTY.
 *
 *     netns-updown [--namespace NAME] [--generation GEN] [args...]
 *
 * is meant to be named as both the --up and --down script in an
 * OpenVPN client configuration (with --script-security 2).  OpenVPN
 * describes the tunnel in environment variables; the positional
 * arguments it appends are ignored.
 *
 * On "up", the namespace NAME (default ns1) is created if it does not
 * already exist, a default-deny firewall is installed in it, and only
 * then is the tunnel device moved in and given its addresses and
 * default routes.  DNS servers pushed by the server are written to
 * /etc/netns/NAME/resolv.conf, which "ip netns exec" substitutes for
 * /etc/resolv.conf.
 *
 * On "down", that resolv.conf and its directory are removed.  Under
 * the "minimal" and "established-only" policies the namespace is then
 * deleted; under "leak-hardened" (the default) it is kept, since the
 * tunnel device is already gone and other programs may still be
 * running inside it.
 *
 * This program must run as root.  It makes extensive use of
 * Linux-specific network stack features via ip(8), iptables(8) and
 * ip6tables(8).
 */

use std::path::PathBuf;
use std::process;

use clap::Parser;
use nix::unistd::Uid;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use openvpn_netns_updown::HLError;
use openvpn_netns_updown::{ChildEnv, SystemRunner};
use openvpn_netns_updown::lifecycle::{HookConfig, Orchestrator};
use openvpn_netns_updown::namespace::{NamespaceHandle, DEFAULT_NAMESPACE};
use openvpn_netns_updown::params::{HookMode, TunnelParameters};
use openvpn_netns_updown::policy::PolicyGeneration;
use openvpn_netns_updown::resolver::DEFAULT_CONFIG_ROOT;

#[derive(Debug, Parser)]
#[command(name = "netns-updown", version,
          about = "OpenVPN up/down hook confining the tunnel to a network namespace")]
struct Args {
    /// Network namespace to confine the tunnel to
    #[arg(long, env = "NETNS_UPDOWN_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Isolation policy: minimal, established-only or leak-hardened
    #[arg(long, env = "NETNS_UPDOWN_GENERATION", default_value = "leak-hardened")]
    generation: PolicyGeneration,

    /// Directory holding per-namespace configuration
    #[arg(long, env = "NETNS_UPDOWN_CONFIG_ROOT", default_value = DEFAULT_CONFIG_ROOT)]
    netns_config_root: PathBuf,

    /// Log every command executed
    #[arg(short, long)]
    verbose: bool,

    /// Log what would be done without doing it
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Arguments appended by OpenVPN; ignored
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    openvpn_args: Vec<String>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<(), HLError> {
    if !Uid::effective().is_root() && !args.dry_run {
        warn!("not running as root; network configuration will likely fail");
    }

    let mode = HookMode::from_lookup(|k| std::env::var(k).ok())?;
    let params = match mode {
        HookMode::Up => Some(TunnelParameters::from_env()?),
        HookMode::Down => None,
    };

    let config = HookConfig {
        namespace: NamespaceHandle::new(&args.namespace),
        generation: args.generation,
        config_root: args.netns_config_root,
        dryrun: args.dry_run,
    };
    let runner = SystemRunner::new(ChildEnv { dryrun: args.dry_run });

    Orchestrator::new(runner, config).run(mode, params.as_ref())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    process::exit(match run(args) {
        Ok(_) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    });
}
