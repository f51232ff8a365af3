//! Tunnel parameters, read once from the environment OpenVPN hands
//! to its up/down scripts.  Nothing downstream looks at the
//! environment again.

use std::fmt;

use crate::err::*;
use crate::options::parse_foreign_options;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    Up,
    Down,
}

impl HookMode {
    pub fn from_lookup<F>(lookup: F) -> Result<HookMode>
        where F: Fn(&str) -> Option<String>
    {
        let v = lookup("script_type").ok_or_else(|| missing("script_type"))?;
        match v.as_str() {
            "up" => Ok(HookMode::Up),
            "down" => Ok(HookMode::Down),
            _ => Err(invalid("script_type", &v, "expected 'up' or 'down'")),
        }
    }
}

impl fmt::Display for HookMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            HookMode::Up => "up",
            HookMode::Down => "down",
        })
    }
}

/// The negotiated IPv6 configuration.  Only exists if all three of
/// the relevant variables were supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Config {
    pub local: String,
    pub netbits: u8,
    pub gateway: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelParameters {
    pub device: String,
    pub mtu: u32,
    pub v4_local: String,
    pub v4_netmask: String,
    pub v4_gateway: String,
    pub v6: Option<Ipv6Config>,
    pub dns_servers: Vec<String>,
    pub domain: Option<String>,
}

fn required<F>(lookup: &F, var: &str) -> Result<String>
    where F: Fn(&str) -> Option<String>
{
    match lookup(var) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(missing(var)),
    }
}

fn optional<F>(lookup: &F, var: &str) -> Option<String>
    where F: Fn(&str) -> Option<String>
{
    lookup(var).filter(|v| !v.is_empty())
}

impl TunnelParameters {
    /// Build the parameters for the up path from a variable lookup
    /// function (normally `std::env::var`).
    pub fn from_lookup<F>(lookup: F) -> Result<TunnelParameters>
        where F: Fn(&str) -> Option<String>
    {
        let device = required(&lookup, "dev")?;

        let mtu_s = required(&lookup, "tun_mtu")?;
        let mtu = mtu_s.trim().parse::<u32>()
            .map_err(|e| invalid("tun_mtu", &mtu_s, e))?;
        if mtu == 0 {
            return Err(invalid("tun_mtu", &mtu_s, "must be positive"));
        }

        let v4_local = required(&lookup, "ifconfig_local")?;
        let v4_netmask = required(&lookup, "ifconfig_netmask")?;
        let v4_gateway = required(&lookup, "route_vpn_gateway")?;

        let v6 = match (optional(&lookup, "ifconfig_ipv6_local"),
                        optional(&lookup, "ifconfig_ipv6_netbits"),
                        optional(&lookup, "ifconfig_ipv6_remote")) {
            (Some(local), Some(bits), Some(gateway)) => {
                let netbits = bits.trim().parse::<u8>()
                    .map_err(|e| invalid("ifconfig_ipv6_netbits", &bits, e))?;
                if netbits > 128 {
                    return Err(invalid("ifconfig_ipv6_netbits", &bits,
                                       "must be at most 128"));
                }
                Some(Ipv6Config { local, netbits, gateway })
            }
            _ => None,
        };

        let opts = parse_foreign_options(
            |i| lookup(&format!("foreign_option_{}", i)));

        Ok(TunnelParameters {
            device,
            mtu,
            v4_local,
            v4_netmask,
            v4_gateway,
            v6,
            dns_servers: opts.dns_servers,
            domain: opts.domain,
        })
    }

    pub fn from_env() -> Result<TunnelParameters> {
        TunnelParameters::from_lookup(|k| std::env::var(k).ok())
    }
}
