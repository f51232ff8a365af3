//! Scanning of the `foreign_option_N` strings pushed by the server.

const DNS_PREFIX: &str = "dhcp-option DNS";
const DNS_DELIM: &str = " DNS ";
const DOMAIN_PREFIX: &str = "dhcp-option DOMAIN";
const DOMAIN_DELIM: &str = " DOMAIN ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignOptions {
    pub dns_servers: Vec<String>,
    pub domain: Option<String>,
}

/// Everything after the first occurrence of `delim`, or the empty
/// string if there is none.
fn after<'a>(s: &'a str, delim: &str) -> &'a str {
    s.split_once(delim).map(|(_, rest)| rest).unwrap_or("")
}

/// Walk `lookup(1)`, `lookup(2)`, ... until the first index that
/// returns `None`.  There is no upper bound.  DNS servers are kept in
/// the order seen; if DOMAIN appears more than once the last one wins.
/// Unrecognized options are skipped.
pub fn parse_foreign_options<F>(mut lookup: F) -> ForeignOptions
    where F: FnMut(usize) -> Option<String>
{
    let mut opts = ForeignOptions::default();
    for o in (1..).map_while(|i| lookup(i)) {
        if o.starts_with(DNS_PREFIX) {
            opts.dns_servers.push(String::from(after(&o, DNS_DELIM)));
        } else if o.starts_with(DOMAIN_PREFIX) {
            opts.domain = Some(String::from(after(&o, DOMAIN_DELIM)));
        }
    }
    opts
}
