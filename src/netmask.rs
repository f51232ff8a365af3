//! Dotted-decimal netmask to CIDR prefix length.

use crate::err::*;

/// Count the leading one bits of a dotted-quad IPv4 netmask.
///
/// The mask is not checked for contiguity: anything after the first
/// zero bit is ignored, so `255.0.255.0` yields 8, not 16.
pub fn mask_to_prefix_len(mask: &str) -> Result<u32> {
    let octets = mask.split('.')
        .map(|o| o.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|e| invalid("ifconfig_netmask", mask, e))?;

    if octets.len() != 4 {
        return Err(invalid("ifconfig_netmask", mask,
                           format!("expected 4 octets, got {}", octets.len())));
    }

    let bits = octets.iter().fold(0u32, |acc, &o| (acc << 8) | u32::from(o));
    Ok(bits.leading_ones())
}
