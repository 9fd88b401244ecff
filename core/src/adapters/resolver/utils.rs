/// Split a socket-table address column into host and port.
///
/// Handles the formats `ss` and `lsof` print:
/// - IPv4: "127.0.0.1:3000" or "*:8080"
/// - IPv6: "\[::1]:3000" or "\[fe80::1]:8080"
/// - Zone suffixes: "127.0.0.53%lo:53"
pub(crate) fn split_host_port(address: &str) -> Option<(String, u16)> {
    if address.starts_with('[') {
        // IPv6 format: [::1]:3000
        let bracket_end = address.find(']')?;
        if bracket_end + 1 >= address.len() || address.as_bytes()[bracket_end + 1] != b':' {
            return None;
        }
        let addr = &address[..=bracket_end];
        let port: u16 = address[bracket_end + 2..].parse().ok()?;
        Some((addr.to_string(), port))
    } else {
        // IPv4 format: 127.0.0.1:3000 or *:8080
        let (addr, port_str) = address.rsplit_once(':')?;
        let port: u16 = port_str.parse().ok()?;
        let addr = if addr.is_empty() { "*" } else { addr };
        Some((addr.to_string(), port))
    }
}
