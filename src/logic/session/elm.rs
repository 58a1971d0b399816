//! ELM327 Adapter Protocol
//!
//! Init sequence, liveness probe, and the hex request/reply framing for
//! mode-01 queries. Garbled replies decode to `None`; partial failure is
//! the normal case here, not an exception.

use super::link::{LinkError, ObdLink};
use super::pids::{decode_status, Pid, PidSet, MODE_LIVE_DATA, PID_STATUS};

/// Commands bringing a factory-state adapter into a known mode:
/// reset, echo off, linefeeds off, spaces off, automatic protocol.
const INIT_COMMANDS: &[&str] = &["ATZ", "ATE0", "ATL0", "ATS0", "ATSP0"];

/// Supported-PID bitmask queries, each covering the next 32 codes.
const SUPPORT_RANGES: &[u8] = &[0x00, 0x20, 0x40];

/// Identify the adapter. A live ELM327 answers `ATI` with its banner.
pub fn probe(link: &mut dyn ObdLink) -> Result<String, LinkError> {
    let reply = link.exchange("ATI")?;
    let banner = reply
        .split(['\r', '\n'])
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string();

    if banner.contains("ELM327") {
        Ok(banner)
    } else {
        Err(LinkError::Protocol(format!(
            "unexpected identify reply: {:?}",
            banner
        )))
    }
}

/// Run the init sequence. Lenient about echoed text and version banners;
/// only a `?` (unknown command) reply fails the handshake.
pub fn initialize(link: &mut dyn ObdLink) -> Result<(), LinkError> {
    for cmd in INIT_COMMANDS {
        let reply = link.exchange(cmd)?;
        if reply.split(['\r', '\n']).any(|l| l.trim() == "?") {
            return Err(LinkError::Protocol(format!(
                "adapter rejected {}: {:?}",
                cmd,
                reply.trim()
            )));
        }
    }
    Ok(())
}

/// Query one numeric parameter.
///
/// `Ok(None)` covers NO DATA and garbled replies; only transport errors
/// surface as `Err` so the caller decides what is cycle-fatal.
pub fn query_pid(link: &mut dyn ObdLink, pid: Pid) -> Result<Option<f64>, LinkError> {
    let command = format!("{:02X}{:02X}", MODE_LIVE_DATA, pid.code());
    let reply = link.exchange(&command)?;
    Ok(extract_payload(&reply, pid.code()).and_then(|data| pid.decode(&data)))
}

/// Query the monitor status word (MIL flag + stored DTC count).
pub fn query_status(link: &mut dyn ObdLink) -> Result<Option<(bool, u32)>, LinkError> {
    let command = format!("{:02X}{:02X}", MODE_LIVE_DATA, PID_STATUS);
    let reply = link.exchange(&command)?;
    Ok(extract_payload(&reply, PID_STATUS).and_then(|data| decode_status(&data)))
}

/// Probe which PIDs the ECU supports.
///
/// Timeouts and missing replies skip a range; a vehicle answering none of
/// them gets the full catalogue, and per-query timeouts sort it out later.
pub fn scan_supported(link: &mut dyn ObdLink) -> Result<PidSet, LinkError> {
    let mut set = PidSet::default();

    for base in SUPPORT_RANGES {
        let command = format!("{:02X}{:02X}", MODE_LIVE_DATA, base);
        match link.exchange(&command) {
            Ok(reply) => {
                if let Some(data) = extract_payload(&reply, *base) {
                    set.apply_bitmask(*base, &data);
                }
            }
            Err(LinkError::Timeout) => continue,
            Err(e) => return Err(e),
        }
    }

    if set.is_empty() {
        log::warn!("Vehicle reported no supported-PID bitmap, assuming full catalogue");
        set = PidSet::full_catalogue();
    }
    Ok(set)
}

/// Pull the payload bytes out of a mode-01 reply.
///
/// Scans reply lines for `41 <pid> ...` (spaces already suppressed by
/// ATS0, but tolerated), skipping SEARCHING banners and echo noise.
fn extract_payload(reply: &str, pid: u8) -> Option<Vec<u8>> {
    for line in reply.split(['\r', '\n']) {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() || compact.contains("NODATA") || compact == "?" {
            continue;
        }
        if let Some(bytes) = parse_hex(&compact) {
            if bytes.len() >= 2 && bytes[0] == (0x40 | MODE_LIVE_DATA) && bytes[1] == pid {
                return Some(bytes[2..].to_vec());
            }
        }
    }
    None
}

fn parse_hex(compact: &str) -> Option<Vec<u8>> {
    if compact.len() % 2 != 0 || compact.is_empty() {
        return None;
    }
    compact
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::session::testing::ScriptedLink;

    #[test]
    fn probe_accepts_elm_banner() {
        let mut link = ScriptedLink::new(vec![("ATI", "ELM327 v1.5\r")]);
        assert_eq!(probe(&mut link).unwrap(), "ELM327 v1.5");
    }

    #[test]
    fn probe_rejects_foreign_devices() {
        let mut link = ScriptedLink::new(vec![("ATI", "STN1110\r")]);
        assert!(matches!(probe(&mut link), Err(LinkError::Protocol(_))));
    }

    #[test]
    fn initialize_fails_on_unknown_command() {
        let mut link = ScriptedLink::new(vec![("ATZ", "ELM327 v1.5\r"), ("ATE0", "?\r")]);
        assert!(matches!(initialize(&mut link), Err(LinkError::Protocol(_))));
    }

    #[test]
    fn query_decodes_spaced_and_compact_replies() {
        let mut link = ScriptedLink::new(vec![
            ("010C", "41 0C 1A F8\r"),
            ("010D", "410D3C\r"),
        ]);
        assert_eq!(query_pid(&mut link, Pid::Rpm).unwrap(), Some(1726.0));
        assert_eq!(query_pid(&mut link, Pid::Speed).unwrap(), Some(60.0));
    }

    #[test]
    fn query_skips_searching_banner() {
        let mut link = ScriptedLink::new(vec![("0105", "SEARCHING...\r41057D\r")]);
        assert_eq!(query_pid(&mut link, Pid::CoolantTemp).unwrap(), Some(85.0));
    }

    #[test]
    fn no_data_and_garbage_are_absent_not_errors() {
        let mut link = ScriptedLink::new(vec![
            ("0110", "NO DATA\r"),
            ("0111", "41 11\r"),
            ("010C", "CAN ERROR\r"),
        ]);
        assert_eq!(query_pid(&mut link, Pid::Maf).unwrap(), None);
        // reply frame present but payload truncated
        assert_eq!(query_pid(&mut link, Pid::ThrottlePos).unwrap(), None);
        assert_eq!(query_pid(&mut link, Pid::Rpm).unwrap(), None);
    }

    #[test]
    fn status_query_splits_mil_and_count() {
        let mut link = ScriptedLink::new(vec![("0101", "41018307E5\r")]);
        assert_eq!(query_status(&mut link).unwrap(), Some((true, 3)));
    }

    #[test]
    fn scan_collects_reported_ranges() {
        let mut link = ScriptedLink::new(vec![
            ("0100", "4100BE1FA813\r"),
            ("0120", "NO DATA\r"),
            ("0140", "NO DATA\r"),
        ]);
        let set = scan_supported(&mut link).unwrap();
        assert!(set.contains(0x0C));
        assert!(!set.contains(0x21));
    }

    #[test]
    fn scan_falls_back_to_full_catalogue() {
        let mut link = ScriptedLink::new(vec![
            ("0100", "NO DATA\r"),
            ("0120", "NO DATA\r"),
            ("0140", "NO DATA\r"),
        ]);
        let set = scan_supported(&mut link).unwrap();
        assert_eq!(set, PidSet::full_catalogue());
    }
}
