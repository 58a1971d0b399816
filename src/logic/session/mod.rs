//! Protocol Session
//!
//! Owns the physical link: candidate scan, adapter handshake, the fixed
//! query cycle, and the session state machine.

pub mod elm;
pub mod link;
pub mod pids;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::logic::reading::{ObdParameters, Reading};
use link::{LinkError, ObdLink, TcpLink};
use pids::{Pid, PidSet, PID_STATUS};

// ============================================================================
// SESSION STATE
// ============================================================================

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Active,
    /// Link is up but some queries fail intermittently
    Degraded,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session errors
#[derive(Debug)]
pub enum SessionError {
    /// No candidate endpoint answered the liveness probe
    NoLinkAvailable { tried: usize },
    /// Adapter reached but the handshake failed
    Handshake(LinkError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoLinkAvailable { tried } => {
                write!(f, "No OBD link available ({} endpoints tried)", tried)
            }
            Self::Handshake(e) => write!(f, "Adapter handshake failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

// ============================================================================
// SESSION
// ============================================================================

/// One connected vehicle session.
///
/// Created by `open`, driven by `read_cycle`, retired by `close`. All
/// rolling state tied to the link (sequence numbers, supported set) dies
/// with the session; a reconnect is a fresh session.
pub struct ObdSession {
    link: Box<dyn ObdLink>,
    session_id: String,
    vehicle_signature: String,
    state: SessionState,
    sequence: u64,
    /// Catalogue ∩ reported support, fixed at open, queried in order
    cycle_pids: Vec<Pid>,
    status_supported: bool,
}

impl ObdSession {
    /// Try each candidate endpoint in priority order; first adapter that
    /// answers the liveness probe wins.
    pub fn open(candidates: &[String], link_timeout: Duration) -> Result<Self, SessionError> {
        let mut tried = 0;
        for endpoint in candidates {
            tried += 1;
            log::info!("Trying OBD link {}", endpoint);
            match TcpLink::connect(endpoint, link_timeout) {
                Ok(link) => match Self::from_link(Box::new(link)) {
                    Ok(session) => return Ok(session),
                    Err(e) => log::warn!("Handshake failed on {}: {}", endpoint, e),
                },
                Err(e) => log::warn!("Cannot reach {}: {}", endpoint, e),
            }
        }
        Err(SessionError::NoLinkAvailable { tried })
    }

    /// Build a session over an already-connected link: probe, init, scan
    /// supported PIDs, derive the vehicle signature.
    pub fn from_link(mut link: Box<dyn ObdLink>) -> Result<Self, SessionError> {
        let banner = elm::probe(link.as_mut()).map_err(SessionError::Handshake)?;
        elm::initialize(link.as_mut()).map_err(SessionError::Handshake)?;
        let supported = elm::scan_supported(link.as_mut()).map_err(SessionError::Handshake)?;

        let cycle_pids: Vec<Pid> = Pid::ALL
            .iter()
            .copied()
            .filter(|p| supported.contains(p.code()))
            .collect();
        let status_supported = supported.contains(PID_STATUS);
        let vehicle_signature = derive_vehicle_signature(&supported, &banner);
        let session_id = Uuid::new_v4().to_string();

        log::info!(
            "Session {} on {} ({}): {} of {} PIDs supported, vehicle {}",
            &session_id[..8],
            link.endpoint(),
            banner,
            cycle_pids.len(),
            Pid::ALL.len(),
            vehicle_signature
        );

        Ok(Self {
            link,
            session_id,
            vehicle_signature,
            state: SessionState::Active,
            sequence: 0,
            cycle_pids,
            status_supported,
        })
    }

    /// Issue the full query cycle once.
    ///
    /// Total by construction: per-parameter timeouts and garbled replies
    /// leave that slot absent and move on. Only a dead link ends the cycle
    /// early, flipping the session to `Disconnected` for the caller to see.
    pub fn read_cycle(&mut self) -> Reading {
        let mut params = ObdParameters::default();
        let mut attempted = 0u32;
        let mut decoded = 0u32;

        for pid in &self.cycle_pids {
            attempted += 1;
            match elm::query_pid(self.link.as_mut(), *pid) {
                Ok(Some(value)) => {
                    pid.store(&mut params, value);
                    decoded += 1;
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    log::debug!("{} query: {}", pid.name(), e);
                }
                Err(e) => {
                    log::warn!("Link failed mid-cycle: {}", e);
                    self.state = SessionState::Disconnected;
                    break;
                }
            }
        }

        if self.state != SessionState::Disconnected && self.status_supported {
            attempted += 1;
            match elm::query_status(self.link.as_mut()) {
                Ok(Some((mil_on, dtc_count))) => {
                    params.mil_on = Some(mil_on);
                    params.dtc_count = Some(dtc_count);
                    decoded += 1;
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => {
                    log::warn!("Link failed on status query: {}", e);
                    self.state = SessionState::Disconnected;
                }
            }
        }

        if self.state != SessionState::Disconnected {
            self.state = if attempted > 0 && decoded == attempted {
                SessionState::Active
            } else {
                SessionState::Degraded
            };
        }

        self.sequence += 1;
        Reading::new(self.sequence, params, attempted, decoded)
    }

    /// Best-effort protocol close, then drop the link.
    pub fn close(mut self) {
        let _ = self.link.exchange("ATPC");
        log::info!(
            "Session {} closed after {} cycles",
            &self.session_id[..8],
            self.sequence
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn vehicle_signature(&self) -> &str {
        &self.vehicle_signature
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn endpoint(&self) -> &str {
        self.link.endpoint()
    }

    pub fn cycle_len(&self) -> usize {
        self.cycle_pids.len() + usize::from(self.status_supported)
    }
}

/// Truncated SHA-256 over the supported-command fingerprint plus adapter
/// banner. Identifies a vehicle across sessions without needing a VIN.
fn derive_vehicle_signature(supported: &PidSet, banner: &str) -> String {
    let codes: Vec<String> = supported
        .sorted_codes()
        .iter()
        .map(|c| format!("{:02X}", c))
        .collect();
    let material = format!("CMDS:{}|PROTO:{}", codes.join(":"), banner.trim());
    let digest = Sha256::digest(material.as_bytes());
    hex::encode(digest)[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedLink;
    use super::*;

    /// Handshake over a vehicle supporting only PIDs 0x01, 0x05 and 0x0C.
    fn handshake_steps() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ATI", "ELM327 v1.5\r"),
            ("ATZ", "\rELM327 v1.5\r"),
            ("ATE0", "OK\r"),
            ("ATL0", "OK\r"),
            ("ATS0", "OK\r"),
            ("ATSP0", "OK\r"),
            ("0100", "410088100000\r"),
            ("0120", "NO DATA\r"),
            ("0140", "NO DATA\r"),
        ]
    }

    fn open_scripted(extra: Vec<(&'static str, &'static str)>) -> ObdSession {
        let mut steps = handshake_steps();
        steps.extend(extra);
        ObdSession::from_link(Box::new(ScriptedLink::new(steps))).unwrap()
    }

    #[test]
    fn handshake_restricts_cycle_to_supported_pids() {
        let session = open_scripted(vec![]);
        assert_eq!(session.state(), SessionState::Active);
        // coolant temp + rpm from the bitmask, plus the status word
        assert_eq!(session.cycle_len(), 3);
        assert_eq!(session.vehicle_signature().len(), 32);
    }

    #[test]
    fn signature_is_stable_per_vehicle_but_session_id_is_not() {
        let a = open_scripted(vec![]);
        let b = open_scripted(vec![]);
        assert_eq!(a.vehicle_signature(), b.vehicle_signature());
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn read_cycle_decodes_supported_parameters() {
        let mut session = open_scripted(vec![
            ("010C", "410C1AF8\r"),
            ("0105", "41057D\r"),
            ("0101", "410100\r"),
        ]);
        let reading = session.read_cycle();
        assert_eq!(reading.sequence, 1);
        assert_eq!(reading.params.rpm, Some(1726.0));
        assert_eq!(reading.params.coolant_temp, Some(85.0));
        assert_eq!(reading.params.mil_on, Some(false));
        assert_eq!(reading.data_quality(), 100);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn timeout_marks_parameter_absent_and_degrades() {
        let mut steps: Vec<(&str, Result<String, LinkError>)> = handshake_steps()
            .into_iter()
            .map(|(c, r)| (c, Ok(r.to_string())))
            .collect();
        steps.push(("010C", Err(LinkError::Timeout)));
        steps.push(("0105", Ok("41057D\r".to_string())));
        steps.push(("0101", Ok("410183\r".to_string())));

        let mut session = ObdSession::from_link(Box::new(ScriptedLink::with_results(steps))).unwrap();
        let reading = session.read_cycle();
        assert_eq!(reading.params.rpm, None);
        assert_eq!(reading.params.coolant_temp, Some(85.0));
        assert_eq!(reading.params.dtc_count, Some(3));
        assert_eq!(reading.data_quality(), 66);
        assert_eq!(session.state(), SessionState::Degraded);
    }

    #[test]
    fn dead_link_disconnects_mid_cycle() {
        let mut steps: Vec<(&str, Result<String, LinkError>)> = handshake_steps()
            .into_iter()
            .map(|(c, r)| (c, Ok(r.to_string())))
            .collect();
        steps.push(("010C", Err(LinkError::Closed)));

        let mut session = ObdSession::from_link(Box::new(ScriptedLink::with_results(steps))).unwrap();
        let reading = session.read_cycle();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(reading.params.is_empty());
    }

    #[test]
    fn open_with_no_candidates_reports_none_tried() {
        let err = ObdSession::open(&[], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, SessionError::NoLinkAvailable { tried: 0 }));
    }
}
