//! WiFi provisioning state machine.
//!
//! Owns the setup access point lifecycle, asynchronous network scans,
//! station connection attempts with timeout and failure classification,
//! credential verification, and the AP linger/teardown after a
//! successful handoff.
//!
//! Two contexts touch this machine. Request handlers call the
//! `request_*` entry points, which never block and never switch radio
//! modes themselves; a connect request only fills the scratch buffers
//! and parks the machine in `ConnectRequested` (a single-slot mailbox,
//! last write wins). The polling task calls [`Provisioner::poll`] each
//! tick and performs every radio side effect, so all state transitions
//! are totally ordered by that one context.

pub mod credentials;

use log::{info, warn};

use crate::app::ports::{
    ClockPort, LinkState, NameServicePort, NetworkInfo, RadioMode, RadioPort, ScanStatus,
    StoragePort,
};
use crate::config::{MAX_SCAN_RESULTS, SystemConfig};
use crate::error::ConnectFailure;
use crate::status::SystemStatus;

/// Provisioning states.
///
/// `Idle` and `StaActive` are stable rest states; `Failed` is stable
/// until a new request or a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvState {
    Idle,
    Scanning,
    ScanDone,
    ConnectRequested,
    Connecting,
    Connected,
    Failed,
    StaActive,
}

impl ProvState {
    /// The wire name used in the status document. `ConnectRequested` is
    /// reported as `connecting`: the mailbox hop is an internal detail
    /// the control page has no use for.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::ScanDone => "scan_done",
            Self::ConnectRequested | Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::StaActive => "sta_active",
        }
    }
}

/// The provisioning state machine. All radio, storage, name-service and
/// clock access goes through injected ports.
pub struct Provisioner {
    state: ProvState,
    /// Scratch credential buffers for the in-flight attempt.
    pending_ssid: heapless::String<32>,
    pending_pass: heapless::String<63>,
    networks: heapless::Vec<NetworkInfo, MAX_SCAN_RESULTS>,
    attempt_started_ms: u64,
    connected_at_ms: u64,
    failure: Option<ConnectFailure>,

    ap_ssid: heapless::String<32>,
    ap_password: heapless::String<63>,
    connect_timeout_ms: u32,
    ap_linger_ms: u32,
}

impl Provisioner {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            state: ProvState::Idle,
            pending_ssid: heapless::String::new(),
            pending_pass: heapless::String::new(),
            networks: heapless::Vec::new(),
            attempt_started_ms: 0,
            connected_at_ms: 0,
            failure: None,
            ap_ssid: config.ap_ssid.clone(),
            ap_password: config.ap_password.clone(),
            connect_timeout_ms: config.connect_timeout_ms,
            ap_linger_ms: config.ap_linger_ms,
        }
    }

    pub fn state(&self) -> ProvState {
        self.state
    }

    pub fn failure(&self) -> Option<ConnectFailure> {
        self.failure
    }

    pub fn networks(&self) -> &[NetworkInfo] {
        &self.networks
    }

    // ── request ingestion (handler context, non-blocking) ──────────

    /// Start an asynchronous scan. Accepted from the rest states
    /// (`Idle`, `ScanDone`, `Failed`); ignored while a scan or connect
    /// attempt is in flight.
    pub fn request_scan<R: RadioPort>(&mut self, radio: &mut R) {
        match self.state {
            ProvState::Idle | ProvState::ScanDone | ProvState::Failed => {}
            _ => {
                info!("scan request ignored in state {:?}", self.state);
                return;
            }
        }
        self.networks.clear();
        self.failure = None;
        match radio.start_scan() {
            Ok(()) => {
                info!("scan started");
                self.state = ProvState::Scanning;
            }
            Err(e) => {
                // A scan that cannot start reads as "nothing found".
                warn!("scan start failed: {e}");
                self.state = ProvState::ScanDone;
            }
        }
    }

    /// Accept a connect request. Copies the credentials into the scratch
    /// buffers (truncating at the radio limits), persists them
    /// unverified, and parks in `ConnectRequested` for the polling task.
    /// Never touches the radio.
    pub fn request_connect<S: StoragePort>(&mut self, store: &mut S, ssid: &str, pass: &str) {
        self.pending_ssid.clear();
        self.pending_pass.clear();
        copy_truncated(&mut self.pending_ssid, ssid);
        copy_truncated(&mut self.pending_pass, pass);
        self.networks.clear();
        self.failure = None;

        if let Err(e) =
            credentials::save_unverified(store, &self.pending_ssid, &self.pending_pass)
        {
            // Still attempt the connection; only persistence is lost.
            warn!("could not persist credentials: {e}");
        }
        info!("connect requested for '{}'", self.pending_ssid);
        self.state = ProvState::ConnectRequested;
    }

    /// Forget everything: clear persisted credentials, restore the setup
    /// access point if the station path had taken over, return to `Idle`.
    pub fn reset<R, N, S>(&mut self, radio: &mut R, names: &mut N, store: &mut S, status: &mut SystemStatus)
    where
        R: RadioPort,
        N: NameServicePort,
        S: StoragePort,
    {
        info!("provisioning reset from {:?}", self.state);
        if let Err(e) = credentials::clear(store) {
            warn!("credential clear failed: {e}");
        }

        if matches!(self.state, ProvState::Connected | ProvState::StaActive) {
            radio.disconnect();
            radio.set_mode(RadioMode::ApOnly);
            if let Err(e) = radio.start_access_point(&self.ap_ssid, &self.ap_password) {
                warn!("AP restore failed: {e}");
            }
            names.start_captive_dns();
            names.restart_mdns();
            status.station_down();
            status.dns_ready = true;
        }

        self.pending_ssid.clear();
        self.pending_pass.clear();
        self.networks.clear();
        self.failure = None;
        self.state = ProvState::Idle;
    }

    // ── polling task ───────────────────────────────────────────────

    /// Advance the machine one tick. Non-blocking; all timing comes from
    /// the caller's `now_ms`.
    pub fn poll<R, N, S>(
        &mut self,
        now_ms: u64,
        radio: &mut R,
        names: &mut N,
        store: &mut S,
        status: &mut SystemStatus,
    ) where
        R: RadioPort,
        N: NameServicePort,
        S: StoragePort,
    {
        match self.state {
            ProvState::Scanning => self.poll_scan(radio),
            ProvState::ConnectRequested => self.begin_connect(now_ms, radio),
            ProvState::Connecting => self.poll_connect(now_ms, radio, names, store, status),
            ProvState::Connected => self.poll_linger(now_ms, radio, names, status),
            _ => {}
        }
    }

    fn poll_scan<R: RadioPort>(&mut self, radio: &mut R) {
        match radio.poll_scan() {
            ScanStatus::Running | ScanStatus::Idle => {}
            ScanStatus::Done(list) => {
                info!("scan finished: {} network(s)", list.len());
                self.networks = list;
                self.state = ProvState::ScanDone;
            }
            ScanStatus::Failed => {
                warn!("scan failed; reporting zero networks");
                self.networks.clear();
                self.state = ProvState::ScanDone;
            }
        }
    }

    /// The radio sequence the handler context is forbidden to run:
    /// drop any prior session, go dual AP+STA, re-establish the AP
    /// (a mode switch drops it), then start the station attempt.
    fn begin_connect<R: RadioPort>(&mut self, now_ms: u64, radio: &mut R) {
        radio.disconnect();
        radio.set_mode(RadioMode::ApSta);
        if let Err(e) = radio.start_access_point(&self.ap_ssid, &self.ap_password) {
            warn!("AP re-establish failed: {e}");
        }
        match radio.begin_station(&self.pending_ssid, &self.pending_pass) {
            Ok(()) => {
                info!("station attempt started for '{}'", self.pending_ssid);
                self.attempt_started_ms = now_ms;
                self.state = ProvState::Connecting;
            }
            Err(e) => {
                warn!("station attempt rejected: {e}");
                self.attempt_started_ms = now_ms;
                // Let the normal timeout path classify and clean up.
                self.state = ProvState::Connecting;
            }
        }
    }

    fn poll_connect<R, N, S>(
        &mut self,
        now_ms: u64,
        radio: &mut R,
        names: &mut N,
        store: &mut S,
        status: &mut SystemStatus,
    ) where
        R: RadioPort,
        N: NameServicePort,
        S: StoragePort,
    {
        match radio.link_state() {
            LinkState::Connected => {
                if let Err(e) = credentials::mark_verified(store) {
                    warn!("could not mark credentials verified: {e}");
                }
                if let Some(ip) = radio.sta_ip() {
                    status.station_up(ip);
                    info!("connected to '{}' at {ip}", self.pending_ssid);
                }
                names.restart_mdns();
                self.connected_at_ms = now_ms;
                self.failure = None;
                self.state = ProvState::Connected;
                return;
            }
            LinkState::NoApFound => {
                self.fail_attempt(radio, store, status, ConnectFailure::NetworkNotFound);
                return;
            }
            LinkState::AuthFailed => {
                self.fail_attempt(radio, store, status, ConnectFailure::AuthRejected);
                return;
            }
            LinkState::Connecting | LinkState::Disconnected => {}
        }

        if now_ms.saturating_sub(self.attempt_started_ms) >= u64::from(self.connect_timeout_ms) {
            self.fail_attempt(radio, store, status, ConnectFailure::TimedOut);
        }
    }

    /// Revert to AP-only and clear the now-known-bad credentials so boot
    /// auto-connect will not retry them.
    fn fail_attempt<R: RadioPort, S: StoragePort>(
        &mut self,
        radio: &mut R,
        store: &mut S,
        status: &mut SystemStatus,
        reason: ConnectFailure,
    ) {
        warn!("connect to '{}' failed: {reason}", self.pending_ssid);
        radio.disconnect();
        radio.set_mode(RadioMode::ApOnly);
        if let Err(e) = radio.start_access_point(&self.ap_ssid, &self.ap_password) {
            warn!("AP restore failed: {e}");
        }
        if let Err(e) = credentials::clear(store) {
            warn!("credential clear failed: {e}");
        }
        status.station_down();
        self.failure = Some(reason);
        self.state = ProvState::Failed;
    }

    /// Keep the AP up for the linger period so the phone on it can see
    /// the success, then tear down the setup surface.
    fn poll_linger<R: RadioPort, N: NameServicePort>(
        &mut self,
        now_ms: u64,
        radio: &mut R,
        names: &mut N,
        status: &mut SystemStatus,
    ) {
        if now_ms.saturating_sub(self.connected_at_ms) >= u64::from(self.ap_linger_ms) {
            info!("linger elapsed; dropping setup AP");
            names.stop_captive_dns();
            radio.stop_access_point();
            status.dns_ready = false;
            self.state = ProvState::StaActive;
        }
    }

    // ── boot ───────────────────────────────────────────────────────

    /// Synchronous connect attempt with saved credentials, run once at
    /// boot before the concurrent contexts start (the one place blocking
    /// is allowed). Only a verified record is honoured. Failure is
    /// silent: the setup AP stays up and no `reason` is surfaced.
    ///
    /// Returns `true` when the station link came up; the machine is then
    /// in `Connected` and the normal linger path applies.
    pub fn boot_auto_connect<R, N, S, C>(
        &mut self,
        radio: &mut R,
        names: &mut N,
        store: &mut S,
        clock: &C,
        status: &mut SystemStatus,
    ) -> bool
    where
        R: RadioPort,
        N: NameServicePort,
        S: StoragePort,
        C: ClockPort,
    {
        let Some(saved) = credentials::load_verified(store) else {
            info!("no verified credentials; staying in setup mode");
            return false;
        };
        info!("auto-connecting to '{}'", saved.ssid);
        self.pending_ssid = saved.ssid;
        self.pending_pass = saved.pass;

        radio.set_mode(RadioMode::ApSta);
        if let Err(e) = radio.start_access_point(&self.ap_ssid, &self.ap_password) {
            warn!("AP re-establish failed: {e}");
        }
        if let Err(e) = radio.begin_station(&self.pending_ssid, &self.pending_pass) {
            warn!("auto-connect start failed: {e}");
            radio.set_mode(RadioMode::ApOnly);
            if let Err(e) = radio.start_access_point(&self.ap_ssid, &self.ap_password) {
                warn!("AP restore failed: {e}");
            }
            return false;
        }

        let deadline = clock.now_ms() + u64::from(self.connect_timeout_ms);
        loop {
            match radio.link_state() {
                LinkState::Connected => {
                    if let Some(ip) = radio.sta_ip() {
                        status.station_up(ip);
                        info!("auto-connected at {ip}");
                    }
                    names.restart_mdns();
                    self.connected_at_ms = clock.now_ms();
                    self.state = ProvState::Connected;
                    return true;
                }
                LinkState::NoApFound | LinkState::AuthFailed => break,
                LinkState::Connecting | LinkState::Disconnected => {
                    if clock.now_ms() >= deadline {
                        break;
                    }
                    clock.delay_ms(250);
                }
            }
        }

        info!("auto-connect failed; setup AP remains");
        radio.disconnect();
        radio.set_mode(RadioMode::ApOnly);
        if let Err(e) = radio.start_access_point(&self.ap_ssid, &self.ap_password) {
            warn!("AP restore failed: {e}");
        }
        status.station_down();
        self.state = ProvState::Idle;
        false
    }

    // ── status document ────────────────────────────────────────────

    /// Build the `/wifi/status` JSON document. Fields are conditional on
    /// state: `ssid` once a name is known, `ip` while station-connected,
    /// `reason` only when failed, `networks` only with fresh scan
    /// results.
    pub fn status_json(&self, status: &SystemStatus) -> String {
        let mut doc = serde_json::Map::new();
        doc.insert(
            "state".to_owned(),
            serde_json::Value::from(self.state.as_str()),
        );
        if !self.pending_ssid.is_empty() {
            doc.insert(
                "ssid".to_owned(),
                serde_json::Value::from(self.pending_ssid.as_str()),
            );
        }
        if let Some(ip) = status.sta_ip {
            doc.insert("ip".to_owned(), serde_json::Value::from(ip.to_string()));
        }
        if self.state == ProvState::Failed {
            if let Some(reason) = self.failure {
                doc.insert(
                    "reason".to_owned(),
                    serde_json::Value::from(reason.as_str()),
                );
            }
        }
        if self.state == ProvState::ScanDone {
            let networks: Vec<serde_json::Value> = self
                .networks
                .iter()
                .map(|n| {
                    serde_json::json!({
                        "ssid": n.ssid.as_str(),
                        "rssi": n.rssi,
                        "open": n.open,
                    })
                })
                .collect();
            doc.insert("networks".to_owned(), serde_json::Value::from(networks));
        }
        serde_json::Value::Object(doc).to_string()
    }
}

/// Copy as many whole characters of `src` as fit.
fn copy_truncated<const N: usize>(dst: &mut heapless::String<N>, src: &str) {
    for ch in src.chars() {
        if dst.push(ch).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_wire_names() {
        assert_eq!(ProvState::Idle.as_str(), "idle");
        assert_eq!(ProvState::ConnectRequested.as_str(), "connecting");
        assert_eq!(ProvState::Connecting.as_str(), "connecting");
        assert_eq!(ProvState::StaActive.as_str(), "sta_active");
    }

    #[test]
    fn copy_truncated_respects_char_boundaries() {
        let mut s: heapless::String<5> = heapless::String::new();
        copy_truncated(&mut s, "ééé");
        assert_eq!(s.as_str(), "éé");
    }

    #[test]
    fn idle_status_json_has_only_state() {
        let prov = Provisioner::new(&SystemConfig::default());
        let status = SystemStatus::default();
        let doc: serde_json::Value =
            serde_json::from_str(&prov.status_json(&status)).unwrap();
        assert_eq!(doc["state"], "idle");
        assert!(doc.get("ssid").is_none());
        assert!(doc.get("reason").is_none());
        assert!(doc.get("networks").is_none());
    }
}
