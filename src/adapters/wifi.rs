//! WiFi radio adapter.
//!
//! Implements [`RadioPort`] over the ESP-IDF WiFi driver in Mixed
//! (AP+STA) operation. Disconnect reason codes from the driver event
//! stream classify failed attempts: 201 (no AP found) and 202/204
//! (auth failure / handshake timeout) are the two cases the control
//! page distinguishes from a plain timeout.
//!
//! The simulation backend ([`SimRadio`]) resolves connection attempts
//! against a configurable network table, so host runs and tests behave
//! deterministically.

use core::net::Ipv4Addr;

use crate::app::ports::{LinkState, NetworkInfo, RadioMode, RadioPort, ScanStatus};
use crate::config::MAX_SCAN_RESULTS;
use crate::error::RadioError;

/// Reason codes from the IDF disconnect event that map to a distinct
/// user-facing failure class.
#[allow(dead_code)]
const REASON_NO_AP_FOUND: u16 = 201;
#[allow(dead_code)]
const REASON_AUTH_FAIL: u16 = 202;
#[allow(dead_code)]
const REASON_HANDSHAKE_TIMEOUT: u16 = 204;

#[cfg(target_os = "espidf")]
pub use espidf::EspRadio;

#[cfg(target_os = "espidf")]
mod espidf {
    use super::*;
    use core::sync::atomic::{AtomicU16, Ordering};

    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{
        AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
        ScanConfig,
    };
    use log::{info, warn};

    /// Reason code of the most recent disconnect event; 0 when none.
    /// Written from the event-loop task, read from the polling task.
    static LAST_DISCONNECT_REASON: AtomicU16 = AtomicU16::new(0);

    pub struct EspRadio {
        wifi: EspWifi<'static>,
        client_config: ClientConfiguration,
        ap_config: AccessPointConfiguration,
        mode: RadioMode,
        attempting: bool,
        scan_active: bool,
        _subscription: esp_idf_svc::eventloop::EspSubscription<
            'static,
            esp_idf_svc::eventloop::System,
        >,
    }

    impl EspRadio {
        pub fn new(
            modem: Modem,
            sysloop: EspSystemEventLoop,
            nvs: EspDefaultNvsPartition,
        ) -> crate::error::Result<Self> {
            let wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))
                .map_err(|_| crate::error::Error::Init("wifi driver"))?;

            let subscription = sysloop
                .subscribe::<esp_idf_svc::wifi::WifiEvent, _>(|event| {
                    if let esp_idf_svc::wifi::WifiEvent::StaDisconnected(disc) = event {
                        LAST_DISCONNECT_REASON.store(disc.reason() as u16, Ordering::Relaxed);
                    }
                })
                .map_err(|_| crate::error::Error::Init("wifi event subscription"))?;

            Ok(Self {
                wifi,
                client_config: ClientConfiguration::default(),
                ap_config: AccessPointConfiguration::default(),
                mode: RadioMode::ApOnly,
                attempting: false,
                scan_active: false,
                _subscription: subscription,
            })
        }

        fn apply_configuration(&mut self) -> Result<(), RadioError> {
            let config = match self.mode {
                RadioMode::ApOnly => Configuration::AccessPoint(self.ap_config.clone()),
                RadioMode::ApSta => {
                    Configuration::Mixed(self.client_config.clone(), self.ap_config.clone())
                }
            };
            self.wifi
                .set_configuration(&config)
                .map_err(|_| RadioError::ModeSwitchFailed)?;
            if !self.wifi.is_started().unwrap_or(false) {
                self.wifi.start().map_err(|_| RadioError::ModeSwitchFailed)?;
            }
            Ok(())
        }
    }

    impl RadioPort for EspRadio {
        fn disconnect(&mut self) {
            self.attempting = false;
            LAST_DISCONNECT_REASON.store(0, Ordering::Relaxed);
            if let Err(e) = self.wifi.disconnect() {
                // Not associated is the common case here.
                log::debug!("disconnect: {e}");
            }
        }

        fn set_mode(&mut self, mode: RadioMode) {
            self.mode = mode;
            if let Err(e) = self.apply_configuration() {
                warn!("mode switch to {mode:?} failed: {e}");
            }
        }

        fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
            self.ap_config = AccessPointConfiguration {
                ssid: ssid.try_into().map_err(|()| RadioError::InvalidSsid)?,
                password: password
                    .try_into()
                    .map_err(|()| RadioError::InvalidPassword)?,
                auth_method: if password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            };
            self.apply_configuration()?;
            info!("AP '{ssid}' up");
            Ok(())
        }

        fn stop_access_point(&mut self) {
            let config = Configuration::Client(self.client_config.clone());
            if let Err(e) = self.wifi.set_configuration(&config) {
                warn!("AP teardown failed: {e}");
            }
        }

        fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
            self.client_config = ClientConfiguration {
                ssid: ssid.try_into().map_err(|()| RadioError::InvalidSsid)?,
                password: password
                    .try_into()
                    .map_err(|()| RadioError::InvalidPassword)?,
                auth_method: if password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            };
            self.apply_configuration()?;
            LAST_DISCONNECT_REASON.store(0, Ordering::Relaxed);
            self.wifi
                .connect()
                .map_err(|_| RadioError::ModeSwitchFailed)?;
            self.attempting = true;
            Ok(())
        }

        fn start_scan(&mut self) -> Result<(), RadioError> {
            self.wifi
                .driver_mut()
                .start_scan(&ScanConfig::default(), false)
                .map_err(|_| RadioError::ScanFailed)?;
            self.scan_active = true;
            Ok(())
        }

        fn poll_scan(&mut self) -> ScanStatus {
            if !self.scan_active {
                return ScanStatus::Idle;
            }
            match self.wifi.driver().is_scan_done() {
                Ok(false) => ScanStatus::Running,
                Ok(true) => {
                    self.scan_active = false;
                    match self.wifi.driver_mut().get_scan_result() {
                        Ok(aps) => {
                            let mut list = heapless::Vec::new();
                            for ap in aps.into_iter().take(MAX_SCAN_RESULTS) {
                                let entry = NetworkInfo {
                                    ssid: ap.ssid.clone(),
                                    rssi: ap.signal_strength,
                                    open: ap.auth_method == Some(AuthMethod::None)
                                        || ap.auth_method.is_none(),
                                };
                                if list.push(entry).is_err() {
                                    break;
                                }
                            }
                            ScanStatus::Done(list)
                        }
                        Err(e) => {
                            warn!("scan result fetch failed: {e}");
                            ScanStatus::Failed
                        }
                    }
                }
                Err(e) => {
                    warn!("scan poll failed: {e}");
                    self.scan_active = false;
                    ScanStatus::Failed
                }
            }
        }

        fn link_state(&self) -> LinkState {
            match LAST_DISCONNECT_REASON.load(Ordering::Relaxed) {
                REASON_NO_AP_FOUND => return LinkState::NoApFound,
                REASON_AUTH_FAIL | REASON_HANDSHAKE_TIMEOUT => return LinkState::AuthFailed,
                _ => {}
            }
            if self.wifi.is_connected().unwrap_or(false) {
                LinkState::Connected
            } else if self.attempting {
                LinkState::Connecting
            } else {
                LinkState::Disconnected
            }
        }

        fn sta_ip(&self) -> Option<Ipv4Addr> {
            self.wifi
                .sta_netif()
                .get_ip_info()
                .ok()
                .map(|info| info.ip)
                .filter(|ip| !ip.is_unspecified())
        }

        fn ap_ip(&self) -> Ipv4Addr {
            self.wifi
                .ap_netif()
                .get_ip_info()
                .map(|info| info.ip)
                .unwrap_or(Ipv4Addr::new(192, 168, 4, 1))
        }
    }
}

// ── Simulation backend ─────────────────────────────────────────────

/// A network the simulated radio can see.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    pub ssid: String,
    /// `None` means an open network.
    pub password: Option<String>,
    pub rssi: i8,
}

/// Deterministic radio for host runs and tests.
///
/// Scans finish after [`SCAN_POLLS`](Self::SCAN_POLLS) polls; a station
/// attempt resolves after [`CONNECT_POLLS`](Self::CONNECT_POLLS) reads
/// of [`link_state`](RadioPort::link_state), against the configured
/// network table.
pub struct SimRadio {
    networks: Vec<SimNetwork>,
    mode: RadioMode,
    ap_up: bool,
    /// When set, station attempts never resolve (timeout testing).
    stall_attempts: bool,
    scan_polls_left: Option<u32>,
    pending_outcome: core::cell::Cell<Option<(LinkState, u32)>>,
    link: core::cell::Cell<LinkState>,
    sta_ip: core::cell::Cell<Option<Ipv4Addr>>,
    /// Every port call, in order, for assertions.
    pub call_log: Vec<String>,
}

impl SimRadio {
    pub const SCAN_POLLS: u32 = 2;
    pub const CONNECT_POLLS: u32 = 2;

    pub fn new() -> Self {
        Self {
            networks: Vec::new(),
            mode: RadioMode::ApOnly,
            ap_up: false,
            stall_attempts: false,
            scan_polls_left: None,
            pending_outcome: core::cell::Cell::new(None),
            link: core::cell::Cell::new(LinkState::Disconnected),
            sta_ip: core::cell::Cell::new(None),
            call_log: Vec::new(),
        }
    }

    pub fn with_network(mut self, ssid: &str, password: Option<&str>, rssi: i8) -> Self {
        self.networks.push(SimNetwork {
            ssid: ssid.to_owned(),
            password: password.map(str::to_owned),
            rssi,
        });
        self
    }

    /// Make every station attempt hang in `Connecting` forever.
    pub fn stalling(mut self) -> Self {
        self.stall_attempts = true;
        self
    }

    pub fn ap_up(&self) -> bool {
        self.ap_up
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    fn resolve_attempt(&self, ssid: &str, password: &str) -> LinkState {
        match self.networks.iter().find(|n| n.ssid == ssid) {
            None => LinkState::NoApFound,
            Some(n) => match &n.password {
                None => LinkState::Connected,
                Some(expected) if expected == password => LinkState::Connected,
                Some(_) => LinkState::AuthFailed,
            },
        }
    }
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioPort for SimRadio {
    fn disconnect(&mut self) {
        self.call_log.push("disconnect".to_owned());
        self.link.set(LinkState::Disconnected);
        self.pending_outcome.set(None);
        self.sta_ip.set(None);
    }

    fn set_mode(&mut self, mode: RadioMode) {
        self.call_log.push(format!("set_mode {mode:?}"));
        self.mode = mode;
        // A mode switch drops the AP, as on the real driver.
        self.ap_up = false;
    }

    fn start_access_point(&mut self, ssid: &str, _password: &str) -> Result<(), RadioError> {
        self.call_log.push(format!("start_ap {ssid}"));
        if ssid.is_empty() {
            return Err(RadioError::InvalidSsid);
        }
        self.ap_up = true;
        Ok(())
    }

    fn stop_access_point(&mut self) {
        self.call_log.push("stop_ap".to_owned());
        self.ap_up = false;
    }

    fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        self.call_log.push(format!("begin_station {ssid}"));
        if ssid.is_empty() {
            return Err(RadioError::InvalidSsid);
        }
        let outcome = self.resolve_attempt(ssid, password);
        let polls = if self.stall_attempts {
            u32::MAX
        } else {
            Self::CONNECT_POLLS
        };
        self.pending_outcome.set(Some((outcome, polls)));
        self.link.set(LinkState::Connecting);
        Ok(())
    }

    fn start_scan(&mut self) -> Result<(), RadioError> {
        self.call_log.push("start_scan".to_owned());
        self.scan_polls_left = Some(Self::SCAN_POLLS);
        Ok(())
    }

    fn poll_scan(&mut self) -> ScanStatus {
        match self.scan_polls_left {
            None => ScanStatus::Idle,
            Some(0) => {
                self.scan_polls_left = None;
                let mut list = heapless::Vec::new();
                for n in self.networks.iter().take(MAX_SCAN_RESULTS) {
                    let mut ssid = heapless::String::new();
                    for ch in n.ssid.chars() {
                        if ssid.push(ch).is_err() {
                            break;
                        }
                    }
                    let entry = NetworkInfo {
                        ssid,
                        rssi: n.rssi,
                        open: n.password.is_none(),
                    };
                    if list.push(entry).is_err() {
                        break;
                    }
                }
                ScanStatus::Done(list)
            }
            Some(left) => {
                self.scan_polls_left = Some(left - 1);
                ScanStatus::Running
            }
        }
    }

    /// Each read advances the pending attempt, so polling callers see
    /// `Connecting` for a few ticks before the outcome lands.
    fn link_state(&self) -> LinkState {
        if let Some((outcome, left)) = self.pending_outcome.get() {
            if left == 0 {
                self.link.set(outcome);
                if outcome == LinkState::Connected {
                    self.sta_ip.set(Some(Ipv4Addr::new(192, 168, 1, 50)));
                }
                self.pending_outcome.set(None);
            } else {
                self.pending_outcome.set(Some((outcome, left - 1)));
            }
        }
        self.link.get()
    }

    fn sta_ip(&self) -> Option<Ipv4Addr> {
        self.sta_ip.get()
    }

    fn ap_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 4, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_runs_then_reports_networks() {
        let mut radio = SimRadio::new()
            .with_network("HomeNet", Some("pw"), -40)
            .with_network("CoffeeShop", None, -70);
        radio.start_scan().unwrap();

        assert_eq!(radio.poll_scan(), ScanStatus::Running);
        assert_eq!(radio.poll_scan(), ScanStatus::Running);
        let ScanStatus::Done(list) = radio.poll_scan() else {
            panic!("expected Done");
        };
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].ssid.as_str(), "HomeNet");
        assert!(!list[0].open);
        assert!(list[1].open);
        assert_eq!(radio.poll_scan(), ScanStatus::Idle);
    }

    #[test]
    fn connect_outcomes_follow_network_table() {
        let mut radio = SimRadio::new().with_network("HomeNet", Some("pw"), -40);

        radio.begin_station("HomeNet", "pw").unwrap();
        assert_eq!(radio.link_state(), LinkState::Connecting);
        let settled = settle(&radio);
        assert_eq!(settled, LinkState::Connected);
        assert!(radio.sta_ip().is_some());

        radio.begin_station("HomeNet", "wrong").unwrap();
        assert_eq!(settle(&radio), LinkState::AuthFailed);

        radio.begin_station("Nowhere", "").unwrap();
        assert_eq!(settle(&radio), LinkState::NoApFound);
    }

    fn settle(radio: &SimRadio) -> LinkState {
        let mut last = radio.link_state();
        for _ in 0..=SimRadio::CONNECT_POLLS {
            last = radio.link_state();
        }
        last
    }

    #[test]
    fn mode_switch_drops_ap() {
        let mut radio = SimRadio::new();
        radio.start_access_point("VizBot-Setup", "vizbot123").unwrap();
        assert!(radio.ap_up());
        radio.set_mode(RadioMode::ApSta);
        assert!(!radio.ap_up(), "mode switch must drop the AP");
    }
}
