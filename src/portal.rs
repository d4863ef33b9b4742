//! Control-surface request dispatch.
//!
//! Pure GET routing: path + query string in, response out. Each request
//! maps to exactly one command enqueue or provisioning action; the HTTP
//! server adapter in `main.rs` is a thin shim over [`dispatch`]. Keeping
//! the routing free of server types makes every endpoint host-testable.
//!
//! Connectivity-check probes from phone OSes are answered with a
//! redirect to the device's own address so the control page pops up as
//! a captive portal.

use core::net::Ipv4Addr;

use crate::app::Command;
use crate::app::ports::{NameServicePort, RadioPort, StoragePort};
use crate::config::{
    BRIGHTNESS_MAX, BRIGHTNESS_MIN, FACE_PALETTE, NUM_BG_STYLES, NUM_EXPRESSIONS,
    SAY_DURATION_DEFAULT_MS, SAY_DURATION_MAX_MS, SAY_DURATION_MIN_MS,
};
use crate::coordinator::Coordinator;
use crate::provisioning::Provisioner;
use crate::status::SystemStatus;

/// Paths phone OSes probe to detect a captive portal.
const CONNECTIVITY_PROBES: &[&str] = &[
    "/generate_204",
    "/gen_204",
    "/hotspot-detect.html",
    "/library/test/success.html",
    "/ncsi.txt",
    "/connecttest.txt",
    "/redirect",
    "/canonical.html",
    "/success.txt",
    "/fwlink",
];

/// A response ready for the HTTP shim to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub content_type: &'static str,
    pub body: String,
    /// `Location` header for redirects.
    pub location: Option<String>,
}

impl Response {
    fn ok() -> Self {
        Self {
            code: 200,
            content_type: "text/plain",
            body: "OK".to_owned(),
            location: None,
        }
    }

    fn json(body: String) -> Self {
        Self {
            code: 200,
            content_type: "application/json",
            body,
            location: None,
        }
    }

    fn bad_request(msg: &str) -> Self {
        Self {
            code: 400,
            content_type: "text/plain",
            body: msg.to_owned(),
            location: None,
        }
    }

    fn not_found() -> Self {
        Self {
            code: 404,
            content_type: "text/plain",
            body: "Not found".to_owned(),
            location: None,
        }
    }

    fn redirect(to: String) -> Self {
        Self {
            code: 302,
            content_type: "text/plain",
            body: String::new(),
            location: Some(to),
        }
    }
}

/// Route one GET request.
///
/// Control endpoints always answer 200 even when the underlying action
/// later fails asynchronously; the single 400 case is a connect request
/// without an `ssid`.
#[allow(clippy::too_many_arguments)]
pub fn dispatch<R, N, S>(
    path: &str,
    query: &str,
    coordinator: &Coordinator,
    prov: &mut Provisioner,
    radio: &mut R,
    names: &mut N,
    store: &mut S,
    status: &mut SystemStatus,
    brightness: u8,
) -> Response
where
    R: RadioPort,
    N: NameServicePort,
    S: StoragePort,
{
    match path {
        "/brightness" => {
            if let Some(v) = int_param(query, "v") {
                let level = v.clamp(i64::from(BRIGHTNESS_MIN), i64::from(BRIGHTNESS_MAX)) as u8;
                coordinator.enqueue(Command::SetBrightness(level));
            }
            Response::ok()
        }
        "/bot/expression" => {
            if let Some(v) = int_param(query, "v") {
                let idx = v.clamp(0, i64::from(NUM_EXPRESSIONS - 1)) as u8;
                coordinator.enqueue(Command::SetExpression(idx));
            }
            Response::ok()
        }
        "/bot/say" => {
            let text = string_param(query, "text").unwrap_or_default();
            let dur = int_param(query, "dur")
                .map_or(SAY_DURATION_DEFAULT_MS, |d| {
                    d.clamp(i64::from(SAY_DURATION_MIN_MS), i64::from(SAY_DURATION_MAX_MS)) as u16
                });
            coordinator.enqueue(Command::say(&text, dur));
            Response::ok()
        }
        "/bot/time" => {
            match int_param(query, "v") {
                Some(2) => {
                    coordinator.enqueue(Command::ToggleTimeOverlay);
                }
                Some(v) => {
                    coordinator.enqueue(Command::SetTimeOverlay(v == 1));
                }
                None => {}
            }
            Response::ok()
        }
        "/bot/background" => {
            if let Some(v) = int_param(query, "v") {
                let idx = v.clamp(0, FACE_PALETTE.len() as i64 - 1) as usize;
                coordinator.enqueue(Command::SetFaceColor(FACE_PALETTE[idx]));
            }
            if let Some(style) = int_param(query, "style") {
                let idx = style.clamp(0, i64::from(NUM_BG_STYLES - 1)) as u8;
                coordinator.enqueue(Command::SetBackgroundStyle(idx));
            }
            Response::ok()
        }
        "/wifi/scan" => {
            prov.request_scan(radio);
            Response::ok()
        }
        "/wifi/connect" => {
            let Some(ssid) = string_param(query, "ssid").filter(|s| !s.is_empty()) else {
                return Response::bad_request("Missing ssid");
            };
            let pass = string_param(query, "pass").unwrap_or_default();
            prov.request_connect(store, &ssid, &pass);
            Response::ok()
        }
        "/wifi/status" => Response::json(prov.status_json(status)),
        "/wifi/reset" => {
            prov.reset(radio, names, store, status);
            Response::ok()
        }
        "/state" => Response::json(state_json(status, brightness)),
        p if CONNECTIVITY_PROBES.contains(&p) => {
            Response::redirect(portal_url(status.ap_ip))
        }
        _ => Response::not_found(),
    }
}

fn portal_url(ap_ip: Ipv4Addr) -> String {
    format!("http://{ap_ip}/")
}

fn state_json(status: &SystemStatus, brightness: u8) -> String {
    serde_json::json!({
        "brightness": brightness,
        "wifi": status.wifi_ready,
        "mdns": status.mdns_ready,
        "dns": status.dns_ready,
        "sta": status.sta_connected,
    })
    .to_string()
}

// ── query string parsing ───────────────────────────────────────────

/// Look up a query parameter and percent-decode its value.
fn string_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| percent_decode(v))
}

fn int_param(query: &str, key: &str) -> Option<i64> {
    string_param(query, key).and_then(|v| v.trim().parse().ok())
}

/// Decode `%XX` escapes and `+`-encoded spaces. Malformed escapes pass
/// through verbatim.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if let (Some(hi), Some(lo)) = (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    out.push((hi * 16 + lo) as u8);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;
    use crate::adapters::wifi::SimRadio;
    use crate::app::Command;
    use crate::config::SystemConfig;
    use crate::provisioning::ProvState;

    struct NullNames;
    impl NameServicePort for NullNames {
        fn restart_mdns(&mut self) {}
        fn start_captive_dns(&mut self) {}
        fn stop_captive_dns(&mut self) {}
    }

    struct Ctx {
        coordinator: Coordinator,
        prov: Provisioner,
        radio: SimRadio,
        names: NullNames,
        store: NvsAdapter,
        status: SystemStatus,
    }

    impl Ctx {
        fn new() -> Self {
            Self {
                coordinator: Coordinator::new(),
                prov: Provisioner::new(&SystemConfig::default()),
                radio: SimRadio::new(),
                names: NullNames,
                store: NvsAdapter::new().unwrap(),
                status: SystemStatus::default(),
            }
        }

        fn get(&mut self, path: &str, query: &str) -> Response {
            dispatch(
                path,
                query,
                &self.coordinator,
                &mut self.prov,
                &mut self.radio,
                &mut self.names,
                &mut self.store,
                &mut self.status,
                15,
            )
        }

        fn drained(&mut self) -> Vec<Command> {
            let mut cmds = Vec::new();
            self.coordinator.drain(|c| cmds.push(c));
            cmds
        }
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("hello+world"), "hello world");
        assert_eq!(percent_decode("caf%C3%A9"), "café");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn brightness_clamped_at_dispatch() {
        let mut ctx = Ctx::new();
        assert_eq!(ctx.get("/brightness", "v=99").code, 200);
        assert_eq!(ctx.drained(), vec![Command::SetBrightness(50)]);

        ctx.get("/brightness", "v=-3");
        assert_eq!(ctx.drained(), vec![Command::SetBrightness(1)]);
    }

    #[test]
    fn missing_param_is_still_ok_but_enqueues_nothing() {
        let mut ctx = Ctx::new();
        assert_eq!(ctx.get("/brightness", "").code, 200);
        assert!(ctx.drained().is_empty());
    }

    #[test]
    fn say_defaults_and_clamps_duration() {
        let mut ctx = Ctx::new();
        ctx.get("/bot/say", "text=hi+there");
        assert_eq!(ctx.drained(), vec![Command::say("hi there", 4000)]);

        ctx.get("/bot/say", "text=x&dur=99999");
        assert_eq!(ctx.drained(), vec![Command::say("x", 10_000)]);
    }

    #[test]
    fn time_overlay_modes() {
        let mut ctx = Ctx::new();
        ctx.get("/bot/time", "v=1");
        ctx.get("/bot/time", "v=0");
        ctx.get("/bot/time", "v=2");
        assert_eq!(
            ctx.drained(),
            vec![
                Command::SetTimeOverlay(true),
                Command::SetTimeOverlay(false),
                Command::ToggleTimeOverlay,
            ]
        );
    }

    #[test]
    fn background_color_and_style() {
        let mut ctx = Ctx::new();
        ctx.get("/bot/background", "v=2&style=9");
        assert_eq!(
            ctx.drained(),
            vec![
                Command::SetFaceColor(FACE_PALETTE[2]),
                Command::SetBackgroundStyle(NUM_BG_STYLES - 1),
            ]
        );
    }

    #[test]
    fn connect_requires_ssid() {
        let mut ctx = Ctx::new();
        let resp = ctx.get("/wifi/connect", "pass=secret");
        assert_eq!(resp.code, 400);
        assert_eq!(ctx.prov.state(), ProvState::Idle);

        let resp = ctx.get("/wifi/connect", "ssid=Home+Net&pass=secret");
        assert_eq!(resp.code, 200);
        assert_eq!(ctx.prov.state(), ProvState::ConnectRequested);
    }

    #[test]
    fn scan_endpoint_starts_scan() {
        let mut ctx = Ctx::new();
        assert_eq!(ctx.get("/wifi/scan", "").code, 200);
        assert_eq!(ctx.prov.state(), ProvState::Scanning);
    }

    #[test]
    fn status_endpoint_returns_json() {
        let mut ctx = Ctx::new();
        let resp = ctx.get("/wifi/status", "");
        assert_eq!(resp.content_type, "application/json");
        let doc: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(doc["state"], "idle");
    }

    #[test]
    fn state_endpoint_reports_brightness_and_readiness() {
        let mut ctx = Ctx::new();
        ctx.status.wifi_ready = true;
        let resp = ctx.get("/state", "");
        let doc: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(doc["brightness"], 15);
        assert_eq!(doc["wifi"], true);
        assert_eq!(doc["sta"], false);
    }

    #[test]
    fn connectivity_probe_redirects_to_portal() {
        let mut ctx = Ctx::new();
        let resp = ctx.get("/generate_204", "");
        assert_eq!(resp.code, 302);
        assert_eq!(resp.location.as_deref(), Some("http://192.168.4.1/"));
    }

    #[test]
    fn unknown_path_is_404() {
        let mut ctx = Ctx::new();
        assert_eq!(ctx.get("/nope", "").code, 404);
    }
}
