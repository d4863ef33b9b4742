//! VizBot firmware entry point.
//!
//! Wiring order matters: NVS and config first, then the coordinator and
//! radio adapters, then the synchronous boot auto-connect (the only
//! blocking connect path), and only then the HTTP server and the two
//! concurrent loops — render loop draining the command queue each
//! frame, provisioning poll advancing the state machine each tick.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::http::Method;
use esp_idf_svc::http::server::{Configuration as HttpConfig, EspHttpServer};
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use vizbot::adapters::NameServices;
use vizbot::adapters::nvs::NvsAdapter;
use vizbot::adapters::time::SystemClock;
use vizbot::adapters::wifi::EspRadio;
use vizbot::app::ports::{ClockPort, ConfigPort, DisplayPort, NameServicePort, RadioPort};
use vizbot::config::SystemConfig;
use vizbot::coordinator::Coordinator;
use vizbot::portal;
use vizbot::provisioning::Provisioner;
use vizbot::render::{self, RenderState};
use vizbot::status::SystemStatus;

/// Brightness sink for the LED panel driver. The applied level is also
/// published for the `/state` endpoint.
struct PanelBrightness {
    published: Arc<AtomicU8>,
}

impl DisplayPort for PanelBrightness {
    fn set_brightness(&mut self, level: u8) {
        self.published.store(level, Ordering::Relaxed);
        // The matrix driver picks the level up on its next frame.
    }
}

/// Everything the HTTP handlers and the provisioning poll share.
struct PortalCtx {
    prov: Provisioner,
    radio: EspRadio,
    names: NameServices,
    store: NvsAdapter,
    status: SystemStatus,
}

const ROUTES: &[&str] = &[
    "/brightness",
    "/bot/expression",
    "/bot/say",
    "/bot/time",
    "/bot/background",
    "/wifi/scan",
    "/wifi/connect",
    "/wifi/status",
    "/wifi/reset",
    "/state",
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

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("VizBot v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── Storage and configuration ─────────────────────────────
    let mut store = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({e}); nothing will persist this session");
            return Err(anyhow::anyhow!("NVS unavailable"));
        }
    };
    let config = store.load().unwrap_or_else(|e| {
        warn!("config load failed ({e}); using defaults");
        SystemConfig::default()
    });

    // ── Coordination primitives ───────────────────────────────
    let coordinator = Arc::new(Coordinator::new());
    if coordinator.bus().is_fail_open() {
        warn!("bus mutex unavailable; sensor reads run unguarded");
    }

    // ── Radio and setup surface ───────────────────────────────
    let mut radio = EspRadio::new(peripherals.modem, sysloop, nvs_partition)
        .map_err(|e| anyhow::anyhow!("radio init: {e}"))?;
    radio.start_access_point(&config.ap_ssid, &config.ap_password)
        .map_err(|e| anyhow::anyhow!("setup AP: {e}"))?;

    let mut names = NameServices::new(config.hostname.clone(), radio.ap_ip());
    names.start_captive_dns();
    names.restart_mdns();

    let mut status = SystemStatus {
        ap_ip: radio.ap_ip(),
        wifi_ready: true,
        dns_ready: true,
        mdns_ready: true,
        ..Default::default()
    };

    let clock = SystemClock::new();
    let mut prov = Provisioner::new(&config);

    // ── Boot auto-connect (blocking; no concurrency yet) ──────
    prov.boot_auto_connect(&mut radio, &mut names, &mut store, &clock, &mut status);

    // ── HTTP control surface ──────────────────────────────────
    let published_brightness = Arc::new(AtomicU8::new(config.brightness_default));
    let ctx = Arc::new(Mutex::new(PortalCtx {
        prov,
        radio,
        names,
        store,
        status,
    }));

    let mut server = EspHttpServer::new(&HttpConfig::default())?;
    for route in ROUTES {
        let coordinator = Arc::clone(&coordinator);
        let ctx = Arc::clone(&ctx);
        let brightness = Arc::clone(&published_brightness);
        server.fn_handler::<anyhow::Error, _>(route, Method::Get, move |req| {
            let uri = req.uri().to_owned();
            let (path, query) = uri.split_once('?').unwrap_or((uri.as_str(), ""));

            let resp = {
                let mut ctx = ctx.lock().map_err(|_| anyhow::anyhow!("ctx poisoned"))?;
                let PortalCtx {
                    prov,
                    radio,
                    names,
                    store,
                    status,
                } = &mut *ctx;
                portal::dispatch(
                    path,
                    query,
                    &coordinator,
                    prov,
                    radio,
                    names,
                    store,
                    status,
                    brightness.load(Ordering::Relaxed),
                )
            };

            let mut headers: Vec<(&str, &str)> = vec![("Content-Type", resp.content_type)];
            if let Some(loc) = resp.location.as_deref() {
                headers.push(("Location", loc));
            }
            let mut out = req.into_response(resp.code, None, &headers)?;
            use esp_idf_svc::io::Write as _;
            out.write_all(resp.body.as_bytes())?;
            Ok(())
        })?;
    }
    info!("control surface up on port 80");

    // ── Main loops ────────────────────────────────────────────
    let mut display = PanelBrightness {
        published: Arc::clone(&published_brightness),
    };
    let mut state = RenderState::new(config.brightness_default);
    display.set_brightness(state.brightness);

    loop {
        let now = clock.now_ms();

        render::drain_into(&coordinator, &mut state, &mut display, now);

        {
            let mut ctx = match ctx.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let PortalCtx {
                prov,
                radio,
                names,
                store,
                status,
            } = &mut *ctx;
            prov.poll(now, radio, names, store, status);
        }

        clock.delay_ms(config.frame_interval_ms);
    }
}
