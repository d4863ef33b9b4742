//! Property tests for the clamp table, the queue bounds, and the
//! provisioning machine's resistance to arbitrary request orderings.

use proptest::prelude::*;

use vizbot::adapters::nvs::NvsAdapter;
use vizbot::adapters::wifi::SimRadio;
use vizbot::app::Command;
use vizbot::app::ports::{DisplayPort, NameServicePort};
use vizbot::config::{
    BRIGHTNESS_MAX, BRIGHTNESS_MIN, CMD_QUEUE_DEPTH, MAX_SCAN_RESULTS, NUM_BG_STYLES,
    NUM_EXPRESSIONS, SAY_DURATION_MAX_MS, SAY_DURATION_MIN_MS, SystemConfig,
};
use vizbot::coordinator::CommandQueue;
use vizbot::provisioning::Provisioner;
use vizbot::render::RenderState;
use vizbot::status::SystemStatus;

struct NullDisplay;

impl DisplayPort for NullDisplay {
    fn set_brightness(&mut self, _level: u8) {}
}

struct NullNames;

impl NameServicePort for NullNames {
    fn restart_mdns(&mut self) {}
    fn start_captive_dns(&mut self) {}
    fn stop_captive_dns(&mut self) {}
}

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        any::<u8>().prop_map(Command::SetBrightness),
        any::<u8>().prop_map(Command::SetExpression),
        any::<u16>().prop_map(Command::SetFaceColor),
        any::<u8>().prop_map(Command::SetBackgroundStyle),
        (".{0,64}", any::<u16>()).prop_map(|(text, dur)| Command::say(&text, dur)),
        any::<bool>().prop_map(Command::SetTimeOverlay),
        Just(Command::ToggleTimeOverlay),
        any::<bool>().prop_map(Command::SetAutoCycle),
    ]
}

proptest! {
    #[test]
    fn render_state_never_leaves_valid_ranges(cmds in prop::collection::vec(arb_command(), 0..64)) {
        let mut state = RenderState::new(15);
        let mut display = NullDisplay;
        for (i, cmd) in cmds.into_iter().enumerate() {
            state.apply(cmd, &mut display, i as u64 * 20);

            prop_assert!((BRIGHTNESS_MIN..=BRIGHTNESS_MAX).contains(&state.brightness));
            prop_assert!(state.expression < NUM_EXPRESSIONS);
            prop_assert!(state.background_style < NUM_BG_STYLES);
            if let Some(saying) = &state.saying {
                prop_assert!(saying.text.len() <= 27);
            }
        }
    }

    #[test]
    fn say_duration_lands_within_bounds(dur in any::<u16>(), now in any::<u32>()) {
        let mut state = RenderState::new(15);
        let now = u64::from(now);
        state.apply(Command::say("x", dur), &mut NullDisplay, now);
        let until = state.saying.unwrap().until_ms;
        prop_assert!(until >= now + u64::from(SAY_DURATION_MIN_MS));
        prop_assert!(until <= now + u64::from(SAY_DURATION_MAX_MS));
    }

    #[test]
    fn queue_accepts_at_most_depth_and_preserves_order(levels in prop::collection::vec(any::<u8>(), 0..32)) {
        let queue = CommandQueue::new();
        let mut accepted = Vec::new();
        for level in &levels {
            if queue.enqueue(Command::SetBrightness(*level)) {
                accepted.push(*level);
            }
        }
        prop_assert!(accepted.len() <= CMD_QUEUE_DEPTH);
        prop_assert_eq!(accepted.len(), levels.len().min(CMD_QUEUE_DEPTH));

        let mut drained = Vec::new();
        queue.drain(|cmd| {
            if let Command::SetBrightness(level) = cmd {
                drained.push(level);
            }
        });
        prop_assert_eq!(drained, accepted);
        prop_assert!(queue.is_empty());
    }

    #[test]
    fn provisioner_survives_arbitrary_request_orderings(ops in prop::collection::vec(0u8..4, 1..40)) {
        let config = SystemConfig::default();
        let mut prov = Provisioner::new(&config);
        let mut radio = SimRadio::new().with_network("HomeNet", Some("pw"), -40);
        let mut names = NullNames;
        let mut store = NvsAdapter::new().unwrap();
        let mut status = SystemStatus::default();

        let mut now = 0u64;
        for op in ops {
            match op {
                0 => prov.request_scan(&mut radio),
                1 => prov.request_connect(&mut store, "HomeNet", "pw"),
                2 => prov.reset(&mut radio, &mut names, &mut store, &mut status),
                _ => {
                    now += 1000;
                    prov.poll(now, &mut radio, &mut names, &mut store, &mut status);
                }
            }
            prop_assert!(prov.networks().len() <= MAX_SCAN_RESULTS);
            // The status document always serialises.
            let doc: serde_json::Value =
                serde_json::from_str(&prov.status_json(&status)).unwrap();
            prop_assert!(doc.get("state").is_some());
        }
    }
}
