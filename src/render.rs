//! Shared render state and the per-command apply rules.
//!
//! [`RenderState`] is owned exclusively by the render context. The only
//! cross-context write path is the command queue; [`drain_into`] applies
//! everything queued since the last frame. No locking is needed because
//! the drain step runs on a single context.
//!
//! Drawing itself (sprites, animation timing) lives in the display driver
//! and is not modelled here; the renderer reads this struct each frame.

use log::debug;

use crate::app::Command;
use crate::app::commands::SAY_TEXT_MAX;
use crate::app::ports::DisplayPort;
use crate::config::{
    BRIGHTNESS_MAX, BRIGHTNESS_MIN, NUM_BG_STYLES, NUM_EXPRESSIONS, SAY_DURATION_MAX_MS,
    SAY_DURATION_MIN_MS,
};
use crate::coordinator::Coordinator;

/// A transient text overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saying {
    pub text: heapless::String<SAY_TEXT_MAX>,
    /// Absolute expiry, milliseconds since boot.
    pub until_ms: u64,
}

/// Everything the renderer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderState {
    pub brightness: u8,
    pub expression: u8,
    /// RGB565.
    pub face_color: u16,
    pub background_style: u8,
    pub saying: Option<Saying>,
    pub time_overlay: bool,
    pub auto_cycle: bool,
}

impl RenderState {
    pub fn new(brightness: u8) -> Self {
        Self {
            brightness: brightness.clamp(BRIGHTNESS_MIN, BRIGHTNESS_MAX),
            expression: 0,
            face_color: 0xFFFF,
            background_style: 0,
            saying: None,
            time_overlay: false,
            auto_cycle: true,
        }
    }

    /// Apply one command, clamping out-of-range values instead of
    /// rejecting them. `now_ms` stamps the say-text expiry.
    pub fn apply<D: DisplayPort>(&mut self, cmd: Command, display: &mut D, now_ms: u64) {
        match cmd {
            Command::SetBrightness(v) => {
                self.brightness = v.clamp(BRIGHTNESS_MIN, BRIGHTNESS_MAX);
                display.set_brightness(self.brightness);
            }
            Command::SetExpression(v) => {
                self.expression = v.min(NUM_EXPRESSIONS - 1);
            }
            Command::SetFaceColor(c) => {
                // Caller pre-clamps via the palette; any 16-bit value is valid.
                self.face_color = c;
            }
            Command::SetBackgroundStyle(v) => {
                self.background_style = v.min(NUM_BG_STYLES - 1);
            }
            Command::SayText { text, duration_ms } => {
                let dur = duration_ms.clamp(SAY_DURATION_MIN_MS, SAY_DURATION_MAX_MS);
                self.saying = Some(Saying {
                    text,
                    until_ms: now_ms + u64::from(dur),
                });
            }
            Command::SetTimeOverlay(want) => {
                // Flip only on difference. The handler that built this
                // command read the flag from another context, so the value
                // it compared against may already be stale; with this
                // being the sole writer the end state still equals `want`.
                if self.time_overlay != want {
                    self.time_overlay = want;
                }
            }
            Command::ToggleTimeOverlay => {
                self.time_overlay = !self.time_overlay;
            }
            Command::SetAutoCycle(on) => {
                self.auto_cycle = on;
            }
        }
    }

    /// Expire the transient saying. Called once per frame.
    pub fn tick(&mut self, now_ms: u64) {
        if let Some(saying) = &self.saying {
            if now_ms >= saying.until_ms {
                self.saying = None;
            }
        }
    }
}

/// Drain the command queue into the render state, once per render tick.
pub fn drain_into<D: DisplayPort>(
    coordinator: &Coordinator,
    state: &mut RenderState,
    display: &mut D,
    now_ms: u64,
) -> usize {
    let applied = coordinator.drain(|cmd| state.apply(cmd, display, now_ms));
    if applied > 0 {
        debug!("applied {applied} command(s)");
    }
    state.tick(now_ms);
    applied
}
