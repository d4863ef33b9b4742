//! Render commands — the values carried by the command queue.
//!
//! Request handlers construct these; the render loop consumes them exactly
//! once when it drains the queue between frames. A command is never mutated
//! after enqueue.

/// Maximum say-text length. Together with the duration this makes
/// [`Command::SayText`] the largest variant, which bounds the queue slot
/// size — the queue stores commands inline, so every slot pays for the
/// biggest payload.
pub const SAY_TEXT_MAX: usize = 27;

/// A control-surface command applied to shared render state.
///
/// Values arrive pre-validated only where noted in [`RenderState::apply`]
/// (`crate::render::RenderState::apply`); everything else is clamped at
/// apply time so a hostile query string cannot push state out of range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Overall brightness level, pushed through to the output driver.
    SetBrightness(u8),
    /// Select one of the fixed face expressions.
    SetExpression(u8),
    /// Set the RGB565 face colour (caller pre-clamped via the palette).
    SetFaceColor(u16),
    /// Select the background rendering style.
    SetBackgroundStyle(u8),
    /// Show a transient text overlay for `duration_ms`.
    SayText {
        text: heapless::String<SAY_TEXT_MAX>,
        duration_ms: u16,
    },
    /// Set the time overlay to an explicit on/off state.
    SetTimeOverlay(bool),
    /// Flip the time overlay.
    ToggleTimeOverlay,
    /// Enable or disable automatic expression cycling.
    SetAutoCycle(bool),
}

impl Command {
    /// Build a say-text command, truncating at the buffer bound.
    pub fn say(text: &str, duration_ms: u16) -> Self {
        let mut buf: heapless::String<SAY_TEXT_MAX> = heapless::String::new();
        for ch in text.chars() {
            if buf.push(ch).is_err() {
                break;
            }
        }
        Self::SayText {
            text: buf,
            duration_ms,
        }
    }
}
