//! Local state of the two progress operations: the guardian (drawing) flow and
//! the passphrase gate. Network calls are issued by `client::Portal`; this
//! module only decides whether a call may go out and what to show.

use crate::api::{
    DrawingImage,
    GameSnapshot,
    StageProgress,
};

pub const GUARDIAN_TITLE: &str = "Treasure Guardian";
pub const GATE_TITLE: &str = "Wisdom Gateway";
pub const GATE_UNLOCKED: &str = "✓ Gateway Unlocked";

const STAGE_MESSAGES: [&str; 3] = [
    "Oh, hi there! I’m the Treasure Guardian… or wait, maybe that’s me! Anyway, you’re here to find treasures, uh… clues! I’m guarding a secret PIN, but… hmm, I don’t just give it away. No, no—you’ll need to show me five drawings first! Five! Each one is a little clue, a little piece of the puzzle… with some drawings being more important… but shh! I can’t quite remember which one. When I see them all, then, maybe, I’ll share the PIN with you.",
    "You’ve done well to bring me these drawings. They look… interesting. Yes, yes, I can see the clues hidden within them. Now, as promised, here is the secret PIN you need: 4729. Use it wisely on your quest for more treasures!",
    "The true PIN is revealed. Carry it to the Wisdom Gateway.",
];

/// Rejections decided locally, before any request is sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Precondition {
    #[error("No active session")]
    NoSession,
    #[error("Please provide an image first")]
    NoDrawing,
    #[error("Every PIN for this stage is already revealed")]
    StageExhausted,
    #[error("The guardian is still studying your drawing")]
    SubmitInFlight,
    #[error("Start a new drawing first")]
    AwaitingReset,
    #[error("The gateway is still checking your passphrase")]
    UnlockInFlight,
}

pub fn stage_message(progress: &StageProgress) -> &'static str {
    let idx = progress.pins.len().min(STAGE_MESSAGES.len() - 1);
    STAGE_MESSAGES[idx]
}

/// `true` for every accepted drawing, one slot per drawing of the stage.
pub fn progress_slots(progress: &StageProgress) -> [bool; StageProgress::DRAWINGS_PER_STAGE as usize] {
    let mut slots = [false; StageProgress::DRAWINGS_PER_STAGE as usize];
    for (i, slot) in slots.iter_mut().enumerate() {
        *slot = (i as u32) < progress.count;
    }
    slots
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinView {
    pub label: &'static str,
    pub pin: String,
    /// Superseded by a later PIN
    pub expired: bool,
}

pub fn pin_views(progress: &StageProgress) -> Vec<PinView> {
    let last = progress.pins.len().saturating_sub(1);
    progress
        .pins
        .iter()
        .take(StageProgress::MAX_PINS)
        .enumerate()
        .map(|(i, pin)| PinView {
            label: if i < 1 { "Unlocked PIN" } else { "True PIN" },
            pin: pin.clone(),
            expired: i < last,
        })
        .collect()
}

/// The drawing flow. Holds the staged image until it is submitted or cleared.
#[derive(Debug, Default)]
pub struct Guardian {
    staged: Option<DrawingImage>,
    reply: Option<String>,
    can_reset: bool,
    in_flight: bool,
}

impl Guardian {
    pub fn stage(&mut self, image: DrawingImage) {
        self.staged = Some(image);
    }

    pub fn has_staged_image(&self) -> bool {
        self.staged.is_some()
    }

    pub fn discard_image(&mut self) {
        self.staged = None;
    }

    pub fn reply(&self) -> Option<&str> {
        self.reply.as_deref()
    }

    pub fn can_reset(&self) -> bool {
        self.can_reset
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// The pad accepts strokes only when a submit could follow.
    pub fn accepts_input(&self, progress: &StageProgress) -> bool {
        !self.in_flight && !self.can_reset && !progress.is_exhausted()
    }

    /// Hands out the staged image for upload. The image is gone afterwards,
    /// whatever the backend answers.
    pub fn take_for_submit(
        &mut self,
        progress: &StageProgress,
    ) -> Result<DrawingImage, Precondition> {
        if self.in_flight {
            return Err(Precondition::SubmitInFlight);
        }
        if progress.is_exhausted() {
            return Err(Precondition::StageExhausted);
        }
        if self.can_reset {
            return Err(Precondition::AwaitingReset);
        }
        let image = self.staged.take().ok_or(Precondition::NoDrawing)?;
        self.in_flight = true;
        Ok(image)
    }

    pub fn on_reply(&mut self, reply: String) {
        self.in_flight = false;
        self.reply = Some(reply);
        self.can_reset = true;
    }

    pub fn on_failure(&mut self) {
        self.in_flight = false;
    }

    /// "New Drawing"
    pub fn reset(&mut self) {
        self.reply = None;
        self.staged = None;
        self.can_reset = false;
    }

    /// Forget everything, e.g. when the session ends.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Passphrase input, upper-cased as typed.
#[derive(Debug, Default)]
pub struct PassphraseGate {
    input: String,
    in_flight: bool,
}

impl PassphraseGate {
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn push_char(&mut self, c: char) {
        self.input.extend(c.to_uppercase());
    }

    pub fn pop_char(&mut self) {
        self.input.pop();
    }

    pub fn set_input(&mut self, text: &str) {
        self.input = text.to_uppercase();
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn begin_attempt(&mut self) -> Result<String, Precondition> {
        if self.in_flight {
            return Err(Precondition::UnlockInFlight);
        }
        self.in_flight = true;
        Ok(self.input.clone())
    }

    /// The input is cleared once an attempt has an outcome.
    pub fn finish_attempt(&mut self) {
        self.in_flight = false;
        self.input.clear();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_visible(snapshot: Option<&GameSnapshot>) -> bool {
        snapshot.is_some_and(GameSnapshot::passphrase_gate_open)
    }

    /// Derived from the snapshot, never stored locally.
    pub fn is_unlocked(snapshot: Option<&GameSnapshot>) -> bool {
        snapshot.is_some_and(|s| s.complete)
    }
}
