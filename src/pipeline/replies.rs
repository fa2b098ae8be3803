//! Reply texts sent back into conversations.

use crate::pipeline::types::RejectReason;
use crate::store::{RuntimeState, StateField};

pub const NEED_FOLLOW: &str = "👋 Belum follow nih? Follow dulu!";
pub const NEED_FOLLOWBACK: &str = "👋 Tunggu follow-back nya dulu ya!";
pub const TOO_LONG: &str = "💢 Kepanjangan!";
pub const EMPTY: &str = "💢 Kosong!";
pub const SENT: &str = "📝 Terkirim";

pub const WATCH_ON: &str = "☀️ Monitoring menfess telah dinyalakan";
pub const WATCH_OFF: &str = "🌙 Monitoring menfess telah dimatikan";
pub const FOLLOWBACK_ON: &str = "🤝 Wajib follow-back telah dinyalakan";
pub const FOLLOWBACK_OFF: &str = "🔓 Wajib follow-back telah dimatikan";

/// Reply for a rejection. `Blocked` is handled silently and has none.
pub fn for_rejection(reason: RejectReason) -> Option<&'static str> {
    match reason {
        RejectReason::Blocked => None,
        RejectReason::NotFollowingBot => Some(NEED_FOLLOW),
        RejectReason::NoFollowback => Some(NEED_FOLLOWBACK),
        RejectReason::TooLong => Some(TOO_LONG),
        RejectReason::Empty => Some(EMPTY),
    }
}

/// Confirmation naming the new value of a toggled field.
pub fn for_toggle(field: StateField, enabled: bool) -> &'static str {
    match (field, enabled) {
        (StateField::Watch, true) => WATCH_ON,
        (StateField::Watch, false) => WATCH_OFF,
        (StateField::RequireFollowback, true) => FOLLOWBACK_ON,
        (StateField::RequireFollowback, false) => FOLLOWBACK_OFF,
    }
}

/// One-shot status message sent to the owner at launch.
pub fn launch_report(state: &RuntimeState) -> String {
    let watch = if state.watch_enabled {
        "🤖 Bot telah jalan, monitoring menfess menyala"
    } else {
        "🤖 Bot telah jalan, monitoring menfess mati"
    };
    let followback = if state.require_followback {
        "wajib follow-back: menyala"
    } else {
        "wajib follow-back: mati"
    };
    format!("{watch}\n{followback}")
}
